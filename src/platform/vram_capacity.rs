//! Installed video memory capacity: display-class registry first, WMI second

use crate::core::metrics::{round1, BYTES_PER_MB};

/// Display adapter device class under `Control\Class`
pub const DISPLAY_CLASS_GUID: &str = "{4d36e968-e325-11ce-bfc1-08002be10318}";
#[cfg_attr(not(windows), allow(dead_code))]
const MEMORY_SIZE_VALUE: &str = "HardwareInformation.qwMemorySize";
#[cfg_attr(not(windows), allow(dead_code))]
const CONTROL_SETS: [&str; 3] = ["CurrentControlSet", "ControlSet001", "ControlSet002"];

/// Registry memory sizes come as QWORD, DWORD or an 8-byte binary blob
pub fn parse_memory_size(bytes: &[u8]) -> Option<u64> {
    let size = match bytes.len() {
        4 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(bytes);
            u32::from_le_bytes(buf) as u64
        }
        n if n >= 8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            u64::from_le_bytes(buf)
        }
        _ => return None,
    };
    (size > 0 && size < i64::MAX as u64).then_some(size)
}

/// Total dedicated video memory in MB, or 0 when no source knows
pub fn total_vram_mb() -> f64 {
    let registry = registry_total_bytes();
    if registry > 0 {
        return round1(registry as f64 / BYTES_PER_MB);
    }

    let wmi = wmi_total_bytes();
    if wmi > 0 {
        log::debug!("VRAM capacity from WMI (registry had none)");
        return round1(wmi as f64 / BYTES_PER_MB);
    }

    0.0
}

#[cfg(windows)]
fn registry_total_bytes() -> u64 {
    use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_READ, KEY_WOW64_64KEY};
    use winreg::RegKey;

    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);

    for control_set in CONTROL_SETS {
        let path = format!("SYSTEM\\{}\\Control\\Class\\{}", control_set, DISPLAY_CLASS_GUID);
        let Ok(class_key) = hklm.open_subkey_with_flags(&path, KEY_READ | KEY_WOW64_64KEY) else {
            log::debug!("Registry path not found: {}", path);
            continue;
        };

        let total: u64 = class_key
            .enum_keys()
            .filter_map(|name| name.ok())
            .filter_map(|name| class_key.open_subkey_with_flags(&name, KEY_READ).ok())
            .filter_map(|adapter| adapter.get_raw_value(MEMORY_SIZE_VALUE).ok())
            .filter_map(|value| parse_memory_size(&value.bytes))
            .sum();

        if total > 0 {
            return total;
        }
    }

    0
}

#[cfg(windows)]
fn wmi_total_bytes() -> u64 {
    use serde::Deserialize;
    use wmi::WMIConnection;

    #[derive(Deserialize, Debug)]
    #[serde(rename = "Win32_VideoController")]
    struct VideoController {
        #[serde(rename = "AdapterRAM")]
        adapter_ram: Option<u64>,
    }

    let con = match WMIConnection::new() {
        Ok(con) => con,
        Err(e) => {
            log::debug!("Failed to connect to WMI: {}", e);
            return 0;
        }
    };

    match con.query::<VideoController>() {
        Ok(controllers) => controllers.iter().filter_map(|c| c.adapter_ram).sum(),
        Err(e) => {
            log::debug!("WMI query failed: {}", e);
            0
        }
    }
}

#[cfg(not(windows))]
fn registry_total_bytes() -> u64 {
    0
}

#[cfg(not(windows))]
fn wmi_total_bytes() -> u64 {
    0
}
