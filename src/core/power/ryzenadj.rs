use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use super::{PowerScheme, RyzenAdjSnapshot};
use crate::core::config::PowerConfig;
use crate::error::{Result, TelemetryError};

pub const EXECUTABLE_NAME: &str = "ryzenadj.exe";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

const OUTPUT_PREVIEW_CHARS: usize = 800;

const STAPM_LIMIT: &str = "STAPM LIMIT";
const STAPM_VALUE: &str = "STAPM VALUE";
const FAST_LIMIT: &str = "PPT LIMIT FAST";
const FAST_VALUE: &str = "PPT VALUE FAST";
const SLOW_LIMIT: &str = "PPT LIMIT SLOW";
const SLOW_VALUE: &str = "PPT VALUE SLOW";

/// Access to the RyzenAdj executable
#[async_trait]
pub trait RyzenAdjCli: Send + Sync {
    fn is_available(&self) -> bool;

    /// `ryzenadj -i`, parsed
    async fn get_snapshot(&self) -> Result<RyzenAdjSnapshot>;

    async fn apply_limits(&self, scheme: PowerScheme) -> Result<()>;
}

/// Parses the `| Name | Value | Parameter |` table printed by `ryzenadj -i`
pub fn parse_info_output(output: &str) -> Result<RyzenAdjSnapshot> {
    if output.trim().is_empty() {
        return Err(TelemetryError::parse("Empty output"));
    }

    let mut values: HashMap<String, f64> = HashMap::new();
    for line in output.lines() {
        let line = line.trim();
        if !line.starts_with('|') || line.starts_with("|---") {
            continue;
        }

        let cells: Vec<&str> = line
            .split('|')
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .collect();
        if cells.len() < 2 {
            continue;
        }

        if let Ok(value) = cells[1].parse::<f64>() {
            values.insert(cells[0].to_ascii_uppercase(), value);
        }
    }

    let get = |key: &str| values.get(key).copied();
    match (
        get(STAPM_LIMIT),
        get(STAPM_VALUE),
        get(FAST_LIMIT),
        get(FAST_VALUE),
        get(SLOW_LIMIT),
        get(SLOW_VALUE),
    ) {
        (
            Some(stapm_limit),
            Some(stapm_value),
            Some(fast_limit),
            Some(fast_value),
            Some(slow_limit),
            Some(slow_value),
        ) => Ok(RyzenAdjSnapshot {
            stapm_limit,
            stapm_value,
            fast_limit,
            fast_value,
            slow_limit,
            slow_value,
        }),
        _ => Err(TelemetryError::parse("Missing required keys in output table")),
    }
}

/// `--stapm-limit=... --fast-limit=... --slow-limit=...` in milliwatts
pub fn apply_arguments(scheme: PowerScheme) -> Vec<String> {
    let mw = |watts: i32| watts.max(0) as i64 * 1000;
    vec![
        format!("--stapm-limit={}", mw(scheme.stapm_watts)),
        format!("--fast-limit={}", mw(scheme.fast_watts)),
        format!("--slow-limit={}", mw(scheme.slow_watts)),
    ]
}

/// Finds ryzenadj: configured file or directory, then the bundled tools
/// directory, then `base_dir`, then PATH
pub fn locate_executable(configured: Option<&str>, base_dir: &Path) -> Option<PathBuf> {
    if let Some(configured) = configured.map(str::trim).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(configured);
        if path.is_dir() {
            let in_dir = path.join(EXECUTABLE_NAME);
            if in_dir.is_file() {
                return Some(in_dir);
            }
        }
        if path.is_file() {
            return Some(path);
        }
        log::debug!("Configured RyzenAdj path {:?} not usable", path);
    }

    let candidates = [
        base_dir.join("tools").join("RyzenAdj").join(EXECUTABLE_NAME),
        base_dir.join(EXECUTABLE_NAME),
    ];
    if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
        return Some(found);
    }

    which::which("ryzenadj").ok()
}

fn truncate_for_log(text: &str, max_chars: usize) -> String {
    let normalized = text.trim().replace("\r\n", "\n");
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let mut truncated: String = normalized.chars().take(max_chars).collect();
    truncated.push_str("...(truncated)");
    truncated
}

/// Error text for a nonzero exit
pub fn exit_failure_message(code: i32, stdout: &str, stderr: &str) -> String {
    let mut message = format!(
        "ryzenadj.exe exited with code {}. StdErr: {}. StdOut: {}.",
        code,
        truncate_for_log(stderr, OUTPUT_PREVIEW_CHARS),
        truncate_for_log(stdout, OUTPUT_PREVIEW_CHARS)
    );
    if code == -1 && stdout.trim().is_empty() && stderr.trim().is_empty() {
        message.push_str(
            " Hint: run as Administrator and keep WinRing0x64.dll/WinRing0x64.sys/inpoutx64.dll next to ryzenadj.exe.",
        );
    }
    message
}

/// [`RyzenAdjCli`] that spawns the executable for every call
pub struct CommandRyzenAdj {
    executable: Option<PathBuf>,
    /// Resolved once at construction
    available: bool,
    timeout: Duration,
}

impl CommandRyzenAdj {
    pub fn new(executable: Option<PathBuf>, timeout: Duration) -> Self {
        match &executable {
            Some(path) => log::info!("Using RyzenAdj executable: {}", path.display()),
            None => log::warn!("ryzenadj.exe not found. Power control is disabled."),
        }
        let available = executable.as_ref().is_some_and(|p| p.is_file());
        Self {
            executable,
            available,
            timeout,
        }
    }

    /// Resolves the executable relative to the running binary's directory
    pub fn from_config(config: &PowerConfig) -> Self {
        let base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        let executable = locate_executable(config.ryzenadj_path.as_deref(), &base_dir);
        Self::new(executable, config.cli_timeout())
    }

    pub fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        let exe = self.executable.as_ref().ok_or_else(|| {
            TelemetryError::not_supported(
                "ryzenadj.exe not found. Set power.ryzenadj_path or place ryzenadj.exe under tools/RyzenAdj.",
            )
        })?;

        let mut command = tokio::process::Command::new(exe);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = exe.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let child = command.spawn()?;
        let pid = child.id();

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                // Dropping the wait future already killed the child itself
                if let Some(pid) = pid {
                    kill_process_tree(pid).await;
                }
                return Err(TelemetryError::timeout(format!(
                    "ryzenadj.exe timed out after {:.1}s. Args: {}",
                    self.timeout.as_secs_f64(),
                    args.join(" ")
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            let message = exit_failure_message(code, &stdout, &stderr);
            log::warn!("{}", message);
            return Err(TelemetryError::transient(message));
        }

        Ok(stdout)
    }
}

#[cfg(windows)]
async fn kill_process_tree(pid: u32) {
    let result = tokio::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        log::debug!("taskkill for pid {} failed: {}", pid, e);
    }
}

#[cfg(not(windows))]
async fn kill_process_tree(pid: u32) {
    log::debug!("Timed-out pid {} was killed on drop", pid);
}

#[async_trait]
impl RyzenAdjCli for CommandRyzenAdj {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn get_snapshot(&self) -> Result<RyzenAdjSnapshot> {
        let stdout = self.run(&["-i".to_string()]).await?;
        parse_info_output(&stdout).map_err(|e| {
            TelemetryError::parse(format!("Failed to parse RyzenAdj output: {}", e))
        })
    }

    async fn apply_limits(&self, scheme: PowerScheme) -> Result<()> {
        self.run(&apply_arguments(scheme)).await.map(|_| ())
    }
}
