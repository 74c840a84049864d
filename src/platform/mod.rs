// Platform-specific code module

pub mod d3dkmt;
pub mod nvidia;
pub mod sensors;
pub mod vram_capacity;

#[cfg(windows)]
pub mod windows;

use std::sync::Arc;

use crate::core::counters::{CounterBackend, CounterPath, CounterReader};
use crate::core::gpu::GpuQuery;
use crate::core::sensors::HardwareTree;
use crate::error::{Result, TelemetryError};

pub use sensors::SystemSensorTree;
pub use vram_capacity::total_vram_mb;

/// Native GPU layer for this platform
pub fn open_gpu_query() -> Result<Box<dyn GpuQuery>> {
    #[cfg(windows)]
    {
        Ok(Box::new(self::windows::dxgi::DxgiGpuQuery::open()?))
    }
    #[cfg(not(windows))]
    {
        Err(TelemetryError::not_supported(
            "GPU adapter queries require DXGI (Windows only)",
        ))
    }
}

/// Performance counter source for this platform
pub fn counter_backend() -> Arc<dyn CounterBackend> {
    #[cfg(windows)]
    {
        Arc::new(self::windows::pdh::PdhBackend::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(UnsupportedCounters)
    }
}

pub fn sensor_tree() -> Box<dyn HardwareTree> {
    Box::new(SystemSensorTree::new())
}

/// Counter backend for platforms without performance counters
#[derive(Debug, Default)]
pub struct UnsupportedCounters;

impl CounterBackend for UnsupportedCounters {
    fn category_exists(&self, _category: &str) -> bool {
        false
    }

    fn instance_names(&self, category: &str) -> Result<Vec<String>> {
        Err(TelemetryError::not_supported(format!(
            "Performance counter category '{}' is Windows only",
            category
        )))
    }

    fn open(&self, path: &CounterPath) -> Result<Box<dyn CounterReader>> {
        Err(TelemetryError::not_supported(format!(
            "Performance counter {} is Windows only",
            path
        )))
    }
}
