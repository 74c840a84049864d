//! Metric value types exchanged between providers and the polling layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a metric's value should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    Percentage,
    Numeric,
    Size,
    Text,
}

/// One reading of a metric, or the error that prevented it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub unit: String,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
    pub is_error: bool,
    pub error_message: Option<String>,
}

impl MetricValue {
    pub fn new(value: f64, unit: &str, display_name: &str) -> Self {
        Self {
            value,
            unit: unit.to_string(),
            display_name: display_name.to_string(),
            timestamp: Utc::now(),
            is_error: false,
            error_message: None,
        }
    }

    /// Error sentinel. `value` is zeroed and must not be interpreted.
    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            value: 0.0,
            unit: String::new(),
            display_name: String::new(),
            timestamp: Utc::now(),
            is_error: true,
            error_message: Some(message.into()),
        }
    }

    /// The value, or `None` for an error sentinel
    pub fn ok_value(&self) -> Option<f64> {
        if self.is_error {
            None
        } else {
            Some(self.value)
        }
    }
}

/// Dedicated video memory usage in MB
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VramMetrics {
    pub used: f64,
    pub total: f64,
    pub timestamp: DateTime<Utc>,
}

impl VramMetrics {
    pub fn new(used: f64, total: f64) -> Self {
        Self {
            used,
            total,
            timestamp: Utc::now(),
        }
    }

    pub fn usage_percent(&self) -> f64 {
        if self.total <= 0.0 {
            0.0
        } else {
            (self.used / self.total * 100.0).clamp(0.0, 100.0)
        }
    }
}

/// Capacity ceilings in MB
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareLimits {
    pub max_memory: f64,
    pub max_vram: f64,
}

/// System-wide usage at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemUsage {
    pub total_cpu: f64,
    pub total_gpu: f64,
    pub total_memory: f64,
    pub total_vram: f64,
    /// Bytes per second summed over all interfaces
    pub upload_speed: f64,
    pub download_speed: f64,
    pub power: Option<crate::core::power::PowerStatus>,
    pub timestamp: DateTime<Utc>,
}

impl Default for SystemUsage {
    fn default() -> Self {
        Self {
            total_cpu: 0.0,
            total_gpu: 0.0,
            total_memory: 0.0,
            total_vram: 0.0,
            upload_speed: 0.0,
            download_speed: 0.0,
            power: None,
            timestamp: Utc::now(),
        }
    }
}

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Bytes to MB rounded to one decimal place
pub fn bytes_to_mb(bytes: u64) -> f64 {
    round1(bytes as f64 / BYTES_PER_MB)
}
