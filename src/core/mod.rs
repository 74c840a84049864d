// Telemetry engine: native-independent logic behind the platform seams

pub mod config;
pub mod counters;
pub mod gpu;
pub mod metrics;
pub mod power;
pub mod providers;
pub mod sensors;

// Re-export commonly used items
pub use config::MonitorConfig;
pub use metrics::{HardwareLimits, MetricType, MetricValue, SystemUsage, VramMetrics};
pub use providers::{MetricProvider, ProcessTarget, VramCapable};
