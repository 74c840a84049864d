use std::io;
use thiserror::Error;

/// Error type shared by every telemetry component
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Feature unavailable on this machine
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Process or counter instance vanished between resolution and read
    #[error("Not found: {0}")]
    NotFound(String),

    /// One poll cycle's read failed; retry next cycle
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    /// Circuit breaker tripped
    #[error("Permanently disabled: {0}")]
    PermanentlyDisabled(String),

    /// External process exceeded its allotted time and was killed
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// Failing native status code (HRESULT, NTSTATUS or PDH status)
    #[error("{call} failed with status 0x{code:08X}")]
    Native { call: &'static str, code: u32 },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

impl TelemetryError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        TelemetryError::Config(msg.into())
    }

    pub fn not_supported<S: Into<String>>(msg: S) -> Self {
        TelemetryError::NotSupported(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        TelemetryError::NotFound(msg.into())
    }

    pub fn transient<S: Into<String>>(msg: S) -> Self {
        TelemetryError::TransientIo(msg.into())
    }

    pub fn disabled<S: Into<String>>(msg: S) -> Self {
        TelemetryError::PermanentlyDisabled(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        TelemetryError::Timeout(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        TelemetryError::Parse(msg.into())
    }

    pub fn native(call: &'static str, code: u32) -> Self {
        TelemetryError::Native { call, code }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TelemetryError::Other(msg.into())
    }

    /// Whether the failure means the process or instance is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, TelemetryError::NotFound(_))
    }
}

impl From<tokio::task::JoinError> for TelemetryError {
    fn from(err: tokio::task::JoinError) -> Self {
        TelemetryError::Other(format!("Blocking task failed: {}", err))
    }
}
