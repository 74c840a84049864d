//! Power-limit control through the RyzenAdj CLI
//!
//! RyzenAdj reports limits in watts on some firmware and milliwatts on
//! others. Values are kept raw in [`RyzenAdjSnapshot`] and normalized with
//! [`normalize_watts`] when consumed.

pub mod provider;
pub mod ryzenadj;

pub use provider::RyzenAdjPowerProvider;
pub use ryzenadj::{parse_info_output, CommandRyzenAdj, RyzenAdjCli};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sustained, fast-boost and slow-boost limits in watts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerScheme {
    pub stapm_watts: i32,
    pub fast_watts: i32,
    pub slow_watts: i32,
}

impl PowerScheme {
    pub const fn new(stapm_watts: i32, fast_watts: i32, slow_watts: i32) -> Self {
        Self {
            stapm_watts,
            fast_watts,
            slow_watts,
        }
    }
}

pub fn default_schemes() -> Vec<PowerScheme> {
    vec![
        PowerScheme::new(55, 100, 55),
        PowerScheme::new(85, 120, 85),
        PowerScheme::new(120, 140, 120),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerStatus {
    pub current_watts: f64,
    pub limit_watts: f64,
    /// `None` when the limits match no configured scheme
    pub scheme_index: Option<usize>,
    pub limits: PowerScheme,
}

/// Raw `ryzenadj -i` values; units are ambiguous until normalized
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RyzenAdjSnapshot {
    pub stapm_limit: f64,
    pub stapm_value: f64,
    pub fast_limit: f64,
    pub fast_value: f64,
    pub slow_limit: f64,
    pub slow_value: f64,
}

impl RyzenAdjSnapshot {
    /// Current limits rounded to whole watts
    pub fn limits(&self) -> PowerScheme {
        PowerScheme::new(
            normalize_watts(self.stapm_limit).round() as i32,
            normalize_watts(self.fast_limit).round() as i32,
            normalize_watts(self.slow_limit).round() as i32,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSchemeSwitchResult {
    pub success: bool,
    pub message: String,
    pub previous_index: Option<usize>,
    /// -1 on failure
    pub new_index: i32,
    pub new_scheme: Option<PowerScheme>,
}

impl PowerSchemeSwitchResult {
    pub fn ok(previous_index: Option<usize>, new_index: usize, new_scheme: PowerScheme) -> Self {
        Self {
            success: true,
            message: "OK".to_string(),
            previous_index,
            new_index: new_index as i32,
            new_scheme: Some(new_scheme),
        }
    }

    pub fn fail<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            message: message.into(),
            previous_index: None,
            new_index: -1,
            new_scheme: None,
        }
    }
}

/// Values above this are taken to be milliwatts
pub const MILLIWATT_THRESHOLD: f64 = 1000.0;

/// Per-component tolerance when matching limits to a scheme, in watts
pub const SCHEME_TOLERANCE_WATTS: u32 = 1;

/// Watts from an ambiguous watt/milliwatt reading; invalid input gives 0
pub fn normalize_watts(raw: f64) -> f64 {
    if raw.is_nan() || raw <= 0.0 {
        0.0
    } else if raw > MILLIWATT_THRESHOLD {
        raw / 1000.0
    } else {
        raw
    }
}

pub fn is_close(a: i32, b: i32) -> bool {
    a.abs_diff(b) <= SCHEME_TOLERANCE_WATTS
}

/// Index of the first scheme within tolerance on all three limits
pub fn match_scheme(schemes: &[PowerScheme], limits: PowerScheme) -> Option<usize> {
    schemes.iter().position(|scheme| {
        is_close(scheme.stapm_watts, limits.stapm_watts)
            && is_close(scheme.fast_watts, limits.fast_watts)
            && is_close(scheme.slow_watts, limits.slow_watts)
    })
}

/// Power control surface consumed by the polling layer. Never fails.
#[async_trait]
pub trait PowerProvider: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn get_status(&self) -> Option<PowerStatus>;

    async fn switch_to_next_scheme(&self) -> PowerSchemeSwitchResult;
}

/// Stand-in used when no power backend exists on this machine
#[derive(Debug, Default)]
pub struct NullPowerProvider;

#[async_trait]
impl PowerProvider for NullPowerProvider {
    fn is_supported(&self) -> bool {
        false
    }

    async fn get_status(&self) -> Option<PowerStatus> {
        None
    }

    async fn switch_to_next_scheme(&self) -> PowerSchemeSwitchResult {
        PowerSchemeSwitchResult::fail("Power provider not available")
    }
}
