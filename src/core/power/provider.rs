use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::ryzenadj::RyzenAdjCli;
use super::{
    default_schemes, is_close, match_scheme, normalize_watts, PowerProvider, PowerScheme,
    PowerSchemeSwitchResult, PowerStatus, RyzenAdjSnapshot,
};
use crate::core::config::PowerConfig;
use crate::error::{Result, TelemetryError};

/// Consecutive failures before the first success that disable the provider
pub const STARTUP_FAILURE_LIMIT: u32 = 3;

#[derive(Debug, Default)]
struct ProviderState {
    last_attempt: Option<Instant>,
    cached: Option<PowerStatus>,
    last_attempt_ok: bool,
    has_ever_succeeded: bool,
    startup_failures: u32,
}

impl ProviderState {
    fn within_window(&self, interval: Duration) -> bool {
        self.last_attempt.is_some_and(|at| at.elapsed() < interval)
    }

    fn throttled_status(&self) -> Option<PowerStatus> {
        if self.last_attempt_ok {
            self.cached
        } else {
            None
        }
    }

    fn record_success(&mut self, status: PowerStatus) {
        self.cached = Some(status);
        self.last_attempt = Some(Instant::now());
        self.last_attempt_ok = true;
        self.has_ever_succeeded = true;
        self.startup_failures = 0;
    }
}

/// [`PowerProvider`] over the RyzenAdj CLI
///
/// CLI calls are serialized by an async gate. `get_status` is throttled to
/// one CLI call per polling interval, and three failures before the first
/// success disable the provider for the rest of the process lifetime.
pub struct RyzenAdjPowerProvider {
    cli: Arc<dyn RyzenAdjCli>,
    schemes: Vec<PowerScheme>,
    polling_interval: Duration,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<ProviderState>,
    disabled: AtomicBool,
}

impl RyzenAdjPowerProvider {
    /// An empty scheme table falls back to the default table
    pub fn new(
        cli: Arc<dyn RyzenAdjCli>,
        polling_interval: Duration,
        schemes: Vec<PowerScheme>,
    ) -> Self {
        let schemes = if schemes.is_empty() {
            default_schemes()
        } else {
            schemes
        };
        Self {
            cli,
            schemes,
            polling_interval,
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(ProviderState::default()),
            disabled: AtomicBool::new(false),
        }
    }

    pub fn from_config(cli: Arc<dyn RyzenAdjCli>, config: &PowerConfig) -> Self {
        Self::new(cli, config.polling_interval(), config.schemes.clone())
    }

    pub fn schemes(&self) -> &[PowerScheme] {
        &self.schemes
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    fn status_from(&self, snapshot: &RyzenAdjSnapshot) -> PowerStatus {
        let limits = snapshot.limits();
        PowerStatus {
            current_watts: normalize_watts(snapshot.stapm_value),
            limit_watts: normalize_watts(snapshot.stapm_limit),
            scheme_index: match_scheme(&self.schemes, limits),
            limits,
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.lock();
        state.last_attempt_ok = false;
        if state.has_ever_succeeded {
            return;
        }

        state.startup_failures += 1;
        if state.startup_failures >= STARTUP_FAILURE_LIMIT {
            self.disabled.store(true, Ordering::Release);
            log::warn!("{}", disabled_error(state.startup_failures));
        }
    }

    async fn apply_next(&self) -> std::result::Result<PowerSchemeSwitchResult, SwitchFailure> {
        let snapshot = self
            .cli
            .get_snapshot()
            .await
            .map_err(|e| SwitchFailure::new(e, None))?;

        let current = match_scheme(&self.schemes, snapshot.limits());
        let next_index = current.map_or(0, |i| (i + 1) % self.schemes.len());
        let next = self.schemes[next_index];

        if let Err(e) = self.cli.apply_limits(next).await {
            return Err(SwitchFailure::new(
                e,
                Some(PendingSwitch {
                    previous: current,
                    next_index,
                    next,
                }),
            ));
        }

        self.state.lock().record_success(PowerStatus {
            current_watts: normalize_watts(snapshot.stapm_value),
            limit_watts: next.stapm_watts as f64,
            scheme_index: Some(next_index),
            limits: next,
        });

        Ok(PowerSchemeSwitchResult::ok(current, next_index, next))
    }

    /// Re-reads the limits after a failed apply; `Some` when they match `expected`
    async fn verify_applied(&self, expected: PowerScheme) -> Option<PowerStatus> {
        let snapshot = match self.cli.get_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::debug!("Verification read failed: {}", e);
                return None;
            }
        };

        let limits = snapshot.limits();
        let applied = is_close(limits.stapm_watts, expected.stapm_watts)
            && is_close(limits.fast_watts, expected.fast_watts)
            && is_close(limits.slow_watts, expected.slow_watts);
        applied.then(|| self.status_from(&snapshot))
    }

    async fn read_status(&self) -> Result<PowerStatus> {
        let snapshot = self.cli.get_snapshot().await?;
        Ok(self.status_from(&snapshot))
    }
}

fn disabled_error(failures: u32) -> TelemetryError {
    TelemetryError::disabled(format!(
        "power monitoring stopped after {} startup failures",
        failures
    ))
}

struct PendingSwitch {
    previous: Option<usize>,
    next_index: usize,
    next: PowerScheme,
}

struct SwitchFailure {
    error: TelemetryError,
    pending: Option<PendingSwitch>,
}

impl SwitchFailure {
    fn new(error: TelemetryError, pending: Option<PendingSwitch>) -> Self {
        Self { error, pending }
    }
}

#[async_trait]
impl PowerProvider for RyzenAdjPowerProvider {
    fn is_supported(&self) -> bool {
        self.cli.is_available() && !self.is_disabled()
    }

    async fn get_status(&self) -> Option<PowerStatus> {
        if !self.is_supported() {
            return None;
        }

        {
            let state = self.state.lock();
            if state.within_window(self.polling_interval) {
                return state.throttled_status();
            }
        }

        let _gate = self.gate.lock().await;
        if !self.is_supported() {
            return None;
        }

        {
            let mut state = self.state.lock();
            if state.within_window(self.polling_interval) {
                return state.throttled_status();
            }
            state.last_attempt = Some(Instant::now());
        }

        match self.read_status().await {
            Ok(status) => {
                self.state.lock().record_success(status);
                Some(status)
            }
            Err(e) => {
                log::error!("Failed to get power status: {}", e);
                self.record_failure();
                None
            }
        }
    }

    async fn switch_to_next_scheme(&self) -> PowerSchemeSwitchResult {
        if self.is_disabled() {
            return PowerSchemeSwitchResult::fail(
                disabled_error(STARTUP_FAILURE_LIMIT).to_string(),
            );
        }
        if !self.is_supported() {
            return PowerSchemeSwitchResult::fail("RyzenAdj not available");
        }

        let _gate = self.gate.lock().await;
        let failure = match self.apply_next().await {
            Ok(result) => return result,
            Err(failure) => failure,
        };

        if let Some(pending) = failure.pending {
            if let Some(verified) = self.verify_applied(pending.next).await {
                log::warn!(
                    "Switch scheme command failed, but limits were applied (verified): {}",
                    failure.error
                );
                self.state.lock().record_success(verified);
                let index = verified.scheme_index.unwrap_or(pending.next_index);
                return PowerSchemeSwitchResult::ok(pending.previous, index, verified.limits);
            }
        }

        log::error!("Failed to switch scheme: {}", failure.error);
        PowerSchemeSwitchResult::fail(failure.error.to_string())
    }
}
