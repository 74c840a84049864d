// Integration tests for the RyzenAdj power provider

use std::sync::Arc;
use std::time::Duration;

use xhmonitor::core::power::{
    default_schemes, parse_info_output, NullPowerProvider, PowerProvider, PowerScheme,
    RyzenAdjPowerProvider, RyzenAdjSnapshot,
};

use super::support::{sample_snapshot, snapshot, FakeCli};

const INFO_OUTPUT: &str = "\
CPU Family: Phoenix
SMU BIOS Interface Version: 24
Version: v0.15.0
PM Table Version: 4c0009
|        Name         |   Value   |     Parameter      |
|---------------------|-----------|--------------------|
| STAPM LIMIT         |    55.000 | stapm-limit        |
| STAPM VALUE         |    42.000 |                    |
| PPT LIMIT FAST      |   100.000 | fast-limit         |
| PPT VALUE FAST      |    80.125 |                    |
| PPT LIMIT SLOW      |    55.000 | slow-limit         |
| PPT VALUE SLOW      |    44.870 |                    |
| THM LIMIT CORE      |   100.000 | tctl-temp          |
";

const MILLIWATT_OUTPUT: &str = "\
|        Name         |   Value   |     Parameter      |
|---------------------|-----------|--------------------|
| STAPM LIMIT         | 55000.000 | stapm-limit        |
| STAPM VALUE         | 42000.000 |                    |
| PPT LIMIT FAST      | 100000.000 | fast-limit        |
| PPT VALUE FAST      | 80000.000 |                    |
| PPT LIMIT SLOW      | 55000.000 | slow-limit         |
| PPT VALUE SLOW      | 45000.000 |                    |
";

fn provider(cli: &Arc<FakeCli>, interval: Duration) -> RyzenAdjPowerProvider {
    RyzenAdjPowerProvider::new(cli.clone(), interval, default_schemes())
}

fn scheme_snapshot(scheme: PowerScheme) -> RyzenAdjSnapshot {
    snapshot(
        scheme.stapm_watts as f64 * 1000.0,
        30_000.0,
        scheme.fast_watts as f64 * 1000.0,
        scheme.slow_watts as f64 * 1000.0,
    )
}

#[tokio::test]
async fn test_status_from_parsed_output() {
    let parsed = parse_info_output(INFO_OUTPUT).unwrap();
    let cli = FakeCli::always(parsed);
    let provider = provider(&cli, Duration::from_secs(3));

    let status = provider.get_status().await.unwrap();
    assert_eq!(status.current_watts, 42.0);
    assert_eq!(status.limit_watts, 55.0);
    assert_eq!(status.scheme_index, Some(0));
    assert_eq!(status.limits, PowerScheme::new(55, 100, 55));
}

#[tokio::test]
async fn test_status_from_parsed_milliwatt_output() {
    let parsed = parse_info_output(MILLIWATT_OUTPUT).unwrap();
    assert_eq!(
        parsed,
        RyzenAdjSnapshot {
            stapm_limit: 55000.0,
            stapm_value: 42000.0,
            fast_limit: 100000.0,
            fast_value: 80000.0,
            slow_limit: 55000.0,
            slow_value: 45000.0,
        }
    );

    let cli = FakeCli::always(parsed);
    let provider = provider(&cli, Duration::from_secs(3));
    let status = provider.get_status().await.unwrap();
    assert_eq!(status.current_watts, 42.0);
    assert_eq!(status.limit_watts, 55.0);
    assert_eq!(status.scheme_index, Some(0));
    assert_eq!(status.limits, PowerScheme::new(55, 100, 55));
}

#[tokio::test]
async fn test_milliwatt_output_is_normalized() {
    let cli = FakeCli::always(sample_snapshot());
    let provider = provider(&cli, Duration::from_secs(3));

    let status = provider.get_status().await.unwrap();
    assert_eq!(status.current_watts, 42.0);
    assert_eq!(status.limit_watts, 55.0);
    assert_eq!(status.scheme_index, Some(0));
}

#[tokio::test]
async fn test_unmatched_limits_have_no_scheme() {
    let cli = FakeCli::always(snapshot(30_000.0, 12_000.0, 40_000.0, 30_000.0));
    let provider = provider(&cli, Duration::from_secs(3));

    let status = provider.get_status().await.unwrap();
    assert_eq!(status.scheme_index, None);
    assert_eq!(status.limits, PowerScheme::new(30, 40, 30));
}

#[tokio::test]
async fn test_status_is_throttled_to_polling_interval() {
    let cli = FakeCli::always(sample_snapshot());
    let provider = provider(&cli, Duration::from_secs(10));

    let first = provider.get_status().await;
    let second = provider.get_status().await;
    assert_eq!(first, second);
    assert_eq!(cli.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_status_calls_share_one_cli_call() {
    let cli = FakeCli::always(sample_snapshot());
    let provider = Arc::new(provider(&cli, Duration::from_secs(10)));

    let (a, b, c) = tokio::join!(provider.get_status(), provider.get_status(), provider.get_status());
    assert!(a.is_some() && b.is_some() && c.is_some());
    assert_eq!(cli.calls(), 1);
}

#[tokio::test]
async fn test_failed_attempt_is_not_served_from_cache() {
    let cli = FakeCli::failing();
    let provider = provider(&cli, Duration::from_secs(10));

    assert!(provider.get_status().await.is_none());
    assert!(provider.get_status().await.is_none());
    assert_eq!(cli.calls(), 1);
}

#[tokio::test]
async fn test_switch_moves_to_next_scheme() {
    let schemes = default_schemes();
    let cli = FakeCli::always(scheme_snapshot(schemes[0]));
    let provider = provider(&cli, Duration::from_secs(10));

    let result = provider.switch_to_next_scheme().await;
    assert!(result.success);
    assert_eq!(result.message, "OK");
    assert_eq!(result.previous_index, Some(0));
    assert_eq!(result.new_index, 1);
    assert_eq!(result.new_scheme, Some(schemes[1]));
    assert_eq!(cli.applied.lock().as_slice(), &[schemes[1]]);

    // The next status comes from the switch without another CLI call
    let status = provider.get_status().await.unwrap();
    assert_eq!(status.scheme_index, Some(1));
    assert_eq!(status.limit_watts, 85.0);
    assert_eq!(cli.calls(), 1);
}

#[tokio::test]
async fn test_switch_wraps_around() {
    let schemes = default_schemes();
    let cli = FakeCli::always(scheme_snapshot(schemes[2]));
    let provider = provider(&cli, Duration::ZERO);

    let result = provider.switch_to_next_scheme().await;
    assert!(result.success);
    assert_eq!(result.previous_index, Some(2));
    assert_eq!(result.new_index, 0);
}

#[tokio::test]
async fn test_switch_from_unknown_limits_starts_at_first_scheme() {
    let cli = FakeCli::always(snapshot(30_000.0, 12_000.0, 40_000.0, 30_000.0));
    let provider = provider(&cli, Duration::ZERO);

    let result = provider.switch_to_next_scheme().await;
    assert!(result.success);
    assert_eq!(result.previous_index, None);
    assert_eq!(result.new_index, 0);
    assert_eq!(cli.applied.lock().as_slice(), &[default_schemes()[0]]);
}

#[tokio::test]
async fn test_switch_tolerates_one_watt_drift() {
    // 84/121/86 W is within tolerance of the second scheme
    let cli = FakeCli::always(snapshot(84_000.0, 30_000.0, 121_000.0, 86_000.0));
    let provider = provider(&cli, Duration::ZERO);

    let result = provider.switch_to_next_scheme().await;
    assert_eq!(result.previous_index, Some(1));
    assert_eq!(result.new_index, 2);
}

#[tokio::test]
async fn test_failed_apply_verified_as_applied_succeeds() {
    let schemes = default_schemes();
    let cli = FakeCli::new(vec![
        Ok(scheme_snapshot(schemes[0])),
        Ok(scheme_snapshot(schemes[1])),
    ]);
    cli.fail_apply("ryzenadj.exe exited with code 1");
    let provider = provider(&cli, Duration::ZERO);

    let result = provider.switch_to_next_scheme().await;
    assert!(result.success);
    assert_eq!(result.previous_index, Some(0));
    assert_eq!(result.new_index, 1);
    assert_eq!(result.new_scheme, Some(schemes[1]));
    assert_eq!(cli.calls(), 2);
}

#[tokio::test]
async fn test_failed_apply_not_applied_fails() {
    let schemes = default_schemes();
    let cli = FakeCli::always(scheme_snapshot(schemes[0]));
    cli.fail_apply("ryzenadj.exe exited with code 1");
    let provider = provider(&cli, Duration::ZERO);

    let result = provider.switch_to_next_scheme().await;
    assert!(!result.success);
    assert_eq!(result.new_index, -1);
    assert_eq!(result.new_scheme, None);
    assert!(result.message.contains("exited with code 1"));
}

#[tokio::test]
async fn test_unavailable_cli() {
    let cli = FakeCli::unavailable();
    let provider = provider(&cli, Duration::ZERO);

    assert!(!provider.is_supported());
    assert!(provider.get_status().await.is_none());
    let result = provider.switch_to_next_scheme().await;
    assert!(!result.success);
    assert_eq!(result.message, "RyzenAdj not available");
    assert_eq!(cli.calls(), 0);
}

#[tokio::test]
async fn test_startup_failures_disable_provider() {
    let cli = FakeCli::failing();
    let provider = provider(&cli, Duration::ZERO);

    for _ in 0..3 {
        assert!(provider.get_status().await.is_none());
    }
    assert!(provider.is_disabled());
    assert!(!provider.is_supported());

    assert!(provider.get_status().await.is_none());
    let result = provider.switch_to_next_scheme().await;
    assert!(!result.success);
    assert_eq!(
        result.message,
        "Permanently disabled: power monitoring stopped after 3 startup failures"
    );
    assert_eq!(cli.calls(), 3);
    assert!(cli.applied.lock().is_empty());
}

#[tokio::test]
async fn test_failures_after_success_never_disable() {
    let cli = FakeCli::new(vec![
        Ok(sample_snapshot()),
        Err(xhmonitor::TelemetryError::transient("ryzenadj.exe exited with code 1")),
    ]);
    let provider = provider(&cli, Duration::ZERO);

    assert!(provider.get_status().await.is_some());
    for _ in 0..5 {
        assert!(provider.get_status().await.is_none());
    }
    assert!(!provider.is_disabled());
    assert_eq!(cli.calls(), 6);
}

#[tokio::test]
async fn test_null_provider_is_inert() {
    let provider = NullPowerProvider;

    assert!(!provider.is_supported());
    assert!(provider.get_status().await.is_none());
    let result = provider.switch_to_next_scheme().await;
    assert!(!result.success);
    assert_eq!(result.message, "Power provider not available");
}

#[test]
fn test_parse_rejects_incomplete_table() {
    let truncated = "| STAPM LIMIT | 55.000 | stapm-limit |\n| STAPM VALUE | 42.000 | |";
    let err = parse_info_output(truncated).unwrap_err();
    assert!(err.to_string().contains("Missing required keys"));

    let err = parse_info_output("   \n").unwrap_err();
    assert!(err.to_string().contains("Empty output"));
}
