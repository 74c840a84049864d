// Integration tests for per-process counter binding and lifecycle

use std::time::Duration;

use xhmonitor::core::counters::{
    ProcessCounterManager, GPU_ENGINE_UTILIZATION, PROCESS_CPU, PROCESS_PRIVATE_MEMORY,
};

use super::support::FakeCounters;

const TTL: Duration = Duration::from_secs(5);
const GPU_CATEGORY: &str = "GPU Engine";
const GPU_COUNTER: &str = "Utilization Percentage";

fn chrome_processes(counters: &FakeCounters) {
    counters.set_instances("Process", &["chrome", "chrome#1", "chrome#2", "explorer"]);
    counters.add_process("chrome", 100, "% Processor Time", 3.0);
    counters.add_process("chrome#1", 200, "% Processor Time", 12.5);
    counters.add_process("chrome#2", 300, "% Processor Time", 40.0);
    counters.add_process("explorer", 400, "% Processor Time", 1.0);
}

#[test]
fn test_binds_instance_owned_by_pid() {
    let counters = FakeCounters::new();
    chrome_processes(&counters);
    let manager = ProcessCounterManager::new(counters.clone(), PROCESS_CPU, TTL);

    assert_eq!(manager.read(200, "chrome").unwrap(), 12.5);
    assert_eq!(manager.read(300, "chrome").unwrap(), 40.0);
    assert!(manager.is_bound(200));
    assert!(manager.is_bound(300));
    assert!(!manager.is_bound(100));
}

#[test]
fn test_bound_counter_is_reused() {
    let counters = FakeCounters::new();
    chrome_processes(&counters);
    let manager = ProcessCounterManager::new(counters.clone(), PROCESS_CPU, TTL);

    manager.read(200, "chrome").unwrap();
    let opens = counters.opens();
    counters.set_value("Process", "chrome#1", "% Processor Time", 20.0);

    assert_eq!(manager.read(200, "chrome").unwrap(), 20.0);
    assert_eq!(counters.opens(), opens);
    assert_eq!(counters.enumerations(), 1);
}

#[test]
fn test_instance_list_cached_within_ttl() {
    let counters = FakeCounters::new();
    chrome_processes(&counters);
    let manager = ProcessCounterManager::new(counters.clone(), PROCESS_CPU, TTL);

    manager.read(100, "chrome").unwrap();
    manager.read(200, "chrome").unwrap();
    manager.read(300, "chrome").unwrap();

    assert_eq!(counters.enumerations(), 1);
}

#[test]
fn test_unknown_pid_is_not_found() {
    let counters = FakeCounters::new();
    chrome_processes(&counters);
    let manager = ProcessCounterManager::new(counters.clone(), PROCESS_CPU, TTL);

    let err = manager.read(999, "chrome").unwrap_err();
    assert!(err.is_not_found());
    assert!(!manager.is_bound(999));
}

#[test]
fn test_unresolved_pid_keeps_instance_list() {
    let counters = FakeCounters::new();
    chrome_processes(&counters);
    let manager = ProcessCounterManager::new(counters.clone(), PROCESS_CPU, TTL);

    for _ in 0..3 {
        assert!(manager.read(999, "chrome").unwrap_err().is_not_found());
    }
    assert_eq!(counters.enumerations(), 1);

    assert_eq!(manager.read(300, "chrome").unwrap(), 40.0);
    assert_eq!(counters.enumerations(), 1);
}

#[test]
fn test_failed_read_purges_binding() {
    let counters = FakeCounters::new();
    chrome_processes(&counters);
    let manager = ProcessCounterManager::new(counters.clone(), PROCESS_CPU, TTL);
    manager.read(200, "chrome").unwrap();

    // The process exits and its instance disappears
    counters.remove_value("Process", "chrome#1", "% Processor Time");
    let err = manager.read(200, "chrome").unwrap_err();
    assert!(err.is_not_found());
    assert!(!manager.is_bound(200));

    // A fresh instance for the same pid binds again
    counters.set_value("Process", "chrome#1", "% Processor Time", 7.0);
    assert_eq!(manager.read(200, "chrome").unwrap(), 7.0);
    assert!(manager.is_bound(200));
}

#[test]
fn test_raw_counter_reads_first_value() {
    let counters = FakeCounters::new();
    counters.set_instances("Process", &["code"]);
    counters.add_process("code", 4242, "Working Set - Private", 157_286_400.0);
    let manager = ProcessCounterManager::new(counters.clone(), PROCESS_PRIVATE_MEMORY, TTL);

    assert_eq!(manager.read(4242, "code").unwrap(), 157_286_400.0);
}

#[test]
fn test_gpu_instances_are_summed() {
    let counters = FakeCounters::new();
    let a = "pid_4242_luid_0x00000000_0x0000D2F4_phys_0_eng_0_engtype_3D";
    let b = "pid_4242_luid_0x00000000_0x0000D2F4_phys_0_eng_1_engtype_VideoDecode";
    let other = "pid_42420_luid_0x00000000_0x0000D2F4_phys_0_eng_0_engtype_3D";
    counters.set_instances(GPU_CATEGORY, &[a, b, other]);
    counters.set_value(GPU_CATEGORY, a, GPU_COUNTER, 30.0);
    counters.set_value(GPU_CATEGORY, b, GPU_COUNTER, 5.5);
    counters.set_value(GPU_CATEGORY, other, GPU_COUNTER, 90.0);
    let manager = ProcessCounterManager::new(counters.clone(), GPU_ENGINE_UTILIZATION, TTL);

    assert_eq!(manager.read(4242, "game").unwrap(), 35.5);
}

#[test]
fn test_gpu_process_without_instances_is_reprobed() {
    let counters = FakeCounters::new();
    counters.set_instances(GPU_CATEGORY, &[]);
    let manager =
        ProcessCounterManager::new(counters.clone(), GPU_ENGINE_UTILIZATION, Duration::ZERO);

    assert_eq!(manager.read(4242, "game").unwrap(), 0.0);
    assert!(!manager.is_bound(4242));

    let instance = "pid_4242_luid_0x00000000_0x0000D2F4_phys_0_eng_0_engtype_3D";
    counters.set_instances(GPU_CATEGORY, &[instance]);
    counters.set_value(GPU_CATEGORY, instance, GPU_COUNTER, 64.0);

    assert_eq!(manager.read(4242, "game").unwrap(), 64.0);
    assert!(manager.is_bound(4242));
}

#[test]
fn test_idle_bindings_are_evicted() {
    let counters = FakeCounters::new();
    chrome_processes(&counters);
    let manager = ProcessCounterManager::new(counters.clone(), PROCESS_CPU, TTL);
    manager.read(100, "chrome").unwrap();
    manager.read(400, "explorer").unwrap();

    assert_eq!(manager.evict_idle(Duration::from_secs(60)), 0);
    assert_eq!(manager.evict_idle(Duration::ZERO), 2);
    assert_eq!(manager.bound_count(), 0);
}

#[test]
fn test_end_cycle_evicts_on_schedule() {
    let counters = FakeCounters::new();
    chrome_processes(&counters);
    let manager = ProcessCounterManager::new(counters.clone(), PROCESS_CPU, TTL);
    manager.read(100, "chrome").unwrap();

    for _ in 0..9 {
        manager.end_cycle(Duration::ZERO);
    }
    assert!(manager.is_bound(100));

    manager.end_cycle(Duration::ZERO);
    assert!(!manager.is_bound(100));
}

#[test]
fn test_missing_category_is_unsupported() {
    let counters = FakeCounters::new();
    counters
        .state
        .lock()
        .missing_categories
        .insert(GPU_CATEGORY.to_string());
    let manager = ProcessCounterManager::new(counters.clone(), GPU_ENGINE_UTILIZATION, TTL);

    assert!(!manager.is_supported());
}
