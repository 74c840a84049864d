// Integration tests for the sensor snapshot cache

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use xhmonitor::core::sensors::{HardwareType, SensorCache, SensorType};

use super::support::{sample_hardware, FakeTree};

#[test]
fn test_reads_within_ttl_share_one_update() {
    let tree = FakeTree::new(sample_hardware());
    let updates = tree.updates.clone();
    let cache = SensorCache::new(Box::new(tree), Duration::from_secs(10));

    assert!(cache.initialize());
    let first = cache.get_sensor_value(HardwareType::Cpu, SensorType::Load);
    let second = cache.get_sensor_value(HardwareType::Cpu, SensorType::Load);

    assert_eq!(first, Some(37.46));
    assert_eq!(second, first);
    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[test]
fn test_expired_snapshot_is_refreshed() {
    let tree = FakeTree::new(sample_hardware());
    let updates = tree.updates.clone();
    let cache = SensorCache::new(Box::new(tree), Duration::from_millis(20));

    let before = cache.get_sensor_value_by_name(HardwareType::Cpu, SensorType::Clock, "update");
    std::thread::sleep(Duration::from_millis(40));
    let after = cache.get_sensor_value_by_name(HardwareType::Cpu, SensorType::Clock, "update");

    assert_eq!(before, Some(1.0));
    assert_eq!(after, Some(2.0));
    assert_eq!(updates.load(Ordering::SeqCst), 2);
}

#[test]
fn test_open_failure_is_permanent() {
    let tree = FakeTree::failing();
    let opens = tree.opens.clone();
    let updates = tree.updates.clone();
    let cache = SensorCache::new(Box::new(tree), Duration::from_millis(1));

    assert!(!cache.initialize());
    assert!(!cache.initialize());
    assert!(!cache.is_available());
    assert_eq!(cache.get_sensor_value(HardwareType::Cpu, SensorType::Load), None);
    assert!(cache.snapshot().readings.is_empty());
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(updates.load(Ordering::SeqCst), 0);
}

#[test]
fn test_readers_during_refresh_get_previous_snapshot() {
    let mut tree = FakeTree::new(sample_hardware());
    tree.update_delay = Duration::from_millis(300);
    let updates = tree.updates.clone();
    let cache = SensorCache::new(Box::new(tree), Duration::from_millis(1));
    assert!(cache.initialize());

    std::thread::scope(|scope| {
        let refresher = scope.spawn(|| cache.snapshot());
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        let stale = cache.snapshot();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(stale.readings.is_empty());

        let fresh = refresher.join().unwrap();
        assert!(!fresh.readings.is_empty());
    });

    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[test]
fn test_missing_values_are_not_published() {
    let cache = SensorCache::new(Box::new(FakeTree::new(sample_hardware())), Duration::from_secs(10));

    assert!(cache
        .get_all_sensor_values(HardwareType::GpuAmd, SensorType::Power)
        .is_empty());
    assert_eq!(
        cache.get_all_sensor_values(HardwareType::GpuAmd, SensorType::Load),
        vec![12.0, 44.0, 8.0]
    );
}

#[test]
fn test_queries_across_gpu_vendors() {
    let cache = SensorCache::new(Box::new(FakeTree::new(sample_hardware())), Duration::from_secs(10));

    let readings = cache.get_sensor_values(&HardwareType::GPUS, SensorType::SmallData);
    assert_eq!(readings.len(), 2);
    assert!(readings.iter().all(|r| r.hardware_name == "AMD Radeon 780M"));
    assert_eq!(
        cache.get_sensor_value_by_name(HardwareType::GpuAmd, SensorType::SmallData, "memory total"),
        Some(4096.0)
    );
}

#[test]
fn test_close_stops_publishing() {
    let cache = SensorCache::new(Box::new(FakeTree::new(sample_hardware())), Duration::from_secs(10));
    assert!(cache.get_sensor_value(HardwareType::Memory, SensorType::Load).is_some());

    cache.close();
    cache.close();
    assert!(!cache.is_available());
    assert_eq!(cache.get_sensor_value(HardwareType::Memory, SensorType::Load), None);
}
