mod common;

use common::*;
use damagemap::service::{DamageService, MemoryReportCache, ReportCache, RiskZoneTable};
use damagemap::types::{DamageError, DisasterType};
use damagemap::DamageAnalyzer;
use std::time::Duration;

fn service(
    provider: SyntheticProvider,
    ttl: Duration,
) -> DamageService<SyntheticProvider, MemoryReportCache, RiskZoneTable> {
    init_logging();
    DamageService::new(
        DamageAnalyzer::new(provider),
        MemoryReportCache::new(ttl),
        RiskZoneTable::default(),
    )
}

#[test]
fn test_repeat_request_is_served_from_cache() {
    let service = service(
        SyntheticProvider::new(scenes_around_event(forest, burned_east)),
        MemoryReportCache::DEFAULT_TTL,
    );

    let first = service.analyze(34.2, -118.1, "2023-08-01", "fire").unwrap();
    let second = service.analyze(34.2, -118.1, "2023-08-01", "fire").unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.report, second.report);
    assert_eq!(service.analyzer().provider().query_count(), 1);

    // Any parameter change is a different request
    let other = service.analyze(34.2, -118.1, "2023-08-01", "earthquake").unwrap();
    assert!(!other.cached);
    assert_eq!(service.analyzer().provider().query_count(), 2);
}

#[test]
fn test_expired_entries_are_recomputed() {
    let service = service(
        SyntheticProvider::new(scenes_around_event(forest, burned_east)),
        Duration::ZERO,
    );

    service.analyze(34.2, -118.1, "2023-08-01", "fire").unwrap();
    let again = service.analyze(34.2, -118.1, "2023-08-01", "fire").unwrap();

    assert!(!again.cached);
    assert_eq!(service.analyzer().provider().query_count(), 2);
}

#[test]
fn test_failures_are_not_cached() {
    init_logging();
    let cache = MemoryReportCache::default();
    let service = DamageService::new(
        DamageAnalyzer::new(SyntheticProvider::new(vec![scene("before", 7, 28, 1.0, forest)])),
        cache,
        RiskZoneTable::default(),
    );

    for _ in 0..2 {
        let err = service.analyze(34.2, -118.1, "2023-08-01", "fire").unwrap_err();
        assert!(matches!(err, DamageError::NoEligibleImagery { before: 1, after: 0 }));
    }
    assert_eq!(service.analyzer().provider().query_count(), 2);
}

#[test]
fn test_risk_context_follows_location_and_type() {
    let service = service(
        SyntheticProvider::new(scenes_around_event(forest, flooded_north)),
        MemoryReportCache::DEFAULT_TTL,
    );

    let new_orleans = service.analyze(29.95, -90.07, "2023-08-01", "hurricane").unwrap();
    assert!(new_orleans.risk_context.contains("High-Risk Flood/Storm Surge Zone"));
    assert_eq!(new_orleans.report.disaster_type, DisasterType::Hurricane);

    let los_angeles = service.analyze(34.05, -118.24, "2023-08-01", "flood").unwrap();
    assert_eq!(
        los_angeles.risk_context,
        "Property is outside of known high-risk flood zones."
    );

    let quake = service.analyze(34.05, -118.24, "2023-08-01", "earthquake").unwrap();
    assert!(quake.risk_context.contains("High-Risk Seismic Zone"));

    // Cached responses are annotated the same way
    let cached = service.analyze(29.95, -90.07, "2023-08-01", "hurricane").unwrap();
    assert!(cached.cached);
    assert_eq!(cached.risk_context, new_orleans.risk_context);
}

#[test]
fn test_memory_cache_put_get() {
    let report = DamageAnalyzer::new(SyntheticProvider::new(scenes_around_event(forest, forest)))
        .analyze(34.2, -118.1, "2023-08-01", "fire")
        .unwrap();

    let cache = MemoryReportCache::default();
    assert!(cache.is_empty());
    assert!(cache.get("analysis_34.2_-118.1_2023-08-01_fire").is_none());

    cache.put("analysis_34.2_-118.1_2023-08-01_fire", report.clone());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("analysis_34.2_-118.1_2023-08-01_fire"), Some(report));
}
