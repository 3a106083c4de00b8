//! Request-level wrapper around the pipeline: response caching and risk-zone
//! annotation, both injected as ports so the analyzer itself stays pure.

use crate::core::analyzer::DamageAnalyzer;
use crate::io::provider::ImageryProvider;
use crate::types::{DamageReport, DamageResult, DisasterType, GeoPoint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Memoization of finished reports keyed by request parameters
pub trait ReportCache: Send + Sync {
    fn get(&self, key: &str) -> Option<DamageReport>;
    fn put(&self, key: &str, report: DamageReport);
}

/// Static risk context for a location and disaster type
pub trait RiskLookup: Send + Sync {
    fn risk_context(&self, location: &GeoPoint, disaster_type: DisasterType) -> String;
}

/// Report plus caller-facing enrichments; the report itself is an untouched copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedReport {
    pub report: DamageReport,
    pub risk_context: String,
    pub cached: bool,
}

/// Cache key for one analysis request
pub fn cache_key(lat: f64, lon: f64, event_date: &str, disaster_type: &str) -> String {
    format!("analysis_{}_{}_{}_{}", lat, lon, event_date, disaster_type)
}

struct CacheEntry {
    stored: Instant,
    seq: u64,
    report: DamageReport,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
}

/// In-process report cache with a fixed time-to-live and an entry cap
pub struct MemoryReportCache {
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl MemoryReportCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
    pub const DEFAULT_MAX_ENTRIES: usize = 500;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryReportCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

impl ReportCache for MemoryReportCache {
    fn get(&self, key: &str) -> Option<DamageReport> {
        let mut state = self.state.lock().ok()?;
        let expired = match state.entries.get(key) {
            Some(entry) if entry.stored.elapsed() < self.ttl => return Some(entry.report.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            log::debug!("Cache entry {} expired", key);
            state.entries.remove(key);
        }
        None
    }

    fn put(&self, key: &str, report: DamageReport) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let ttl = self.ttl;
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.stored.elapsed() < ttl);
        if state.entries.len() < before {
            log::debug!("Dropped {} expired cache entries", before - state.entries.len());
        }

        while state.entries.len() >= self.max_entries && !state.entries.contains_key(key) {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(oldest) => {
                    log::debug!("Cache full, evicting {}", oldest);
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                stored: Instant::now(),
                seq,
                report,
            },
        );
    }
}

/// Rectangular risk zone, exclusive bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskZone {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    pub alert: String,
}

impl RiskZone {
    pub fn contains(&self, location: &GeoPoint) -> bool {
        location.lat > self.min_lat
            && location.lat < self.max_lat
            && location.lon > self.min_lon
            && location.lon < self.max_lon
    }
}

/// Lookup table of known flood/storm-surge and seismic zones
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskZoneTable {
    pub flood_zones: Vec<RiskZone>,
    pub seismic_zones: Vec<RiskZone>,
}

impl Default for RiskZoneTable {
    fn default() -> Self {
        Self {
            flood_zones: vec![RiskZone {
                // New Orleans
                min_lat: 29.0,
                max_lat: 31.0,
                min_lon: -91.0,
                max_lon: -89.0,
                alert: "ALERT! This property is in a High-Risk Flood/Storm Surge Zone \
                        designated by FEMA (e.g., Zone AE)."
                    .to_string(),
            }],
            seismic_zones: vec![RiskZone {
                // Los Angeles
                min_lat: 33.0,
                max_lat: 35.0,
                min_lon: -119.0,
                max_lon: -117.0,
                alert: "ALERT! This property is in a High-Risk Seismic Zone \
                        (e.g., near San Andreas Fault)."
                    .to_string(),
            }],
        }
    }
}

impl RiskLookup for RiskZoneTable {
    fn risk_context(&self, location: &GeoPoint, disaster_type: DisasterType) -> String {
        let find = |zones: &[RiskZone]| {
            zones
                .iter()
                .find(|z| z.contains(location))
                .map(|z| z.alert.clone())
        };
        match disaster_type {
            DisasterType::Flood | DisasterType::Hurricane => {
                find(&self.flood_zones).unwrap_or_else(|| {
                    "Property is outside of known high-risk flood zones.".to_string()
                })
            }
            DisasterType::Earthquake => find(&self.seismic_zones).unwrap_or_else(|| {
                "Property is outside of known high-risk seismic zones.".to_string()
            }),
            DisasterType::Fire => {
                "Wildfire risk context for this area is under analysis.".to_string()
            }
        }
    }
}

/// Analyzer with caching and risk annotation
pub struct DamageService<P, C, R>
where
    P: ImageryProvider,
    C: ReportCache,
    R: RiskLookup,
{
    analyzer: DamageAnalyzer<P>,
    cache: C,
    risk: R,
}

impl<P, C, R> DamageService<P, C, R>
where
    P: ImageryProvider,
    C: ReportCache,
    R: RiskLookup,
{
    pub fn new(analyzer: DamageAnalyzer<P>, cache: C, risk: R) -> Self {
        Self {
            analyzer,
            cache,
            risk,
        }
    }

    pub fn analyzer(&self) -> &DamageAnalyzer<P> {
        &self.analyzer
    }

    /// Cached analysis; failures are returned as-is and never cached
    pub fn analyze(
        &self,
        lat: f64,
        lon: f64,
        event_date: &str,
        disaster_type: &str,
    ) -> DamageResult<EnrichedReport> {
        let key = cache_key(lat, lon, event_date, disaster_type);

        let (report, cached) = match self.cache.get(&key) {
            Some(report) => {
                log::info!("Returning cached report for {}", key);
                (report, true)
            }
            None => {
                log::info!("Computing report for {}", key);
                let report = self.analyzer.analyze(lat, lon, event_date, disaster_type)?;
                self.cache.put(&key, report.clone());
                (report, false)
            }
        };

        let risk_context = self.risk.risk_context(&report.location, report.disaster_type);

        Ok(EnrichedReport {
            report,
            risk_context,
            cached,
        })
    }
}
