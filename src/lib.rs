//! damagemap: disaster damage triage from before/after Sentinel-2 imagery
//!
//! Given a point, an event date and a disaster type, the pipeline selects the
//! closest cloud-free scenes before and after the event, differences a
//! spectral index, thresholds the change into a damage mask and reports the
//! damaged share of a 1 km buffer together with a claims-triage severity.

pub mod types;
pub mod io;
pub mod core;
pub mod service;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    AnalysisParams, AreaOfInterest, Band, DamageError, DamageReport, DamageResult, DisasterType,
    GeoPoint, ImageryWindow, Severity,
};

pub use io::{ImageryProvider, SceneCatalog, CatalogConfig};
pub use crate::core::{DamageAnalyzer, ChangeDetector, AreaAggregator, ImagerySelector};
pub use service::{DamageService, EnrichedReport, MemoryReportCache, RiskZoneTable};
