//! Core damage-detection modules

pub mod selection;
pub mod indices;
pub mod change;
pub mod aggregate;
pub mod visualize;
pub mod analyzer;

// Re-export main types
pub use selection::ImagerySelector;
pub use indices::{IndexKind, SpectralIndex, normalized_difference, vegetation_index, water_index};
pub use change::{ChangeDetector, ChangeMask, ChangeRule, MaskPredicate};
pub use aggregate::AreaAggregator;
pub use analyzer::{DamageAnalyzer, classify, parse_event_date};
