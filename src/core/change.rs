use crate::core::indices::{IndexKind, SpectralIndex};
use crate::types::{BandImage, DamageError, DamageResult, DisasterType, VisualizationParams};
use ndarray::Zip;

/// How a rule turns the before/after index pair into a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPredicate {
    /// `before - after > threshold`; the change raster is the delta
    IndexDrop,
    /// `before < threshold && after > threshold`; the change raster is `after`
    Emergence,
}

/// Change detection rule for one disaster type
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRule {
    pub index: IndexKind,
    pub threshold: f32,
    pub predicate: MaskPredicate,
    pub palette: VisualizationParams,
}

const FIRE_RULE: ChangeRule = ChangeRule {
    index: IndexKind::Vegetation,
    threshold: 0.6,
    predicate: MaskPredicate::IndexDrop,
    palette: VisualizationParams {
        min: -0.5,
        max: 1.0,
        palette: &["blue", "white", "green", "yellow", "red"],
    },
};

const FLOOD_RULE: ChangeRule = ChangeRule {
    index: IndexKind::Water,
    threshold: 0.3,
    predicate: MaskPredicate::Emergence,
    palette: VisualizationParams {
        min: -0.5,
        max: 1.0,
        palette: &["orange", "white", "blue"],
    },
};

// Landslide proxy: bare earth keeps more NDVI than ash, hence the lower threshold
const EARTHQUAKE_RULE: ChangeRule = ChangeRule {
    index: IndexKind::Vegetation,
    threshold: 0.4,
    predicate: MaskPredicate::IndexDrop,
    palette: VisualizationParams {
        min: -0.2,
        max: 0.8,
        palette: &["blue", "white", "green", "brown", "red"],
    },
};

impl DisasterType {
    /// Rule table; hurricane damage is analysed as flooding
    pub fn change_rule(&self) -> &'static ChangeRule {
        match self {
            DisasterType::Fire => &FIRE_RULE,
            DisasterType::Flood | DisasterType::Hurricane => &FLOOD_RULE,
            DisasterType::Earthquake => &EARTHQUAKE_RULE,
        }
    }
}

/// Self-masked damage raster: 1.0 where the rule fired, NaN elsewhere
#[derive(Debug, Clone)]
pub struct ChangeMask {
    pub mask: BandImage,
    /// Continuous signal used for the change preview
    pub change: BandImage,
    pub threshold: f32,
}

impl ChangeMask {
    pub fn set_pixels(&self) -> usize {
        self.mask.iter().filter(|v| !v.is_nan()).count()
    }
}

/// Applies the per-disaster rule to a before/after index pair
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn detect(
        disaster_type: DisasterType,
        before: &SpectralIndex,
        after: &SpectralIndex,
    ) -> DamageResult<ChangeMask> {
        let rule = disaster_type.change_rule();
        log::info!(
            "Detecting {} damage with {} threshold {}",
            disaster_type,
            rule.index.name(),
            rule.threshold
        );
        Self::apply_rule(rule, before, after)
    }

    pub fn apply_rule(
        rule: &ChangeRule,
        before: &SpectralIndex,
        after: &SpectralIndex,
    ) -> DamageResult<ChangeMask> {
        if before.kind != rule.index || after.kind != rule.index {
            return Err(DamageError::Processing(format!(
                "Rule needs {} but got {} / {}",
                rule.index.name(),
                before.kind.name(),
                after.kind.name()
            )));
        }
        if before.values.dim() != after.values.dim() {
            return Err(DamageError::Processing(format!(
                "Before {:?} and after {:?} index rasters differ in shape",
                before.values.dim(),
                after.values.dim()
            )));
        }

        let threshold = rule.threshold;
        let (mask, change) = match rule.predicate {
            MaskPredicate::IndexDrop => {
                let delta = Zip::from(&before.values)
                    .and(&after.values)
                    .map_collect(|&b, &a| b - a);
                // NaN comparisons are false, so unset pixels stay unset
                let mask = delta.mapv(|d| if d > threshold { 1.0 } else { f32::NAN });
                (mask, delta)
            }
            MaskPredicate::Emergence => {
                let mask = Zip::from(&before.values)
                    .and(&after.values)
                    .map_collect(|&b, &a| {
                        if b < threshold && a > threshold {
                            1.0
                        } else {
                            f32::NAN
                        }
                    });
                (mask, after.values.clone())
            }
        };

        let result = ChangeMask {
            mask,
            change,
            threshold,
        };
        log::debug!("{} pixels passed the change condition", result.set_pixels());
        Ok(result)
    }
}
