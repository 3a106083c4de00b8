use crate::core::change::ChangeMask;
use crate::types::{AnalysisParams, AoiGrid, AreaOfInterest, BandImage, DamageError, DamageResult};

/// Converts a self-masked damage raster into a percentage of the AOI area
#[derive(Debug, Clone)]
pub struct AreaAggregator {
    /// Ground sampling distance of the reduction (meters)
    scale_m: f64,
    max_pixels: u64,
}

impl AreaAggregator {
    pub fn new(scale_m: f64, max_pixels: u64) -> Self {
        Self { scale_m, max_pixels }
    }

    pub fn from_params(params: &AnalysisParams) -> Self {
        Self::new(params.reduction_scale_m, params.max_pixels)
    }

    /// Sum of ground area over set mask pixels, sampled every `scale_m` meters
    /// inside the AOI disc. `None` when no sample was set.
    pub fn reduce_region_sum(
        &self,
        mask: &BandImage,
        grid: &AoiGrid,
        aoi: &AreaOfInterest,
    ) -> DamageResult<Option<f64>> {
        if mask.dim() != grid.dim() {
            return Err(DamageError::Processing(format!(
                "Mask shape {:?} does not match the AOI grid {:?}",
                mask.dim(),
                grid.dim()
            )));
        }

        let reduction = AoiGrid::for_aoi(aoi, self.scale_m)?;
        let pixel_area = self.scale_m * self.scale_m;
        log::debug!(
            "Reducing mask on a {}x{} grid at {} m",
            reduction.size,
            reduction.size,
            self.scale_m
        );

        let mut visited: u64 = 0;
        let mut sum: Option<f64> = None;
        for row in 0..reduction.size {
            for col in 0..reduction.size {
                let (dx, dy) = reduction.cell_offset(row, col);
                if !aoi.contains_offset(dx, dy) {
                    continue;
                }
                visited += 1;
                if visited > self.max_pixels {
                    return Err(DamageError::TooManyPixels {
                        pixels: visited,
                        max_pixels: self.max_pixels,
                    });
                }

                let value = match grid.cell_at_offset(dx, dy) {
                    Some(cell) => mask[cell],
                    None => continue,
                };
                if value.is_nan() {
                    continue;
                }
                *sum.get_or_insert(0.0) += value as f64 * pixel_area;
            }
        }

        log::debug!("Visited {} reduction pixels, masked area {:?} m2", visited, sum);
        Ok(sum)
    }

    /// Damaged share of the AOI in percent, rounded to 2 decimals
    pub fn aggregate(
        &self,
        mask: &ChangeMask,
        grid: &AoiGrid,
        aoi: &AreaOfInterest,
    ) -> DamageResult<f64> {
        let total_area = aoi.region_area();
        let damaged_area = match self.reduce_region_sum(&mask.mask, grid, aoi)? {
            Some(area) => area,
            None => {
                log::info!("No pixel passed the change condition");
                return Ok(0.0);
            }
        };

        let percent = round_to_hundredths(damaged_area / total_area * 100.0);
        if !(0.0..=100.0).contains(&percent) {
            // Rasterised disc area and geometric area disagree slightly
            log::warn!("Damage percentage {} outside [0, 100], clamping", percent);
        }
        Ok(percent.clamp(0.0, 100.0))
    }
}

impl Default for AreaAggregator {
    fn default() -> Self {
        Self::from_params(&AnalysisParams::default())
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
