//! Normalized-difference spectral indices
//!
//! Both indices used for damage detection are normalized differences of two
//! Sentinel-2 bands: `(a - b) / (a + b)`, in [-1, 1]. Pixels where either
//! band is unset, or where the bands sum to zero, stay unset (NaN).

use crate::types::{Band, BandImage, ClippedImage, DamageError, DamageResult};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Named indices and the band pair each one differences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// NDVI = (NIR - Red) / (NIR + Red); high over healthy vegetation
    Vegetation,
    /// NDWI = (Green - NIR) / (Green + NIR); positive over open water
    Water,
}

impl IndexKind {
    pub fn bands(&self) -> (Band, Band) {
        match self {
            IndexKind::Vegetation => (Band::Nir, Band::Red),
            IndexKind::Water => (Band::Green, Band::Nir),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Vegetation => "NDVI",
            IndexKind::Water => "NDWI",
        }
    }
}

/// Single-band index raster over the AOI grid
#[derive(Debug, Clone)]
pub struct SpectralIndex {
    pub kind: IndexKind,
    pub values: BandImage,
}

/// Pixel-wise `(a - b) / (a + b)` of two bands of a clipped scene
pub fn normalized_difference(
    image: &ClippedImage,
    band_a: Band,
    band_b: Band,
) -> DamageResult<BandImage> {
    let a = image.band(band_a)?;
    let b = image.band(band_b)?;
    if a.dim() != b.dim() {
        return Err(DamageError::Processing(format!(
            "Band {} is {:?} but band {} is {:?}",
            band_a,
            a.dim(),
            band_b,
            b.dim()
        )));
    }

    let zip = Zip::from(a).and(b);
    #[cfg(feature = "parallel")]
    let values = zip.par_map_collect(|&a, &b| normalized_pixel(a, b));
    #[cfg(not(feature = "parallel"))]
    let values = zip.map_collect(|&a, &b| normalized_pixel(a, b));

    Ok(values)
}

#[inline]
fn normalized_pixel(a: f32, b: f32) -> f32 {
    if !a.is_finite() || !b.is_finite() {
        return f32::NAN;
    }
    let sum = a + b;
    if sum.abs() < 1e-10 {
        return f32::NAN;
    }
    (a - b) / sum
}

/// Compute a named index for a clipped scene
pub fn compute_index(image: &ClippedImage, kind: IndexKind) -> DamageResult<SpectralIndex> {
    let (band_a, band_b) = kind.bands();
    log::debug!("Computing {} for scene {}", kind.name(), image.metadata.id);
    Ok(SpectralIndex {
        kind,
        values: normalized_difference(image, band_a, band_b)?,
    })
}

pub fn vegetation_index(image: &ClippedImage) -> DamageResult<SpectralIndex> {
    compute_index(image, IndexKind::Vegetation)
}

pub fn water_index(image: &ClippedImage) -> DamageResult<SpectralIndex> {
    compute_index(image, IndexKind::Water)
}
