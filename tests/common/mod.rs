#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use damagemap::io::{ImageryProvider, SceneCollection};
use damagemap::types::{
    AoiGrid, AreaOfInterest, Band, BandImage, BoundingBox, ClippedImage, DamageError,
    DamageResult, SceneMetadata, VisualizationParams,
};
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Surface reflectance `[blue, green, red, nir]` at a metric offset from the AOI center
pub type Surface = fn(f64, f64) -> [f32; 4];

pub const BANDS: [Band; 4] = [Band::Blue, Band::Green, Band::Red, Band::Nir];

pub struct SyntheticScene {
    pub metadata: SceneMetadata,
    pub surface: Surface,
    pub bands: Vec<Band>,
}

/// In-memory provider that renders synthetic surfaces onto the AOI grid
pub struct SyntheticProvider {
    pub scenes: Vec<SyntheticScene>,
    pub queries: AtomicUsize,
    pub fail_queries: bool,
}

impl SyntheticProvider {
    pub fn new(scenes: Vec<SyntheticScene>) -> Self {
        Self {
            scenes,
            queries: AtomicUsize::new(0),
            fail_queries: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_queries: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl ImageryProvider for SyntheticProvider {
    fn query_collection(
        &self,
        _aoi: &AreaOfInterest,
        max_cloud_cover: f64,
    ) -> DamageResult<SceneCollection> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries {
            return Err(DamageError::Provider("quota exceeded".to_string()));
        }
        Ok(self
            .scenes
            .iter()
            .filter(|s| s.metadata.cloud_cover < max_cloud_cover)
            .map(|s| s.metadata.clone())
            .collect())
    }

    fn clip(
        &self,
        scene: &SceneMetadata,
        aoi: &AreaOfInterest,
        grid: &AoiGrid,
    ) -> DamageResult<ClippedImage> {
        let synthetic = self
            .scenes
            .iter()
            .find(|s| s.metadata.id == scene.id)
            .ok_or_else(|| DamageError::Provider(format!("unknown scene {}", scene.id)))?;

        let mut bands = HashMap::new();
        for (i, band) in BANDS.iter().enumerate() {
            if !synthetic.bands.contains(band) {
                continue;
            }
            let image = Array2::from_shape_fn(grid.dim(), |(row, col)| {
                let (dx, dy) = grid.cell_offset(row, col);
                if aoi.contains_offset(dx, dy) {
                    (synthetic.surface)(dx, dy)[i]
                } else {
                    f32::NAN
                }
            });
            bands.insert(*band, image);
        }

        Ok(ClippedImage {
            metadata: synthetic.metadata.clone(),
            grid: grid.clone(),
            bands,
        })
    }

    fn render_preview(
        &self,
        bands: &[&BandImage],
        _aoi: &AreaOfInterest,
        _grid: &AoiGrid,
        _params: &VisualizationParams,
        label: &str,
    ) -> DamageResult<String> {
        Ok(format!("mem://{}/{}", label, bands.len()))
    }
}

pub fn scene(id: &str, month: u32, day: u32, cloud_cover: f64, surface: Surface) -> SyntheticScene {
    SyntheticScene {
        metadata: SceneMetadata {
            id: id.to_string(),
            acquired: Utc.with_ymd_and_hms(2023, month, day, 10, 30, 0).unwrap(),
            cloud_cover,
            footprint: BoundingBox {
                min_lon: -180.0,
                max_lon: 180.0,
                min_lat: -90.0,
                max_lat: 90.0,
            },
        },
        surface,
        bands: BANDS.to_vec(),
    }
}

// NDVI 0.818, NDWI -0.818
pub fn forest(_dx: f64, _dy: f64) -> [f32; 4] {
    [0.03, 0.05, 0.05, 0.5]
}

// NDVI 0.8
pub fn meadow(_dx: f64, _dy: f64) -> [f32; 4] {
    [0.04, 0.06, 0.05, 0.45]
}

// NDVI 0.3: bare earth after a landslide
pub fn bare_earth(_dx: f64, _dy: f64) -> [f32; 4] {
    [0.08, 0.1, 0.14, 0.26]
}

// NDVI -0.333 east of the center, forest elsewhere
pub fn burned_east(dx: f64, dy: f64) -> [f32; 4] {
    if dx > 0.0 {
        [0.05, 0.08, 0.2, 0.1]
    } else {
        forest(dx, dy)
    }
}

// NDWI 0.714 north of the center, forest elsewhere
pub fn flooded_north(dx: f64, dy: f64) -> [f32; 4] {
    if dy > 0.0 {
        [0.2, 0.3, 0.08, 0.05]
    } else {
        forest(dx, dy)
    }
}

// Scene that does not cover the AOI at all
pub fn no_data(_dx: f64, _dy: f64) -> [f32; 4] {
    [f32::NAN; 4]
}

/// Event on 2023-08-01: decoys at the window edges, the real pair close to the event
pub fn scenes_around_event(before: Surface, after: Surface) -> Vec<SyntheticScene> {
    vec![
        scene("outside-before", 4, 15, 0.0, bare_earth),
        scene("before-early", 5, 10, 1.0, bare_earth),
        scene("before", 7, 28, 4.0, before),
        scene("before-cloudy", 7, 31, 80.0, bare_earth),
        scene("after", 8, 6, 2.0, after),
        scene("after-late", 10, 20, 0.0, forest),
        scene("outside-after", 11, 5, 0.0, forest),
    ]
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
