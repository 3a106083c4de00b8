use crate::core::visualize;
use crate::io::download::BandDownloader;
use crate::io::preview::PreviewWriter;
use crate::io::provider::{ImageryProvider, SceneCollection};
use crate::types::{
    AoiGrid, AreaOfInterest, Band, BandImage, BoundingBox, ClippedImage, DamageError,
    DamageResult, GeoTransform, SceneMetadata, VisualizationParams,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use gdal::spatial_ref::SpatialRef;
use gdal::Dataset;
use ndarray::Array2;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Manifest file name inside a catalog directory
pub const CATALOG_MANIFEST: &str = "catalog.xml";

/// Catalog manifest, the root <catalog> element
#[derive(Debug, Deserialize)]
pub struct CatalogManifest {
    pub collection: Option<String>,
    #[serde(rename = "scene", default)]
    pub scenes: Vec<SceneEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SceneEntry {
    pub id: String,
    pub acquired: Option<String>,
    #[serde(rename = "cloudCover")]
    pub cloud_cover: f64,
    pub footprint: FootprintEntry,
    #[serde(rename = "band", default)]
    pub bands: Vec<BandEntry>,
}

#[derive(Debug, Deserialize)]
pub struct FootprintEntry {
    #[serde(rename = "minLon")]
    pub min_lon: f64,
    #[serde(rename = "maxLon")]
    pub max_lon: f64,
    #[serde(rename = "minLat")]
    pub min_lat: f64,
    #[serde(rename = "maxLat")]
    pub max_lat: f64,
}

#[derive(Debug, Deserialize)]
pub struct BandEntry {
    pub name: String,
    pub href: String,
}

/// Catalog provider configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Directory holding `catalog.xml`; relative band hrefs resolve against it
    pub root: PathBuf,
    /// Where downloaded band files are cached
    pub cache_dir: PathBuf,
    /// Where rendered previews are written
    pub preview_dir: PathBuf,
    pub download_retries: u32,
    pub download_timeout: Duration,
}

impl CatalogConfig {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            preview_dir: root.join("previews"),
            root,
            cache_dir: BandDownloader::default_cache_dir(),
            download_retries: 3,
            download_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
struct CatalogScene {
    metadata: SceneMetadata,
    bands: HashMap<Band, String>,
}

/// Pixel window read from a band file
#[derive(Debug, Clone)]
pub struct RasterWindow {
    pub data: Array2<f32>,
    pub transform: GeoTransform,
    pub nodata: Option<f64>,
}

/// File-backed imagery provider: an XML manifest plus single-band GeoTIFFs (EPSG:4326)
pub struct SceneCatalog {
    config: CatalogConfig,
    collection: Option<String>,
    scenes: Vec<CatalogScene>,
    downloader: BandDownloader,
    previews: PreviewWriter,
}

impl SceneCatalog {
    /// Open `<root>/catalog.xml`
    pub fn open(config: CatalogConfig) -> DamageResult<Self> {
        let manifest_path = config.root.join(CATALOG_MANIFEST);
        log::info!("Reading scene catalog: {}", manifest_path.display());
        let xml_content = std::fs::read_to_string(&manifest_path).map_err(|e| {
            DamageError::Provider(format!(
                "Failed to read catalog manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })?;
        Self::from_manifest_str(&xml_content, config)
    }

    pub fn from_manifest_str(xml_content: &str, config: CatalogConfig) -> DamageResult<Self> {
        let manifest = from_str::<CatalogManifest>(xml_content).map_err(|e| {
            DamageError::XmlParsing(format!("Failed to parse catalog manifest: {}", e))
        })?;

        let scenes = manifest
            .scenes
            .into_iter()
            .map(Self::scene_from_entry)
            .collect::<DamageResult<Vec<_>>>()?;

        log::info!(
            "Catalog {} holds {} scenes",
            manifest.collection.as_deref().unwrap_or("<unnamed>"),
            scenes.len()
        );

        let downloader = BandDownloader::new(
            &config.cache_dir,
            config.download_retries,
            config.download_timeout,
        );
        let previews = PreviewWriter::new(&config.preview_dir);

        Ok(Self {
            config,
            collection: manifest.collection,
            scenes,
            downloader,
            previews,
        })
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    fn scene_from_entry(entry: SceneEntry) -> DamageResult<CatalogScene> {
        let acquired = match entry.acquired.as_deref() {
            Some(text) => parse_acquisition_time(text)?,
            None => acquisition_time_from_product_id(&entry.id)?,
        };

        let mut bands = HashMap::new();
        for band in entry.bands {
            match Band::from_sentinel2_name(&band.name) {
                Some(parsed) => {
                    bands.insert(parsed, band.href);
                }
                None => log::debug!("Scene {}: ignoring band {}", entry.id, band.name),
            }
        }

        let footprint = BoundingBox {
            min_lon: entry.footprint.min_lon,
            max_lon: entry.footprint.max_lon,
            min_lat: entry.footprint.min_lat,
            max_lat: entry.footprint.max_lat,
        };

        Ok(CatalogScene {
            metadata: SceneMetadata {
                id: entry.id,
                acquired,
                cloud_cover: entry.cloud_cover,
                footprint,
            },
            bands,
        })
    }

    fn find_scene(&self, id: &str) -> DamageResult<&CatalogScene> {
        self.scenes
            .iter()
            .find(|s| s.metadata.id == id)
            .ok_or_else(|| DamageError::Provider(format!("Scene {} is not in the catalog", id)))
    }

    /// Local path of a band file, downloading remote hrefs into the cache
    fn resolve_href(&self, href: &str) -> DamageResult<PathBuf> {
        if BandDownloader::is_remote(href) {
            self.downloader.fetch(href)
        } else {
            Ok(self.config.root.join(href))
        }
    }

    /// Read the window of a band file that covers `bbox`
    pub fn read_band_window<P: AsRef<Path>>(
        path: P,
        bbox: &BoundingBox,
    ) -> DamageResult<RasterWindow> {
        log::debug!("Reading band window from: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        check_wgs84(&dataset, path.as_ref())?;
        let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        if !transform.is_north_up() {
            return Err(DamageError::Provider(format!(
                "Band file {} has a rotated geotransform ({}, {})",
                path.as_ref().display(),
                transform.rotation_x,
                transform.rotation_y
            )));
        }
        let (width, height) = dataset.raster_size();

        let (row_a, col_a) = transform.world_to_pixel(bbox.min_lon, bbox.max_lat);
        let (row_b, col_b) = transform.world_to_pixel(bbox.max_lon, bbox.min_lat);
        let row_start = row_a.min(row_b).floor().clamp(0.0, height as f64) as usize;
        let row_end = row_a.max(row_b).ceil().clamp(0.0, height as f64) as usize;
        let col_start = col_a.min(col_b).floor().clamp(0.0, width as f64) as usize;
        let col_end = col_a.max(col_b).ceil().clamp(0.0, width as f64) as usize;

        let window_transform = GeoTransform {
            top_left_x: transform.top_left_x + col_start as f64 * transform.pixel_width,
            top_left_y: transform.top_left_y + row_start as f64 * transform.pixel_height,
            ..transform
        };

        let rasterband = dataset.rasterband(1)?;
        let nodata = rasterband.no_data_value();

        let (rows, cols) = (row_end - row_start, col_end - col_start);
        if rows == 0 || cols == 0 {
            return Ok(RasterWindow {
                data: Array2::zeros((0, 0)),
                transform: window_transform,
                nodata,
            });
        }

        let band_data = rasterband.read_as::<f32>(
            (col_start as isize, row_start as isize),
            (cols, rows),
            (cols, rows),
            None,
        )?;
        let data = Array2::from_shape_vec((rows, cols), band_data.data)
            .map_err(|e| DamageError::Processing(format!("Failed to reshape band data: {}", e)))?;

        Ok(RasterWindow {
            data,
            transform: window_transform,
            nodata,
        })
    }
}

impl ImageryProvider for SceneCatalog {
    fn query_collection(
        &self,
        aoi: &AreaOfInterest,
        max_cloud_cover: f64,
    ) -> DamageResult<SceneCollection> {
        let collection: SceneCollection = self
            .scenes
            .iter()
            .filter(|s| aoi.intersects_footprint(&s.metadata.footprint))
            .filter(|s| s.metadata.cloud_cover < max_cloud_cover)
            .map(|s| s.metadata.clone())
            .collect();

        log::debug!(
            "{} of {} catalog scenes intersect the AOI below {}% cloud cover",
            collection.len(),
            self.scenes.len(),
            max_cloud_cover
        );
        Ok(collection)
    }

    fn clip(
        &self,
        scene: &SceneMetadata,
        aoi: &AreaOfInterest,
        grid: &AoiGrid,
    ) -> DamageResult<ClippedImage> {
        log::info!("Clipping scene {} to the AOI", scene.id);
        let entry = self.find_scene(&scene.id)?;
        let bbox = aoi.bounding_box();

        let mut bands = HashMap::new();
        for (band, href) in &entry.bands {
            let path = self.resolve_href(href)?;
            let window = Self::read_band_window(&path, &bbox)?;
            bands.insert(*band, resample_to_grid(&window, aoi, grid));
        }

        Ok(ClippedImage {
            metadata: entry.metadata.clone(),
            grid: grid.clone(),
            bands,
        })
    }

    fn render_preview(
        &self,
        bands: &[&BandImage],
        aoi: &AreaOfInterest,
        grid: &AoiGrid,
        params: &VisualizationParams,
        label: &str,
    ) -> DamageResult<String> {
        let rgba = visualize::render(bands, params)?;
        self.previews.write(&rgba, &grid.geo_transform(aoi), label)
    }
}

/// Band files must be in EPSG:4326
fn check_wgs84(dataset: &Dataset, path: &Path) -> DamageResult<()> {
    let srs = dataset.spatial_ref().map_err(|e| {
        DamageError::Provider(format!("Band file {} has no CRS: {}", path.display(), e))
    })?;
    if srs.auth_code().ok() == Some(4326) || srs == SpatialRef::from_epsg(4326)? {
        return Ok(());
    }
    Err(DamageError::Provider(format!(
        "Band file {} is not in EPSG:4326 ({})",
        path.display(),
        srs.name().unwrap_or_else(|_| "unknown CRS".to_string())
    )))
}

/// Nearest-neighbour resample of a raster window onto the AOI grid
pub fn resample_to_grid(window: &RasterWindow, aoi: &AreaOfInterest, grid: &AoiGrid) -> BandImage {
    let (rows, cols) = window.data.dim();
    Array2::from_shape_fn(grid.dim(), |(row, col)| {
        let (dx, dy) = grid.cell_offset(row, col);
        if !aoi.contains_offset(dx, dy) {
            return f32::NAN;
        }
        let (lat, lon) = aoi.offset_to_geo(dx, dy);
        let (src_row, src_col) = window.transform.world_to_pixel(lon, lat);
        if src_row < 0.0 || src_col < 0.0 {
            return f32::NAN;
        }
        let (src_row, src_col) = (src_row.floor() as usize, src_col.floor() as usize);
        if src_row >= rows || src_col >= cols {
            return f32::NAN;
        }
        let value = window.data[[src_row, src_col]];
        match window.nodata {
            Some(nodata) if (value as f64 - nodata).abs() < f64::EPSILON => f32::NAN,
            _ => value,
        }
    })
}

pub fn parse_acquisition_time(text: &str) -> DamageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DamageError::Provider(format!("Invalid acquisition time '{}': {}", text, e)))
}

/// Sensing time embedded in a Sentinel-2 product id (`..._20230801T103031_...`)
pub fn acquisition_time_from_product_id(product_id: &str) -> DamageResult<DateTime<Utc>> {
    let pattern = Regex::new(r"_(\d{8}T\d{6})(?:_|$)")
        .map_err(|e| DamageError::Processing(format!("Regex error: {}", e)))?;
    let stamp = pattern
        .captures(product_id)
        .and_then(|c| c.get(1))
        .ok_or_else(|| {
            DamageError::Provider(format!(
                "Scene {} has no <acquired> element and no timestamp in its id",
                product_id
            ))
        })?;

    let naive = NaiveDateTime::parse_from_str(stamp.as_str(), "%Y%m%dT%H%M%S")
        .map_err(|e| DamageError::Provider(format!("Invalid timestamp in {}: {}", product_id, e)))?;
    Ok(Utc.from_utc_datetime(&naive))
}
