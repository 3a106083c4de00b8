use chrono::{DateTime, Months, NaiveDate, TimeZone, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::str::FromStr;

/// Single-band reflectance or index raster (row = north to south)
pub type BandImage = Array2<f32>;

/// Meters per degree of latitude (local equirectangular approximation)
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Sentinel-2 bands used by the damage pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Blue,  // B2
    Green, // B3
    Red,   // B4
    Nir,   // B8
}

impl Band {
    /// Sentinel-2 band identifier
    pub fn sentinel2_name(&self) -> &'static str {
        match self {
            Band::Blue => "B2",
            Band::Green => "B3",
            Band::Red => "B4",
            Band::Nir => "B8",
        }
    }

    /// Parse a Sentinel-2 band identifier ("B4", "B04", "b8")
    pub fn from_sentinel2_name(name: &str) -> Option<Band> {
        let upper = name.trim().to_uppercase();
        let digits = upper.strip_prefix('B')?;
        match digits.trim_start_matches('0') {
            "2" => Some(Band::Blue),
            "3" => Some(Band::Green),
            "4" => Some(Band::Red),
            "8" => Some(Band::Nir),
            _ => None,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sentinel2_name())
    }
}

/// Disaster types supported by the change detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisasterType {
    Fire,
    Flood,
    Hurricane,
    Earthquake,
}

impl DisasterType {
    pub const ALL: [DisasterType; 4] = [
        DisasterType::Fire,
        DisasterType::Flood,
        DisasterType::Hurricane,
        DisasterType::Earthquake,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DisasterType::Fire => "fire",
            DisasterType::Flood => "flood",
            DisasterType::Hurricane => "hurricane",
            DisasterType::Earthquake => "earthquake",
        }
    }
}

impl std::fmt::Display for DisasterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DisasterType {
    type Err = DamageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fire" => Ok(DisasterType::Fire),
            "flood" => Ok(DisasterType::Flood),
            "hurricane" => Ok(DisasterType::Hurricane),
            "earthquake" => Ok(DisasterType::Earthquake),
            _ => Err(DamageError::UnsupportedDisasterType(s.to_string())),
        }
    }
}

/// Geographic point in degrees (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> DamageResult<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(DamageError::InvalidInput(format!(
                "Latitude {} is outside [-90, 90]",
                lat
            )));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(DamageError::InvalidInput(format!(
                "Longitude {} is outside [-180, 180]",
                lon
            )));
        }
        Ok(Self { lat, lon })
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lat: {}, Lon: {}", self.lat, self.lon)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

/// Geospatial transformation parameters (GDAL order, no rotation support)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0 && self.rotation_y == 0.0
    }

    /// Fractional (row, col) of a world coordinate; only valid when north-up
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.top_left_x) / self.pixel_width;
        let row = (y - self.top_left_y) / self.pixel_height;
        (row, col)
    }
}

/// Disc-shaped analysis region: a point buffered by a fixed radius
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaOfInterest {
    pub center: GeoPoint,
    pub radius_m: f64,
}

impl AreaOfInterest {
    pub fn new(center: GeoPoint, radius_m: f64) -> DamageResult<Self> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(DamageError::InvalidInput(format!(
                "Buffer radius must be positive, got {}",
                radius_m
            )));
        }
        Ok(Self { center, radius_m })
    }

    /// Geometric area of the region in square meters
    pub fn region_area(&self) -> f64 {
        PI * self.radius_m * self.radius_m
    }

    /// Whether a local metric offset (east, north) from the center lies inside
    pub fn contains_offset(&self, dx: f64, dy: f64) -> bool {
        dx * dx + dy * dy <= self.radius_m * self.radius_m
    }

    /// Convert a local metric offset (east, north) to geographic coordinates
    pub fn offset_to_geo(&self, dx: f64, dy: f64) -> (f64, f64) {
        let lat = self.center.lat + dy / METERS_PER_DEGREE;
        let lon = self.center.lon + dx / (METERS_PER_DEGREE * self.center.lat.to_radians().cos());
        (lat, lon)
    }

    /// Whether a footprint overlaps the disc itself, not just its bounding box
    pub fn intersects_footprint(&self, footprint: &BoundingBox) -> bool {
        let lat = self.center.lat.clamp(footprint.min_lat, footprint.max_lat);
        let lon = self.center.lon.clamp(footprint.min_lon, footprint.max_lon);
        let dy = (lat - self.center.lat) * METERS_PER_DEGREE;
        let dx = (lon - self.center.lon) * METERS_PER_DEGREE * self.center.lat.to_radians().cos();
        self.contains_offset(dx, dy)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let (min_lat, min_lon) = self.offset_to_geo(-self.radius_m, -self.radius_m);
        let (max_lat, max_lon) = self.offset_to_geo(self.radius_m, self.radius_m);
        BoundingBox {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }
}

/// North-up square grid covering an AOI, centred on the AOI center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiGrid {
    pub pixel_size_m: f64,
    pub size: usize,
}

impl AoiGrid {
    pub fn for_aoi(aoi: &AreaOfInterest, pixel_size_m: f64) -> DamageResult<Self> {
        if !pixel_size_m.is_finite() || pixel_size_m <= 0.0 {
            return Err(DamageError::InvalidInput(format!(
                "Pixel size must be positive, got {}",
                pixel_size_m
            )));
        }
        let size = ((2.0 * aoi.radius_m) / pixel_size_m).ceil().max(1.0) as usize;
        Ok(Self { pixel_size_m, size })
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.size, self.size)
    }

    /// EPSG:4326 geotransform of the grid around `aoi`
    pub fn geo_transform(&self, aoi: &AreaOfInterest) -> GeoTransform {
        let half = self.half_extent();
        let (top, left) = aoi.offset_to_geo(-half, half);
        let (bottom, right) = aoi.offset_to_geo(half, -half);
        GeoTransform {
            top_left_x: left,
            pixel_width: (right - left) / self.size as f64,
            rotation_x: 0.0,
            top_left_y: top,
            rotation_y: 0.0,
            pixel_height: (bottom - top) / self.size as f64,
        }
    }

    fn half_extent(&self) -> f64 {
        self.size as f64 * self.pixel_size_m / 2.0
    }

    /// Metric offset (east, north) of a cell center
    pub fn cell_offset(&self, row: usize, col: usize) -> (f64, f64) {
        let half = self.half_extent();
        let dx = -half + (col as f64 + 0.5) * self.pixel_size_m;
        let dy = half - (row as f64 + 0.5) * self.pixel_size_m;
        (dx, dy)
    }

    /// Cell containing a metric offset, if inside the grid
    pub fn cell_at_offset(&self, dx: f64, dy: f64) -> Option<(usize, usize)> {
        let half = self.half_extent();
        let col = ((dx + half) / self.pixel_size_m).floor();
        let row = ((half - dy) / self.pixel_size_m).floor();
        if col < 0.0 || row < 0.0 || col >= self.size as f64 || row >= self.size as f64 {
            return None;
        }
        Some((row as usize, col as usize))
    }
}

/// Before/after acquisition windows around an event date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageryWindow {
    pub before_start: NaiveDate,
    pub event: NaiveDate,
    pub after_end: NaiveDate,
}

impl ImageryWindow {
    pub fn around(event: NaiveDate, months: u32) -> DamageResult<Self> {
        let span = Months::new(months);
        let before_start = event.checked_sub_months(span).ok_or_else(|| {
            DamageError::InvalidDate(format!("{} minus {} months is out of range", event, months))
        })?;
        let after_end = event.checked_add_months(span).ok_or_else(|| {
            DamageError::InvalidDate(format!("{} plus {} months is out of range", event, months))
        })?;
        Ok(Self {
            before_start,
            event,
            after_end,
        })
    }

    /// Half-open `[before_start, event)` in UTC
    pub fn before_range(&self) -> DamageResult<(DateTime<Utc>, DateTime<Utc>)> {
        Ok((midnight_utc(self.before_start)?, midnight_utc(self.event)?))
    }

    /// Half-open `[event, after_end)` in UTC
    pub fn after_range(&self) -> DamageResult<(DateTime<Utc>, DateTime<Utc>)> {
        Ok((midnight_utc(self.event)?, midnight_utc(self.after_end)?))
    }
}

pub fn midnight_utc(date: NaiveDate) -> DamageResult<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| DamageError::InvalidDate(format!("No midnight on {}", date)))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Catalog entry for one acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub cloud_cover: f64,
    pub footprint: BoundingBox,
}

/// Scene resampled onto an AOI grid; NaN outside the AOI or footprint
#[derive(Debug, Clone)]
pub struct ClippedImage {
    pub metadata: SceneMetadata,
    pub grid: AoiGrid,
    pub bands: HashMap<Band, BandImage>,
}

impl ClippedImage {
    pub fn band(&self, band: Band) -> DamageResult<&BandImage> {
        self.bands.get(&band).ok_or(DamageError::MissingBand(band))
    }
}

/// The selected before/after scenes
#[derive(Debug, Clone)]
pub struct ImageryPair {
    pub before: ClippedImage,
    pub after: ClippedImage,
}

/// Linear stretch and palette for preview rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationParams {
    pub min: f64,
    pub max: f64,
    pub palette: &'static [&'static str],
}

/// Claims-triage classification of a damage percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    AutomaticallyApproved,
    FlaggedForReview,
    LightDamage,
    NoSignificantDamage,
}

impl Severity {
    /// Thresholds are evaluated severe, considerable, none; light is the fallback
    pub fn from_percent(damage_percent: f64) -> Self {
        if damage_percent > 70.0 {
            Severity::AutomaticallyApproved
        } else if damage_percent > 30.0 {
            Severity::FlaggedForReview
        } else if damage_percent < 5.0 {
            Severity::NoSignificantDamage
        } else {
            Severity::LightDamage
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::AutomaticallyApproved => "Automatically Approved (Severe Damage)",
            Severity::FlaggedForReview => "Flagged For Review (Considerable Damage)",
            Severity::LightDamage => "Light Damage Detected",
            Severity::NoSignificantDamage => "No Significant Damage Detected",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// References to the rendered before/after/change previews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationRefs {
    pub before: String,
    pub after: String,
    pub change: String,
}

/// Result of one damage analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageReport {
    pub damage_percent: f64,
    pub severity: Severity,
    pub visualization: VisualizationRefs,
    pub disaster_type: DisasterType,
    pub location: GeoPoint,
    pub event_date: NaiveDate,
    pub before_scene: String,
    pub after_scene: String,
    pub before_acquired: DateTime<Utc>,
    pub after_acquired: DateTime<Utc>,
}

/// Pipeline parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisParams {
    /// Buffer radius around the point (meters)
    pub buffer_radius_m: f64,
    /// Months searched before and after the event
    pub window_months: u32,
    /// Scenes must report strictly less cloud cover than this (percent)
    pub max_cloud_cover: f64,
    /// Pixel size of the clipped analysis grid (meters)
    pub analysis_pixel_size_m: f64,
    /// Ground sampling distance of the area reduction (meters)
    pub reduction_scale_m: f64,
    /// Hard cap on pixels visited by the area reduction
    pub max_pixels: u64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            buffer_radius_m: 1000.0,
            window_months: 3,
            max_cloud_cover: 15.0,
            analysis_pixel_size_m: 10.0, // Sentinel-2 native resolution
            reduction_scale_m: 30.0,
            max_pixels: 1_000_000_000,
        }
    }
}

/// Error types for damage analysis
#[derive(Debug, thiserror::Error)]
pub enum DamageError {
    #[error(
        "No cloud-free images were found within the search window before ({before} found) \
         or after ({after} found) the specified date and location. \
         Please try a different date range or area."
    )]
    NoEligibleImagery { before: usize, after: usize },

    #[error(
        "Disaster type '{0}' is not supported. \
         Use 'fire', 'flood', 'hurricane', or 'earthquake'."
    )]
    UnsupportedDisasterType(String),

    #[error("Imagery provider error: {0}")]
    Provider(String),

    #[error("Band {0} is not available in the scene")]
    MissingBand(Band),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Area reduction would visit {pixels} pixels, more than the limit of {max_pixels}")]
    TooManyPixels { pixels: u64, max_pixels: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

impl DamageError {
    /// Errors caused by the request itself; the caller may retry with other parameters
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DamageError::NoEligibleImagery { .. }
                | DamageError::UnsupportedDisasterType(_)
                | DamageError::InvalidDate(_)
                | DamageError::InvalidInput(_)
        )
    }
}

/// Result type for damage analysis operations
pub type DamageResult<T> = Result<T, DamageError>;
