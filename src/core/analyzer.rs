use crate::core::aggregate::AreaAggregator;
use crate::core::change::ChangeDetector;
use crate::core::indices::{compute_index, IndexKind, SpectralIndex};
use crate::core::selection::ImagerySelector;
use crate::core::visualize::RGB_VISUALIZATION;
use crate::io::provider::ImageryProvider;
use crate::types::{
    AnalysisParams, AoiGrid, AreaOfInterest, Band, ClippedImage, DamageError, DamageReport,
    DamageResult, DisasterType, GeoPoint, ImageryWindow, Severity, VisualizationRefs,
};
use chrono::{DateTime, NaiveDate};

/// End-to-end damage analysis for a point, date and disaster type
pub struct DamageAnalyzer<P: ImageryProvider> {
    provider: P,
    params: AnalysisParams,
}

impl<P: ImageryProvider> DamageAnalyzer<P> {
    /// Create an analyzer with default parameters
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            params: AnalysisParams::default(),
        }
    }

    /// Create an analyzer with custom parameters
    pub fn with_params(provider: P, params: AnalysisParams) -> Self {
        Self { provider, params }
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Analyze from raw request values
    pub fn analyze(
        &self,
        lat: f64,
        lon: f64,
        event_date: &str,
        disaster_type: &str,
    ) -> DamageResult<DamageReport> {
        let disaster_type: DisasterType = disaster_type.parse()?;
        let event_date = parse_event_date(event_date)?;
        let location = GeoPoint::new(lat, lon)?;
        self.analyze_event(location, event_date, disaster_type)
    }

    pub fn analyze_event(
        &self,
        location: GeoPoint,
        event_date: NaiveDate,
        disaster_type: DisasterType,
    ) -> DamageResult<DamageReport> {
        log::info!(
            "Analyzing {} damage at {} for event date {}",
            disaster_type,
            location,
            event_date
        );
        log::debug!("Analysis parameters: {:?}", self.params);

        let aoi = AreaOfInterest::new(location, self.params.buffer_radius_m)?;
        let window = ImageryWindow::around(event_date, self.params.window_months)?;
        let grid = AoiGrid::for_aoi(&aoi, self.params.analysis_pixel_size_m)?;

        let pair = ImagerySelector::new(&self.provider, self.params.max_cloud_cover)
            .select(&aoi, &window, &grid)?;

        let rule = disaster_type.change_rule();
        ensure_coverage(&pair.before, rule.index)?;
        ensure_coverage(&pair.after, rule.index)?;

        let compute = |image: &ClippedImage| -> DamageResult<SpectralIndex> {
            compute_index(image, rule.index)
        };

        #[cfg(feature = "parallel")]
        let (before_index, after_index) =
            rayon::join(|| compute(&pair.before), || compute(&pair.after));
        #[cfg(not(feature = "parallel"))]
        let (before_index, after_index) = (compute(&pair.before), compute(&pair.after));

        let mask = ChangeDetector::detect(disaster_type, &before_index?, &after_index?)?;
        let damage_percent =
            AreaAggregator::from_params(&self.params).aggregate(&mask, &grid, &aoi)?;
        let severity = classify(damage_percent);

        log::info!("Damage: {:.2}% -> {}", damage_percent, severity);

        let label = format!(
            "{}_{:.5}_{:.5}_{}",
            disaster_type, location.lat, location.lon, event_date
        );
        let visualization = VisualizationRefs {
            before: self.render_true_color(&pair.before, &aoi, &format!("{}_before", label))?,
            after: self.render_true_color(&pair.after, &aoi, &format!("{}_after", label))?,
            change: self.provider.render_preview(
                &[&mask.change],
                &aoi,
                &grid,
                &rule.palette,
                &format!("{}_change", label),
            )?,
        };

        Ok(DamageReport {
            damage_percent,
            severity,
            visualization,
            disaster_type,
            location,
            event_date,
            before_scene: pair.before.metadata.id.clone(),
            after_scene: pair.after.metadata.id.clone(),
            before_acquired: pair.before.metadata.acquired,
            after_acquired: pair.after.metadata.acquired,
        })
    }

    fn render_true_color(
        &self,
        image: &ClippedImage,
        aoi: &AreaOfInterest,
        label: &str,
    ) -> DamageResult<String> {
        let red = image.band(Band::Red)?;
        let green = image.band(Band::Green)?;
        let blue = image.band(Band::Blue)?;
        self.provider.render_preview(
            &[red, green, blue],
            aoi,
            &image.grid,
            &RGB_VISUALIZATION,
            label,
        )
    }
}

/// A scene with no valid pixel over the AOI is a data gap, not "no damage"
fn ensure_coverage(image: &ClippedImage, index: IndexKind) -> DamageResult<()> {
    let (band_a, band_b) = index.bands();
    for band in [band_a, band_b] {
        if !image.band(band)?.iter().any(|v| v.is_finite()) {
            return Err(DamageError::Provider(format!(
                "Scene {} has no valid {} pixels over the area of interest",
                image.metadata.id, band
            )));
        }
    }
    Ok(())
}

/// Severity bucket of a damage percentage
pub fn classify(damage_percent: f64) -> Severity {
    Severity::from_percent(damage_percent)
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (its calendar date is used)
pub fn parse_event_date(text: &str) -> DamageResult<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.date_naive())
        .map_err(|_| {
            DamageError::InvalidDate(format!("'{}' is not a YYYY-MM-DD date", text))
        })
}
