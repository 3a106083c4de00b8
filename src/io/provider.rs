use crate::types::{
    AoiGrid, AreaOfInterest, BandImage, ClippedImage, DamageResult, SceneMetadata,
    VisualizationParams,
};
use chrono::{DateTime, Utc};

/// Source of geo-registered multispectral scenes
///
/// Implementations do the I/O: catalog search, resampling a scene onto the
/// AOI grid and writing previews. Everything else in the pipeline is pure.
pub trait ImageryProvider: Send + Sync {
    /// Scenes whose footprint intersects the AOI with cloud cover strictly
    /// below `max_cloud_cover` percent
    fn query_collection(
        &self,
        aoi: &AreaOfInterest,
        max_cloud_cover: f64,
    ) -> DamageResult<SceneCollection>;

    /// Resample a scene onto `grid`; pixels outside the AOI disc are NaN
    fn clip(
        &self,
        scene: &SceneMetadata,
        aoi: &AreaOfInterest,
        grid: &AoiGrid,
    ) -> DamageResult<ClippedImage>;

    /// Render one band (palette) or three bands (RGB) laid out on `grid`
    /// around `aoi`, and return a reference
    fn render_preview(
        &self,
        bands: &[&BandImage],
        aoi: &AreaOfInterest,
        grid: &AoiGrid,
        params: &VisualizationParams,
        label: &str,
    ) -> DamageResult<String>;
}

/// Ordered set of scene metadata returned by a provider query
#[derive(Debug, Clone, Default)]
pub struct SceneCollection {
    scenes: Vec<SceneMetadata>,
}

impl SceneCollection {
    pub fn new(scenes: Vec<SceneMetadata>) -> Self {
        Self { scenes }
    }

    /// Scenes acquired in `[start, end)`
    pub fn filter_date(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let scenes = self
            .scenes
            .iter()
            .filter(|s| s.acquired >= start && s.acquired < end)
            .cloned()
            .collect();
        Self { scenes }
    }

    /// Stable sort by acquisition time
    pub fn sort_by_time(mut self, descending: bool) -> Self {
        if descending {
            self.scenes.sort_by(|a, b| b.acquired.cmp(&a.acquired));
        } else {
            self.scenes.sort_by(|a, b| a.acquired.cmp(&b.acquired));
        }
        self
    }

    pub fn first(&self) -> Option<&SceneMetadata> {
        self.scenes.first()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneMetadata> {
        self.scenes.iter()
    }
}

impl FromIterator<SceneMetadata> for SceneCollection {
    fn from_iter<I: IntoIterator<Item = SceneMetadata>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use chrono::TimeZone;

    fn scene(id: &str, day: u32) -> SceneMetadata {
        SceneMetadata {
            id: id.to_string(),
            acquired: Utc.with_ymd_and_hms(2023, 6, day, 10, 30, 0).unwrap(),
            cloud_cover: 1.0,
            footprint: BoundingBox {
                min_lon: 0.0,
                max_lon: 1.0,
                min_lat: 0.0,
                max_lat: 1.0,
            },
        }
    }

    #[test]
    fn test_filter_date_is_half_open() {
        let collection: SceneCollection =
            vec![scene("a", 1), scene("b", 10), scene("c", 20)].into_iter().collect();

        let start = Utc.with_ymd_and_hms(2023, 6, 1, 10, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2023, 6, 20, 10, 30, 0).unwrap();
        let filtered = collection.filter_date(start, end);

        let ids: Vec<_> = filtered.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_sort_and_first() {
        let collection = SceneCollection::new(vec![scene("b", 10), scene("a", 1), scene("c", 20)]);

        let latest = collection.clone().sort_by_time(true);
        assert_eq!(latest.first().map(|s| s.id.as_str()), Some("c"));

        let earliest = collection.sort_by_time(false);
        assert_eq!(earliest.first().map(|s| s.id.as_str()), Some("a"));

        assert!(SceneCollection::default().first().is_none());
    }
}
