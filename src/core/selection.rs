use crate::io::provider::ImageryProvider;
use crate::types::{
    AoiGrid, AreaOfInterest, ClippedImage, DamageError, DamageResult, ImageryPair, ImageryWindow,
    SceneMetadata,
};

/// Picks the before/after scenes closest to the event date
pub struct ImagerySelector<'a, P: ImageryProvider + ?Sized> {
    provider: &'a P,
    max_cloud_cover: f64,
}

impl<'a, P: ImageryProvider + ?Sized> ImagerySelector<'a, P> {
    pub fn new(provider: &'a P, max_cloud_cover: f64) -> Self {
        Self {
            provider,
            max_cloud_cover,
        }
    }

    /// Latest scene in the before window and earliest in the after window,
    /// both clipped to the AOI grid
    pub fn select(
        &self,
        aoi: &AreaOfInterest,
        window: &ImageryWindow,
        grid: &AoiGrid,
    ) -> DamageResult<ImageryPair> {
        let (before_scene, after_scene) = self.select_scenes(aoi, window)?;

        log::info!(
            "Selected before scene {} ({}) and after scene {} ({})",
            before_scene.id,
            before_scene.acquired,
            after_scene.id,
            after_scene.acquired
        );

        let clip = |scene: &SceneMetadata| -> DamageResult<ClippedImage> {
            self.provider.clip(scene, aoi, grid)
        };

        #[cfg(feature = "parallel")]
        let (before, after) = rayon::join(|| clip(&before_scene), || clip(&after_scene));
        #[cfg(not(feature = "parallel"))]
        let (before, after) = (clip(&before_scene), clip(&after_scene));

        Ok(ImageryPair {
            before: before?,
            after: after?,
        })
    }

    /// Scene selection without clipping
    pub fn select_scenes(
        &self,
        aoi: &AreaOfInterest,
        window: &ImageryWindow,
    ) -> DamageResult<(SceneMetadata, SceneMetadata)> {
        log::debug!(
            "Searching scenes below {}% cloud cover from {} to {}",
            self.max_cloud_cover,
            window.before_start,
            window.after_end
        );

        let collection = self.provider.query_collection(aoi, self.max_cloud_cover)?;

        let (before_start, before_end) = window.before_range()?;
        let (after_start, after_end) = window.after_range()?;
        let before = collection.filter_date(before_start, before_end);
        let after = collection.filter_date(after_start, after_end);

        log::debug!(
            "{} candidate scenes before and {} after the event",
            before.len(),
            after.len()
        );

        if before.is_empty() || after.is_empty() {
            return Err(DamageError::NoEligibleImagery {
                before: before.len(),
                after: after.len(),
            });
        }

        let before_scene = before.sort_by_time(true).first().cloned();
        let after_scene = after.sort_by_time(false).first().cloned();

        match (before_scene, after_scene) {
            (Some(b), Some(a)) => Ok((b, a)),
            _ => Err(DamageError::Processing(
                "Scene collection emptied during sorting".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::provider::SceneCollection;
    use crate::types::{BandImage, BoundingBox, GeoPoint, VisualizationParams};
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::HashMap;

    struct ListProvider {
        scenes: Vec<SceneMetadata>,
    }

    impl ImageryProvider for ListProvider {
        fn query_collection(
            &self,
            _aoi: &AreaOfInterest,
            max_cloud_cover: f64,
        ) -> DamageResult<SceneCollection> {
            Ok(self
                .scenes
                .iter()
                .filter(|s| s.cloud_cover < max_cloud_cover)
                .cloned()
                .collect())
        }

        fn clip(
            &self,
            scene: &SceneMetadata,
            _aoi: &AreaOfInterest,
            grid: &AoiGrid,
        ) -> DamageResult<ClippedImage> {
            Ok(ClippedImage {
                metadata: scene.clone(),
                grid: grid.clone(),
                bands: HashMap::new(),
            })
        }

        fn render_preview(
            &self,
            _bands: &[&BandImage],
            _aoi: &AreaOfInterest,
            _grid: &AoiGrid,
            _params: &VisualizationParams,
            label: &str,
        ) -> DamageResult<String> {
            Ok(label.to_string())
        }
    }

    fn scene(id: &str, y: i32, m: u32, d: u32, cloud_cover: f64) -> SceneMetadata {
        SceneMetadata {
            id: id.to_string(),
            acquired: Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap(),
            cloud_cover,
            footprint: BoundingBox {
                min_lon: -180.0,
                max_lon: 180.0,
                min_lat: -90.0,
                max_lat: 90.0,
            },
        }
    }

    fn setup() -> (AreaOfInterest, ImageryWindow) {
        let aoi = AreaOfInterest::new(GeoPoint::new(34.0, -118.0).unwrap(), 1000.0).unwrap();
        let event = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        let window = ImageryWindow::around(event, 3).unwrap();
        (aoi, window)
    }

    #[test]
    fn test_picks_closest_scenes_to_event() {
        let provider = ListProvider {
            scenes: vec![
                scene("too-early", 2023, 4, 20, 1.0),
                scene("before-old", 2023, 5, 10, 1.0),
                scene("before-recent", 2023, 7, 25, 2.0),
                scene("before-cloudy", 2023, 7, 30, 60.0),
                scene("after-early", 2023, 8, 5, 5.0),
                scene("after-late", 2023, 10, 1, 0.0),
                scene("too-late", 2023, 11, 2, 0.0),
            ],
        };
        let (aoi, window) = setup();
        let selector = ImagerySelector::new(&provider, 15.0);

        let (before, after) = selector.select_scenes(&aoi, &window).unwrap();
        assert_eq!(before.id, "before-recent");
        assert_eq!(after.id, "after-early");
        assert!(before.acquired < after.acquired);
    }

    #[test]
    fn test_scene_on_event_day_belongs_to_after_window() {
        let provider = ListProvider {
            scenes: vec![scene("before", 2023, 7, 1, 1.0), scene("event-day", 2023, 8, 1, 1.0)],
        };
        let (aoi, window) = setup();
        let (_, after) = ImagerySelector::new(&provider, 15.0)
            .select_scenes(&aoi, &window)
            .unwrap();
        assert_eq!(after.id, "event-day");
    }

    #[test]
    fn test_empty_window_is_an_error() {
        let provider = ListProvider {
            scenes: vec![
                scene("before", 2023, 7, 1, 1.0),
                scene("after-cloudy", 2023, 8, 10, 20.0),
            ],
        };
        let (aoi, window) = setup();
        let grid = AoiGrid::for_aoi(&aoi, 10.0).unwrap();

        let err = ImagerySelector::new(&provider, 15.0)
            .select(&aoi, &window, &grid)
            .unwrap_err();
        assert!(matches!(err, DamageError::NoEligibleImagery { before: 1, after: 0 }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_select_clips_both_scenes() {
        let provider = ListProvider {
            scenes: vec![scene("before", 2023, 7, 1, 1.0), scene("after", 2023, 8, 10, 1.0)],
        };
        let (aoi, window) = setup();
        let grid = AoiGrid::for_aoi(&aoi, 10.0).unwrap();

        let pair = ImagerySelector::new(&provider, 15.0)
            .select(&aoi, &window, &grid)
            .unwrap();
        assert_eq!(pair.before.metadata.id, "before");
        assert_eq!(pair.after.metadata.id, "after");
        assert_eq!(pair.after.grid, grid);
    }
}
