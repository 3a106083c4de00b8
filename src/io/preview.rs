use crate::types::{DamageResult, GeoTransform};
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use ndarray::{Array3, Axis};
use std::path::{Path, PathBuf};

/// Writes RGBA previews as byte GeoTIFFs and hands back `file://` references
pub struct PreviewWriter {
    output_dir: PathBuf,
}

impl PreviewWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_path(&self, label: &str) -> PathBuf {
        let name: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.output_dir.join(format!("{}.tif", name))
    }

    /// Write a band-major RGBA array (4 x rows x cols) georeferenced in EPSG:4326
    pub fn write(
        &self,
        rgba: &Array3<u8>,
        transform: &GeoTransform,
        label: &str,
    ) -> DamageResult<String> {
        std::fs::create_dir_all(&self.output_dir)?;
        let output_path = self.output_path(label);
        log::debug!("Writing preview: {}", output_path.display());

        let (bands, height, width) = rgba.dim();
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<u8, _>(
            &output_path,
            width as isize,
            height as isize,
            bands as isize,
        )?;
        dataset.set_geo_transform(&transform.to_gdal())?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(4326)?)?;

        for (index, plane) in rgba.axis_iter(Axis(0)).enumerate() {
            let mut rasterband = dataset.rasterband((index + 1) as _)?;
            let flat_data: Vec<u8> = plane.iter().cloned().collect();
            let buffer = gdal::raster::Buffer::new((width, height), flat_data);
            rasterband.write((0, 0), (width, height), &buffer)?;
        }

        Ok(format!("file://{}", output_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_is_sanitized() {
        let writer = PreviewWriter::new("/tmp/previews");
        let path = writer.output_path("fire 34.1/-118.2 change");
        assert_eq!(path, PathBuf::from("/tmp/previews/fire_34.1_-118.2_change.tif"));
    }
}
