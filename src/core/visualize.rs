//! Colour rendering of index rasters and true-colour composites

use crate::types::{BandImage, DamageError, DamageResult, VisualizationParams};
use ndarray::{Array3, Zip};

/// True-colour preview (B4, B3, B2) for surface reflectance scaled by 10000
pub const RGB_VISUALIZATION: VisualizationParams = VisualizationParams {
    min: 0.0,
    max: 3000.0,
    palette: &[],
};

/// RGB value of a palette colour name
pub fn named_color(name: &str) -> Option<[u8; 3]> {
    let rgb = match name.trim().to_lowercase().as_str() {
        "black" => [0, 0, 0],
        "white" => [255, 255, 255],
        "red" => [255, 0, 0],
        "green" => [0, 128, 0],
        "blue" => [0, 0, 255],
        "yellow" => [255, 255, 0],
        "orange" => [255, 165, 0],
        "brown" => [165, 42, 42],
        _ => return None,
    };
    Some(rgb)
}

fn palette_colors(palette: &[&str]) -> DamageResult<Vec<[u8; 3]>> {
    if palette.is_empty() {
        return Err(DamageError::InvalidInput("Palette is empty".to_string()));
    }
    palette
        .iter()
        .map(|name| {
            named_color(name).ok_or_else(|| {
                DamageError::InvalidInput(format!("Unknown palette colour '{}'", name))
            })
        })
        .collect()
}

/// Linear stretch of `value` into [0, 1]; NaN stays unset
pub fn stretch(value: f32, min: f64, max: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let span = max - min;
    if span <= 0.0 {
        return Some(0.0);
    }
    Some(((value as f64 - min) / span).clamp(0.0, 1.0))
}

fn interpolate(colors: &[[u8; 3]], t: f64) -> [u8; 3] {
    if colors.len() == 1 {
        return colors[0];
    }
    let pos = t * (colors.len() - 1) as f64;
    let lower = (pos.floor() as usize).min(colors.len() - 2);
    let frac = pos - lower as f64;
    let (a, b) = (colors[lower], colors[lower + 1]);
    let mut out = [0u8; 3];
    for i in 0..3 {
        out[i] = (a[i] as f64 + (b[i] as f64 - a[i] as f64) * frac).round() as u8;
    }
    out
}

/// Map a single-band raster through a palette to RGBA (band-major, alpha 0 where unset)
pub fn colorize(band: &BandImage, params: &VisualizationParams) -> DamageResult<Array3<u8>> {
    let colors = palette_colors(params.palette)?;
    let (rows, cols) = band.dim();
    let mut rgba = Array3::<u8>::zeros((4, rows, cols));

    for ((row, col), &value) in band.indexed_iter() {
        if let Some(t) = stretch(value, params.min, params.max) {
            let [r, g, b] = interpolate(&colors, t);
            rgba[[0, row, col]] = r;
            rgba[[1, row, col]] = g;
            rgba[[2, row, col]] = b;
            rgba[[3, row, col]] = 255;
        }
    }
    Ok(rgba)
}

/// Stretch three bands into an RGBA composite; a pixel is opaque only when all three are set
pub fn compose_rgb(
    red: &BandImage,
    green: &BandImage,
    blue: &BandImage,
    params: &VisualizationParams,
) -> DamageResult<Array3<u8>> {
    if red.dim() != green.dim() || red.dim() != blue.dim() {
        return Err(DamageError::Processing(format!(
            "RGB bands differ in shape: {:?}, {:?}, {:?}",
            red.dim(),
            green.dim(),
            blue.dim()
        )));
    }
    let (rows, cols) = red.dim();
    let mut rgba = Array3::<u8>::zeros((4, rows, cols));

    let to_byte = |v: f32| stretch(v, params.min, params.max).map(|t| (t * 255.0).round() as u8);
    Zip::indexed(red).and(green).and(blue).for_each(|(row, col), &r, &g, &b| {
        if let (Some(r), Some(g), Some(b)) = (to_byte(r), to_byte(g), to_byte(b)) {
            rgba[[0, row, col]] = r;
            rgba[[1, row, col]] = g;
            rgba[[2, row, col]] = b;
            rgba[[3, row, col]] = 255;
        }
    });
    Ok(rgba)
}

/// One band renders through the palette, three bands as an RGB composite
pub fn render(bands: &[&BandImage], params: &VisualizationParams) -> DamageResult<Array3<u8>> {
    match bands {
        [single] => colorize(single, params),
        [r, g, b] => compose_rgb(r, g, b, params),
        _ => Err(DamageError::InvalidInput(format!(
            "Previews need 1 or 3 bands, got {}",
            bands.len()
        ))),
    }
}
