use std::io::Cursor;

use anyhow::{Context, Result, anyhow, ensure};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use super::RasterGrid;

/// GDAL stores the no-data value as an ASCII tag.
const GDAL_NODATA: u16 = 42113;

/// Turns raw raster bytes into a grid.
pub trait RasterDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<RasterGrid>;
}

/// GeoTIFF decoder on the `tiff` crate.
///
/// Each image directory becomes one band; chunky multi-sample images are split into one band
/// per sample. Every sample type is widened to `f64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffDecoder;

impl RasterDecoder for TiffDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RasterGrid> {
        let mut decoder = Decoder::new(Cursor::new(bytes))
            .context("Failed to create TIFF decoder")?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions().context("Failed to read TIFF dimensions")?;
        let (width, height) = (width as usize, height as usize);
        ensure!(width > 0 && height > 0, "[TiffDecoder.decode] raster has no pixels");

        let no_data = decoder.get_tag_ascii_string(Tag::Unknown(GDAL_NODATA)).ok()
            .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse::<f64>().ok());

        let mut bands: Vec<f64> = Vec::new();
        let mut num_bands = 0;
        loop {
            let (w, h) = decoder.dimensions()?;
            if (w as usize, h as usize) == (width, height) {
                let samples = widen(decoder.read_image().context("Failed to read TIFF image data")?);
                let per_pixel = samples.len() / (width * height);
                ensure!(
                    per_pixel > 0 && samples.len() == per_pixel * width * height,
                    "[TiffDecoder.decode] {} samples do not fill a {width}x{height} image", samples.len()
                );
                for s in 0..per_pixel {
                    bands.extend(samples.iter().skip(s).step_by(per_pixel));
                }
                num_bands += per_pixel;
            }
            // Overviews and masks with other sizes are ignored.
            if !decoder.more_images() { break }
            decoder.next_image().map_err(|e| anyhow!("Failed to advance TIFF directory: {e}"))?;
        }

        RasterGrid::from_samples(width, height, num_bands, bands, no_data)
    }
}

fn widen(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => Vec::new(),
    }
}
