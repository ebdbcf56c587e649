use anyhow::{Result, ensure};
use ndarray::{Array3, ArrayView2, Axis};

use super::Validity;

/// A decoded raster, indexed `[band][row][col]`.
///
/// Missing values with no declared sentinel are stored as NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    pub(super) data: Array3<f64>,
    no_data: Option<f64>,
}

impl RasterGrid {
    /// Wrap a `(bands, height, width)` array.
    pub fn new(data: Array3<f64>, no_data: Option<f64>) -> Self { Self { data, no_data } }

    /// Build from band-interleaved-by-band samples: `values.len() == bands * height * width`.
    pub fn from_samples(width: usize, height: usize, bands: usize, values: Vec<f64>, no_data: Option<f64>) -> Result<Self> {
        ensure!(
            values.len() == width * height * bands,
            "[RasterGrid.from_samples] expected {} samples for {width}x{height}x{bands}, got {}",
            width * height * bands, values.len()
        );
        Ok(Self::new(Array3::from_shape_vec((bands, height, width), values)?, no_data))
    }

    /// Build from nested `[band][row][col]` vectors. Ragged input is rejected.
    pub fn from_nested(bands: Vec<Vec<Vec<f64>>>, no_data: Option<f64>) -> Result<Self> {
        let height = bands.first().map_or(0, Vec::len);
        let width = bands.first().and_then(|b| b.first()).map_or(0, Vec::len);
        let num_bands = bands.len();

        let mut values = Vec::with_capacity(num_bands * height * width);
        for band in bands {
            ensure!(band.len() == height, "[RasterGrid.from_nested] ragged band: {} rows, expected {height}", band.len());
            for row in band {
                ensure!(row.len() == width, "[RasterGrid.from_nested] ragged row: {} cols, expected {width}", row.len());
                values.extend(row);
            }
        }
        Self::from_samples(width, height, num_bands, values, no_data)
    }

    #[inline] pub fn width(&self) -> usize { self.data.dim().2 }

    #[inline] pub fn height(&self) -> usize { self.data.dim().1 }

    #[inline] pub fn bands(&self) -> usize { self.data.dim().0 }

    #[inline] pub fn no_data(&self) -> Option<f64> { self.no_data }

    /// A grid with no pixels or no bands cannot be rendered or aggregated.
    #[inline]
    pub fn is_empty(&self) -> bool { self.width() == 0 || self.height() == 0 || self.bands() == 0 }

    /// True if both grids cover the same pixel lattice and band count.
    #[inline]
    pub fn same_shape(&self, other: &RasterGrid) -> bool { self.data.dim() == other.data.dim() }

    #[inline]
    pub fn get(&self, band: usize, row: usize, col: usize) -> Option<f64> {
        self.data.get((band, row, col)).copied()
    }

    /// One band as a `[row][col]` view.
    pub fn band(&self, band: usize) -> Option<ArrayView2<'_, f64>> {
        (band < self.bands()).then(|| self.data.index_axis(Axis(0), band))
    }

    /// Values of every band at one pixel.
    pub fn pixel(&self, row: usize, col: usize) -> Vec<f64> {
        (0..self.bands()).filter_map(|b| self.get(b, row, col)).collect()
    }

    /// Valid values of the first band under `rule`.
    pub fn valid_values(&self, rule: Validity) -> Vec<f64> {
        self.band(0)
            .map(|band| band.iter().copied().filter(|v| rule.accepts(*v, self.no_data)).collect())
            .unwrap_or_default()
    }

    /// Nested `[band][row][col]` copy of the data.
    pub fn to_nested(&self) -> Vec<Vec<Vec<f64>>> {
        self.data.outer_iter()
            .map(|band| band.outer_iter().map(|row| row.to_vec()).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_round_trip_and_dimensions() {
        let grid = RasterGrid::from_nested(vec![vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]], Some(-1.0)).unwrap();
        assert_eq!((grid.width(), grid.height(), grid.bands()), (3, 2, 1));
        assert_eq!(grid.get(0, 1, 2), Some(6.0));
        assert_eq!(grid.get(0, 2, 0), None);
        assert_eq!(grid.to_nested(), vec![vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(RasterGrid::from_nested(vec![vec![vec![1.0, 2.0], vec![3.0]]], None).is_err());
    }

    #[test]
    fn empty_grid_is_flagged() {
        let grid = RasterGrid::from_nested(vec![], None).unwrap();
        assert!(grid.is_empty());
    }

    #[test]
    fn valid_values_respect_rule_and_sentinel() {
        let grid = RasterGrid::from_nested(vec![vec![vec![0.0, 0.5], vec![-9999.0, f64::NAN]]], Some(-9999.0)).unwrap();
        assert_eq!(grid.valid_values(Validity::Positive), vec![0.5]);
        assert_eq!(grid.valid_values(Validity::SentinelOnly), vec![0.0, 0.5]);
    }
}
