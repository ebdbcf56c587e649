use ndarray::{Array3, Zip};
use tracing::warn;

use super::{RasterGrid, Validity};

/// Per-pixel arithmetic mean of `grids`.
///
/// The first grid is the reference: grids with a different shape are skipped whole.
/// At each pixel only values `rule` accepts against that grid's sentinel contribute. A pixel
/// with no contributor gets the reference sentinel, or NaN when none is declared.
/// Returns `None` for empty input or an empty reference grid.
pub fn average(grids: &[RasterGrid], rule: Validity) -> Option<RasterGrid> {
    let reference = grids.first()?;
    if reference.is_empty() {
        warn!("Reference raster has no pixels; nothing to aggregate");
        return None;
    }

    let dim = reference.data.dim();
    let mut sums = Array3::<f64>::zeros(dim);
    let mut counts = Array3::<u32>::zeros(dim);

    for (i, grid) in grids.iter().enumerate() {
        if !reference.same_shape(grid) {
            warn!(
                "Skipping raster {i}: shape {:?} does not match reference {:?}",
                grid.data.dim(), dim
            );
            continue;
        }
        Zip::from(&mut sums)
            .and(&mut counts)
            .and(&grid.data)
            .for_each(|sum, count, &value| {
                if rule.accepts(value, grid.no_data()) {
                    *sum += value;
                    *count += 1;
                }
            });
    }

    let fill = reference.no_data().unwrap_or(f64::NAN);
    let mean = Zip::from(&sums)
        .and(&counts)
        .map_collect(|&sum, &count| if count == 0 { fill } else { sum / count as f64 });

    Some(RasterGrid::new(mean, reference.no_data()))
}
