mod aggregate;
mod decode;
mod grid;
mod validity;

pub use aggregate::average;
pub use decode::{RasterDecoder, TiffDecoder};
pub use grid::RasterGrid;
pub use validity::Validity;
