mod alias;
mod color;
mod dates;
mod sync;

pub(crate) use alias::*;
pub use color::{ColorScale, Rgb, Spectral};
pub use dates::{DateRange, DateSelector, parse_date, parse_loose_date};
pub(crate) use dates::compact_date;
pub(crate) use sync::lock;
