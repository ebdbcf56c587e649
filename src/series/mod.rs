mod chart;
mod series;

pub use chart::{Axis, ChartData, Dataset};
pub use series::{TimeSeries, TimeSeriesPoint};
