use serde::Serialize;

use super::TimeSeriesPoint;

/// Which y-axis a dataset is plotted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub axis: Axis,
    /// One entry per chart label; `None` is a gap.
    pub values: Vec<Option<f64>>,
}

/// Chart-ready series: shared labels plus datasets aligned to them.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl ChartData {
    pub const PRIMARY_LABEL: &'static str = "VRI";

    /// The risk value on the left axis, plus each `secondary` field on the right axis.
    /// Secondary fields absent from every point are left out.
    pub fn from_series(points: &[TimeSeriesPoint], secondary: &[&str]) -> Self {
        let labels = points.iter().map(|p| p.label.clone()).collect();

        let mut datasets = vec![Dataset {
            label: Self::PRIMARY_LABEL.to_string(),
            axis: Axis::Left,
            values: points.iter().map(|p| p.value).collect(),
        }];

        for &name in secondary {
            let values: Vec<Option<f64>> = points.iter().map(|p| p.field(name)).collect();
            if values.iter().all(Option::is_none) { continue }
            datasets.push(Dataset { label: name.to_string(), axis: Axis::Right, values });
        }

        Self { labels, datasets }
    }

    #[inline] pub fn is_empty(&self) -> bool { self.labels.is_empty() }

    pub fn dataset(&self, label: &str) -> Option<&Dataset> { self.datasets.iter().find(|d| d.label == label) }
}
