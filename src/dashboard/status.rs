use std::fmt;

use serde::Serialize;

/// Summary of what is on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    /// Rendered units or valid pixels.
    pub count: usize,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub days_loaded: usize,
    pub days_requested: usize,
    /// Observation points drawn, when observations were requested.
    pub observations: Option<usize>,
}

impl Stats {
    /// Min, mean and max of `values`. `None` when there are none.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let (mut count, mut sum, mut min, mut max) = (0usize, 0.0, f64::INFINITY, f64::NEG_INFINITY);
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| Self {
            count,
            min,
            mean: sum / count as f64,
            max,
            days_loaded: 0,
            days_requested: 0,
            observations: None,
        })
    }

    pub fn with_days(mut self, loaded: usize, requested: usize) -> Self {
        self.days_loaded = loaded;
        self.days_requested = requested;
        self
    }

    pub fn with_observations(mut self, shown: Option<usize>) -> Self {
        self.observations = shown;
        self
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} values, min {:.3}, mean {:.3}, max {:.3}", self.count, self.min, self.mean, self.max)?;
        if self.days_requested > 0 {
            write!(f, " ({}/{} days loaded)", self.days_loaded, self.days_requested)?;
        }
        if let Some(n) = self.observations {
            write!(f, ", {n} observations")?;
        }
        Ok(())
    }
}

/// What the stats panel shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Status {
    #[default]
    Idle,
    Loading(String),
    Ready(Stats),
    Info(String),
    Error(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Idle => f.write_str("Select a region"),
            Status::Loading(msg) => write!(f, "Loading {msg}..."),
            Status::Ready(stats) => write!(f, "{stats}"),
            Status::Info(msg) => f.write_str(msg),
            Status::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusPanel {
    status: Status,
}

impl StatusPanel {
    #[inline] pub fn status(&self) -> &Status { &self.status }

    pub fn set(&mut self, status: Status) { self.status = status }

    #[inline] pub fn is_loading(&self) -> bool { matches!(self.status, Status::Loading(_)) }

    #[inline] pub fn is_error(&self) -> bool { matches!(self.status, Status::Error(_)) }
}

/// Result of applying a selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Layers are on the map.
    Rendered(Stats),
    /// Nothing could be loaded for the selection; carries the user-facing message.
    NoData(String),
    /// Something informational, e.g. zero matching observations.
    Info(String),
    /// A newer selection started before this one finished; nothing was changed.
    Superseded,
}

impl Outcome {
    /// Panel status for this outcome, if it changes the panel.
    pub(crate) fn status(&self) -> Option<Status> {
        match self {
            Outcome::Rendered(stats) => Some(Status::Ready(stats.clone())),
            Outcome::NoData(msg) => Some(Status::Error(msg.clone())),
            Outcome::Info(msg) => Some(Status::Info(msg.clone())),
            Outcome::Superseded => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_values() {
        let stats = Stats::from_values([0.1, 0.2, 0.6]).unwrap().with_days(2, 3);
        assert_eq!((stats.count, stats.min, stats.max), (3, 0.1, 0.6));
        assert!((stats.mean - 0.3).abs() < 1e-12);
        assert_eq!(stats.to_string(), "3 values, min 0.100, mean 0.300, max 0.600 (2/3 days loaded)");
        assert!(Stats::from_values([]).is_none());
    }

    #[test]
    fn outcomes_map_to_panel_states() {
        assert_eq!(Outcome::NoData("none".into()).status(), Some(Status::Error("none".into())));
        assert_eq!(Outcome::Superseded.status(), None);
        assert_eq!(Status::Error("x".into()).to_string(), "Error: x");
    }
}
