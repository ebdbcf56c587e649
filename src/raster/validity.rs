use serde::{Deserialize, Serialize};

/// Which raw values count as a real prediction for a data source.
///
/// Sources disagree on whether zero is data or a fill value, so the rule is configured
/// per source. Non-finite values and the declared no-data sentinel are always invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    /// Only the sentinel (and non-finite values) are invalid.
    SentinelOnly,
    /// Negative values are invalid as well.
    NonNegative,
    /// Zero and negative values are invalid as well.
    #[default]
    Positive,
}

impl Validity {
    pub fn accepts(self, value: f64, no_data: Option<f64>) -> bool {
        if !value.is_finite() || no_data == Some(value) { return false }
        match self {
            Self::SentinelOnly => true,
            Self::NonNegative => value >= 0.0,
            Self::Positive => value > 0.0,
        }
    }
}
