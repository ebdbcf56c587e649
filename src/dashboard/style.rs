use std::sync::Arc;

use crate::{
    common::{ColorScale, Rgb},
    raster::Validity,
};

/// Value-to-color mapping for one data source.
#[derive(Clone)]
pub(crate) struct Palette {
    scale: Arc<dyn ColorScale>,
    max: f64,
    validity: Validity,
    no_data: Option<f64>,
}

impl Palette {
    /// `max` must be positive; anything else falls back to 1.
    pub(crate) fn new(scale: Arc<dyn ColorScale>, max: f64, validity: Validity) -> Self {
        let max = if max.is_finite() && max > 0.0 { max } else { 1.0 };
        Self { scale, max, validity, no_data: None }
    }

    pub(crate) fn with_no_data(mut self, no_data: Option<f64>) -> Self {
        self.no_data = no_data;
        self
    }

    #[inline]
    pub(crate) fn accepts(&self, value: f64) -> bool { self.validity.accepts(value, self.no_data) }

    /// `min(value, max) / max`, clamped to [0, 1].
    pub(crate) fn scaled(&self, value: f64) -> f64 { (value.min(self.max) / self.max).clamp(0.0, 1.0) }

    /// Color for `value`; `None` (transparent) when the value is not a valid prediction.
    pub(crate) fn color(&self, value: f64) -> Option<Rgb> {
        self.accepts(value).then(|| self.scale.color(self.scaled(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Spectral;

    fn palette(validity: Validity) -> Palette { Palette::new(Arc::new(Spectral::default()), 0.5, validity) }

    #[test]
    fn values_are_capped_at_max() {
        let p = palette(Validity::Positive);
        assert_eq!(p.scaled(0.25), 0.5);
        assert_eq!(p.scaled(2.0), 1.0);
        assert_eq!(p.color(0.9), p.color(0.5));
    }

    #[test]
    fn invalid_values_are_transparent() {
        let p = palette(Validity::Positive).with_no_data(Some(-9999.0));
        assert_eq!(p.color(0.0), None);
        assert_eq!(p.color(f64::NAN), None);
        assert_eq!(p.color(-9999.0), None);
        assert!(palette(Validity::NonNegative).color(0.0).is_some());
    }

    #[test]
    fn degenerate_max_defaults_to_one() {
        let p = Palette::new(Arc::new(Spectral::default()), 0.0, Validity::SentinelOnly);
        assert_eq!(p.scaled(0.4), 0.4);
    }
}
