//! Descriptive statistics over historical numeric series.
//!
//! Used to pre-condition demand-forecast and growth-analysis prompts and to
//! build their local fallbacks. Nothing here is predictive.

use serde::Serialize;

/// Summary of a numeric series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// `std_dev / mean`, or 0 when the mean is not positive
    pub coefficient_of_variation: f64,
    pub peak: f64,
    pub first: f64,
    pub last: f64,
    /// Mean of the consecutive differences, `(last - first) / (count - 1)`
    pub mean_delta: f64,
}

impl SeriesSummary {
    /// Summarize a series. Non-finite values are skipped; returns `None`
    /// when nothing usable remains.
    pub fn from_series(values: &[f64]) -> Option<Self> {
        let usable: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if usable.len() < values.len() {
            tracing::warn!(
                skipped = values.len() - usable.len(),
                "Skipping non-finite values in history"
            );
        }

        let first = *usable.first()?;
        let last = *usable.last()?;
        let count = usable.len();
        let n = count as f64;

        let mean = usable.iter().sum::<f64>() / n;
        let variance = usable.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        let peak = usable.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let coefficient_of_variation = if mean > 0.0 { std_dev / mean } else { 0.0 };
        let mean_delta = if count > 1 {
            (last - first) / (n - 1.0)
        } else {
            0.0
        };

        Some(Self {
            count,
            mean,
            std_dev,
            coefficient_of_variation,
            peak,
            first,
            last,
            mean_delta,
        })
    }

    /// Percent change from the first to the last observation, if defined.
    pub fn growth_percent(&self) -> Option<f64> {
        if self.count < 2 || self.first == 0.0 {
            return None;
        }
        let pct = (self.last - self.first) / self.first.abs() * 100.0;
        pct.is_finite().then_some(pct)
    }

    /// One-line description embedded in prompts.
    pub fn describe(&self) -> String {
        format!(
            "observations: {}, mean: {:.2}, std dev: {:.2}, coefficient of variation: {:.2}, peak: {:.2}, mean change per period: {:.2}",
            self.count,
            self.mean,
            self.std_dev,
            self.coefficient_of_variation,
            self.peak,
            self.mean_delta
        )
    }
}
