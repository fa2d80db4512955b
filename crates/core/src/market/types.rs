use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::forecast::Target;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl HistoricalBar {
    pub fn value(&self, target: Target) -> Option<f64> {
        match target {
            Target::Open => self.open,
            Target::Close => self.close,
            Target::Volume => self.volume,
        }
    }
}

/// Bars with `start <= date <= end`, in their existing order.
pub fn within_range(
    bars: &[HistoricalBar],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<HistoricalBar> {
    bars.iter()
        .filter(|b| b.date >= start && b.date <= end)
        .cloned()
        .collect()
}

/// `(date, value)` pairs for one target, skipping missing and non-finite values.
pub fn target_series(bars: &[HistoricalBar], target: Target) -> Vec<(NaiveDate, f64)> {
    bars.iter()
        .filter_map(|b| b.value(target).filter(|v| v.is_finite()).map(|v| (b.date, v)))
        .collect()
}
