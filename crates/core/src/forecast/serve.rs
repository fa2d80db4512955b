use crate::forecast::artifact::ModelStore;
use crate::forecast::model::AdditiveModel;
use crate::forecast::{ForecastRow, Target};
use anyhow::Result;
use chrono::NaiveDate;

/// Point forecast for one `YYYY-MM-DD` date, or `None` when the string does not parse or the
/// date is not part of the frame the model produces (e.g. before its history starts).
pub fn forecast_for_date(model: &AdditiveModel, date_str: &str) -> Option<f64> {
    let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").ok()?;
    if !model.in_frame(date) {
        return None;
    }
    model.predict(&[date]).first().map(|row| row.yhat)
}

/// Forecast rows with `start <= ds <= end`, extending the frame as far as `end`.
pub fn forecast_range(model: &AdditiveModel, start: NaiveDate, end: NaiveDate) -> Vec<ForecastRow> {
    if start > end {
        return Vec::new();
    }
    let frame: Vec<NaiveDate> = model.frame_between(start, end).collect();
    model.predict(&frame)
}

/// Loads the artifact for `ticker`/`target` and forecasts one date.
pub fn predict_stored(
    store: &ModelStore,
    ticker: &str,
    target: Target,
    date_str: &str,
) -> Result<Option<f64>> {
    let artifact = store.load(ticker, target)?;
    Ok(forecast_for_date(&artifact.model, date_str))
}

/// Loads the artifact for `ticker`/`target` and forecasts a window.
pub fn forecast_stored(
    store: &ModelStore,
    ticker: &str,
    target: Target,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<ForecastRow>> {
    let artifact = store.load(ticker, target)?;
    Ok(forecast_range(&artifact.model, start, end))
}
