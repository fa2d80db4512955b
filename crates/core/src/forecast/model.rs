//! Additive time-series model: piecewise-linear trend plus Fourier seasonality, fit by penalized
//! least squares.
//!
//! `y(t) = k + m * t + sum_j delta_j * max(0, t - c_j) + sum_s fourier_s(t)`
//!
//! Time is scaled to `[0, 1]` over the training span and values are scaled by `max |y|`, so the
//! prior scales mean the same thing for prices and volumes.

use crate::forecast::linalg;
use crate::forecast::ForecastRow;
use anyhow::{Context, Result};
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

const YEARLY_PERIOD_DAYS: f64 = 365.25;
const WEEKLY_PERIOD_DAYS: f64 = 7.0;
const MIN_YEARLY_SPAN_DAYS: f64 = 730.0;
const MIN_WEEKLY_SPAN_DAYS: f64 = 14.0;
// Keeps the normal equations well conditioned when columns are nearly collinear (weekly terms
// on weekday-only data).
const RIDGE_FLOOR_PER_ROW: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub n_changepoints: usize,
    /// Fraction of the history, from the start, in which changepoints are placed.
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    /// Fourier order of the yearly term; 0 disables it.
    pub yearly_order: usize,
    /// Fourier order of the weekly term; 0 disables it.
    pub weekly_order: usize,
    pub interval_width: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            yearly_order: 10,
            weekly_order: 3,
            interval_width: 0.8,
        }
    }
}

impl ModelConfig {
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.changepoint_range > 0.0 && self.changepoint_range <= 1.0,
            "changepoint_range must be in (0, 1] (got {})",
            self.changepoint_range
        );
        anyhow::ensure!(
            self.changepoint_prior_scale > 0.0 && self.seasonality_prior_scale > 0.0,
            "prior scales must be positive"
        );
        anyhow::ensure!(
            self.interval_width > 0.0 && self.interval_width < 1.0,
            "interval_width must be in (0, 1) (got {})",
            self.interval_width
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub name: String,
    pub period_days: f64,
    pub order: usize,
}

/// Column layout shared by fitting and prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Basis {
    start: NaiveDate,
    span_days: f64,
    changepoints: Vec<f64>,
    seasonalities: Vec<Seasonality>,
}

impl Basis {
    fn width(&self) -> usize {
        2 + self.changepoints.len()
            + self
                .seasonalities
                .iter()
                .map(|s| 2 * s.order)
                .sum::<usize>()
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64 / self.span_days
    }

    fn row(&self, date: NaiveDate) -> Vec<f64> {
        let t = self.scaled_time(date);
        let mut row = Vec::with_capacity(self.width());
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|c| (t - c).max(0.0)));

        // Seasonal phase is anchored to the calendar, not to the training start.
        let days = date.num_days_from_ce() as f64;
        for s in &self.seasonalities {
            for k in 1..=s.order {
                let x = 2.0 * PI * (k as f64) * days / s.period_days;
                row.push(x.sin());
                row.push(x.cos());
            }
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveModel {
    config: ModelConfig,
    basis: Basis,
    y_scale: f64,
    params: Vec<f64>,
    /// Residual standard deviation in scaled units.
    sigma: f64,
    history: Vec<NaiveDate>,
}

impl AdditiveModel {
    /// Fits on `(date, value)` observations. Input order does not matter.
    pub fn fit(series: &[(NaiveDate, f64)], config: ModelConfig) -> Result<Self> {
        config.validate()?;
        anyhow::ensure!(series.len() >= 2, "need at least 2 observations (got {})", series.len());
        anyhow::ensure!(
            series.iter().all(|(_, y)| y.is_finite()),
            "observations must be finite"
        );

        let mut series = series.to_vec();
        series.sort_by_key(|(d, _)| *d);

        let start = series[0].0;
        let end = series[series.len() - 1].0;
        let span_days = (end - start).num_days() as f64;
        anyhow::ensure!(span_days > 0.0, "observations must span more than one date");

        let y_max = series.iter().map(|(_, y)| y.abs()).fold(0.0_f64, f64::max);
        let y_scale = if y_max > 0.0 { y_max } else { 1.0 };

        let mut basis = Basis {
            start,
            span_days,
            changepoints: Vec::new(),
            seasonalities: Vec::new(),
        };
        basis.changepoints = place_changepoints(&series, &basis, &config);
        if config.yearly_order > 0 && span_days >= MIN_YEARLY_SPAN_DAYS {
            basis.seasonalities.push(Seasonality {
                name: "yearly".to_string(),
                period_days: YEARLY_PERIOD_DAYS,
                order: config.yearly_order,
            });
        }
        if config.weekly_order > 0 && span_days >= MIN_WEEKLY_SPAN_DAYS {
            basis.seasonalities.push(Seasonality {
                name: "weekly".to_string(),
                period_days: WEEKLY_PERIOD_DAYS,
                order: config.weekly_order,
            });
        }

        let rows: Vec<Vec<f64>> = series.iter().map(|(d, _)| basis.row(*d)).collect();
        let ys: Vec<f64> = series.iter().map(|(_, y)| y / y_scale).collect();
        let n = ys.len() as f64;
        let floor = RIDGE_FLOOR_PER_ROW * n;
        let n_cp = basis.changepoints.len();

        // First pass estimates the noise level; the second weighs the priors against it.
        let penalty = penalties(basis.width(), n_cp, floor, floor);
        let first = penalized_least_squares(&rows, &ys, &penalty).context("initial fit failed")?;
        let noise_var = residual_sum_of_squares(&rows, &ys, &first) / n;

        let cp_penalty = (noise_var / config.changepoint_prior_scale.powi(2)).max(floor);
        let seasonal_penalty = (noise_var / config.seasonality_prior_scale.powi(2)).max(floor);
        let penalty = penalties(basis.width(), n_cp, cp_penalty, seasonal_penalty);
        let params = penalized_least_squares(&rows, &ys, &penalty).context("final fit failed")?;
        anyhow::ensure!(
            params.iter().all(|b| b.is_finite()),
            "fit produced non-finite coefficients"
        );
        let sigma = (residual_sum_of_squares(&rows, &ys, &params) / n).sqrt();

        Ok(Self {
            config,
            basis,
            y_scale,
            params,
            sigma,
            history: series.into_iter().map(|(d, _)| d).collect(),
        })
    }

    pub fn seasonalities(&self) -> &[Seasonality] {
        &self.basis.seasonalities
    }

    pub fn changepoint_count(&self) -> usize {
        self.basis.changepoints.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn last_date(&self) -> NaiveDate {
        self.history.last().copied().unwrap_or(self.basis.start)
    }

    /// Whether a future frame long enough to reach `date` contains it.
    pub fn in_frame(&self, date: NaiveDate) -> bool {
        date > self.last_date() || self.history.binary_search(&date).is_ok()
    }

    /// Daily dates after the last training date.
    pub fn future_dates(&self, periods: usize) -> impl Iterator<Item = NaiveDate> + '_ {
        let last = self.last_date();
        (1..=periods as u64).map_while(move |i| last.checked_add_days(Days::new(i)))
    }

    /// Training dates followed by `periods` daily dates past the end of history.
    pub fn make_future_frame(&self, periods: usize) -> Vec<NaiveDate> {
        let mut frame = Vec::with_capacity(self.history.len() + periods);
        frame.extend_from_slice(&self.history);
        frame.extend(self.future_dates(periods));
        frame
    }

    /// Dates of a frame reaching `end` that fall inside `[start, end]`.
    pub fn frame_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Iterator<Item = NaiveDate> + '_ {
        let last = self.last_date();
        let from = self.history.partition_point(|d| *d < start);
        let past = self.history[from..]
            .iter()
            .copied()
            .take_while(move |d| *d <= end);
        let first = (start - last).num_days().max(1);
        let upto = (end - last).num_days();
        let future = (first..=upto).map_while(move |i| last.checked_add_days(Days::new(i as u64)));
        past.chain(future)
    }

    pub fn predict(&self, frame: &[NaiveDate]) -> Vec<ForecastRow> {
        let half_width = self.interval_z() * self.sigma * self.y_scale;
        frame
            .iter()
            .map(|&ds| {
                let yhat = self.predict_scaled(ds) * self.y_scale;
                ForecastRow {
                    ds,
                    yhat,
                    yhat_lower: yhat - half_width,
                    yhat_upper: yhat + half_width,
                }
            })
            .collect()
    }

    fn predict_scaled(&self, ds: NaiveDate) -> f64 {
        self.basis
            .row(ds)
            .iter()
            .zip(&self.params)
            .map(|(x, b)| x * b)
            .sum()
    }

    fn interval_z(&self) -> f64 {
        let p = 0.5 + self.config.interval_width / 2.0;
        Normal::new(0.0, 1.0)
            .map(|n| n.inverse_cdf(p))
            .unwrap_or(0.0)
    }
}

fn place_changepoints(
    series: &[(NaiveDate, f64)],
    basis: &Basis,
    config: &ModelConfig,
) -> Vec<f64> {
    let hist_size = ((series.len() as f64) * config.changepoint_range).floor() as usize;
    let n_cp = config.n_changepoints.min(hist_size.saturating_sub(1));
    let mut out: Vec<f64> = Vec::with_capacity(n_cp);
    if n_cp == 0 {
        return out;
    }

    let last_idx = (hist_size - 1) as f64;
    for i in 1..=n_cp {
        let idx = ((i as f64) * last_idx / (n_cp as f64)).round() as usize;
        let t = basis.scaled_time(series[idx].0);
        if t > 0.0 && out.last().map_or(true, |prev| t > *prev) {
            out.push(t);
        }
    }
    out
}

// Intercept and base slope stay unpenalized.
fn penalties(width: usize, n_changepoints: usize, changepoint: f64, seasonal: f64) -> Vec<f64> {
    (0..width)
        .map(|i| match i {
            0 | 1 => 0.0,
            i if i < 2 + n_changepoints => changepoint,
            _ => seasonal,
        })
        .collect()
}

fn penalized_least_squares(rows: &[Vec<f64>], ys: &[f64], penalty: &[f64]) -> Result<Vec<f64>> {
    let p = penalty.len();
    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];

    for (row, y) in rows.iter().zip(ys) {
        for i in 0..p {
            if row[i] == 0.0 {
                continue;
            }
            xty[i] += row[i] * y;
            for j in i..p {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..p {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
        xtx[i][i] += penalty[i];
    }

    linalg::solve(xtx, xty)
}

fn residual_sum_of_squares(rows: &[Vec<f64>], ys: &[f64], params: &[f64]) -> f64 {
    rows.iter()
        .zip(ys)
        .map(|(row, y)| {
            let fitted: f64 = row.iter().zip(params).map(|(x, b)| x * b).sum();
            (y - fitted).powi(2)
        })
        .sum()
}
