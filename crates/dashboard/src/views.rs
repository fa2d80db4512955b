use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use stockcast_core::catalog::{self, Company};
use stockcast_core::forecast::artifact::{ModelNotFound, ModelStore};
use stockcast_core::forecast::{serve, Target};
use stockcast_core::market::types::{within_range, HistoricalBar};
use stockcast_core::market::MarketDataClient;

pub const UNAVAILABLE_MESSAGE: &str = "Prediction not available for selected date.";

/// Widest date window a chart or range endpoint will build.
pub const MAX_RANGE_DAYS: i64 = 3660;

/// Bad user input (unparsable, out-of-order or too wide dates).
#[derive(Debug, Clone)]
pub struct InvalidInput(pub String);

impl fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidInput {}

/// Symbol that is not in the catalog.
#[derive(Debug, Clone)]
pub struct UnknownSymbol(pub String);

impl fmt::Display for UnknownSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown symbol: {}", self.0)
    }
}

impl std::error::Error for UnknownSymbol {}

#[derive(Debug, Clone, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub points: Vec<(NaiveDate, f64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Panel {
    Chart(Chart),
    Warning { message: String },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendsView {
    pub company: Company,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub forecasts: Vec<Panel>,
    pub history: Vec<Panel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictOutcome {
    Available { open: f64, close: f64, volume: f64 },
    Unavailable { message: String },
    ModelMissing { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictView {
    pub company: Company,
    pub date: String,
    pub outcome: PredictOutcome,
}

impl PredictView {
    /// Heading plus the three formatted lines, when all predictions are available.
    pub fn lines(&self) -> Option<(String, [String; 3])> {
        let PredictOutcome::Available { open, close, volume } = &self.outcome else {
            return None;
        };
        Some((
            format!("{} Prediction for {}:", self.company.name, self.date),
            [
                format!("Open Price: {}", format_price(*open)),
                format!("Close Price: {}", format_price(*close)),
                format!("Volume: {}", format_volume(*volume)),
            ],
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareView {
    pub first: Company,
    pub second: Company,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub panels: Vec<Panel>,
}

pub fn lookup(symbol: &str) -> Result<Company> {
    catalog::find(symbol)
        .copied()
        .ok_or_else(|| UnknownSymbol(symbol.trim().to_string()).into())
}

/// Parses an optional `YYYY-MM-DD` query value, falling back to `default` when absent or blank.
pub fn parse_date_or(value: Option<&str>, default: NaiveDate, field: &str) -> Result<NaiveDate> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| InvalidInput(format!("{field} must be YYYY-MM-DD (got {s})")).into()),
    }
}

/// Rejects reversed windows and windows wider than [`MAX_RANGE_DAYS`].
pub fn check_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(InvalidInput(format!("start date {start} is after end date {end}")).into());
    }
    if (end - start).num_days() > MAX_RANGE_DAYS {
        return Err(InvalidInput(format!(
            "date range {start} to {end} is wider than {MAX_RANGE_DAYS} days"
        ))
        .into());
    }
    Ok(())
}

/// Forecast charts for all targets plus history charts for one ticker.
pub async fn trends(
    market: &dyn MarketDataClient,
    store: &ModelStore,
    symbol: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<TrendsView> {
    let company = lookup(symbol)?;
    check_range(start_date, end_date)?;

    let mut forecasts = Vec::with_capacity(Target::ALL.len());
    for target in Target::ALL {
        let rows = serve::forecast_stored(store, company.symbol, target, start_date, end_date);
        let panel = match rows {
            Ok(rows) => Panel::Chart(Chart {
                title: format!("{} {} Forecast", company.name, target.title()),
                x_label: "Date".to_string(),
                y_label: target.title().to_string(),
                series: vec![ChartSeries {
                    label: format!("Forecast {}", target.title()),
                    points: rows.iter().map(|r| (r.ds, r.yhat)).collect(),
                }],
            }),
            Err(err) => model_error_panel(err)?,
        };
        forecasts.push(panel);
    }

    let history = match market
        .fetch_daily_bars(company.symbol, start_date, Some(end_date))
        .await
    {
        Ok(bars) => Target::ALL
            .iter()
            .map(|&target| {
                Panel::Chart(Chart {
                    title: format!("{} {} Price", company.name, target.title()),
                    x_label: "Date".to_string(),
                    y_label: target.title().to_string(),
                    series: vec![series_for(target.title().to_string(), &bars, target)],
                })
            })
            .collect(),
        Err(err) => vec![fetch_error_panel(company.symbol, &err)],
    };

    Ok(TrendsView {
        company,
        start_date,
        end_date,
        forecasts,
        history,
    })
}

/// Open, close and volume predictions for a single date.
pub fn predict(
    store: &ModelStore,
    symbol: &str,
    date: &str,
    today: NaiveDate,
) -> Result<PredictView> {
    let company = lookup(symbol)?;
    if let Ok(d) = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        if d <= today {
            return Err(InvalidInput(format!("select a future date (after {today})")).into());
        }
    }

    let mut values = [None; 3];
    for (slot, target) in values.iter_mut().zip(Target::ALL) {
        match store.load(company.symbol, target) {
            Ok(artifact) => *slot = serve::forecast_for_date(&artifact.model, date),
            Err(err) => {
                if let Some(nf) = err.downcast_ref::<ModelNotFound>() {
                    tracing::warn!(
                        ticker = company.symbol,
                        %target,
                        path = %nf.path.display(),
                        "model artifact missing"
                    );
                    return Ok(PredictView {
                        company,
                        date: date.trim().to_string(),
                        outcome: PredictOutcome::ModelMissing {
                            message: nf.to_string(),
                        },
                    });
                }
                return Err(err);
            }
        }
    }

    let outcome = match values {
        [Some(open), Some(close), Some(volume)] => PredictOutcome::Available {
            open,
            close,
            volume,
        },
        _ => PredictOutcome::Unavailable {
            message: UNAVAILABLE_MESSAGE.to_string(),
        },
    };

    Ok(PredictView {
        company,
        date: date.trim().to_string(),
        outcome,
    })
}

/// Overlaid history of two tickers; the end date never goes past `today`.
pub async fn compare(
    market: &dyn MarketDataClient,
    first: &str,
    second: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    today: NaiveDate,
) -> Result<CompareView> {
    let first = lookup(first)?;
    let second = lookup(second)?;
    let end_date = end_date.min(today);
    check_range(start_date, end_date)?;

    let first_res = market
        .fetch_daily_bars(first.symbol, start_date, Some(end_date))
        .await;
    let second_res = market
        .fetch_daily_bars(second.symbol, start_date, Some(end_date))
        .await;

    let panels = match (first_res, second_res) {
        (Ok(a), Ok(b)) => {
            let a = window(&a, start_date, end_date);
            let b = window(&b, start_date, end_date);
            [
                (Target::Open, "Opening Price"),
                (Target::Close, "Closing Price"),
                (Target::Volume, "Volume"),
            ]
            .iter()
            .map(|&(target, label)| {
                Panel::Chart(Chart {
                    title: label.to_string(),
                    x_label: "Date".to_string(),
                    y_label: label.to_string(),
                    series: vec![
                        series_for(format!("{} {label}", first.name), &a, target),
                        series_for(format!("{} {label}", second.name), &b, target),
                    ],
                })
            })
            .collect()
        }
        (a, b) => [(first.symbol, a), (second.symbol, b)]
            .into_iter()
            .filter_map(|(symbol, res)| res.err().map(|err| fetch_error_panel(symbol, &err)))
            .collect(),
    };

    Ok(CompareView {
        first,
        second,
        start_date,
        end_date,
        panels,
    })
}

/// Rows dated inside `[start, end]`, ascending.
pub fn window(bars: &[HistoricalBar], start: NaiveDate, end: NaiveDate) -> Vec<HistoricalBar> {
    let mut rows = within_range(bars, start, end);
    rows.sort_by_key(|b| b.date);
    rows
}

fn series_for(label: String, bars: &[HistoricalBar], target: Target) -> ChartSeries {
    ChartSeries {
        label,
        points: bars
            .iter()
            .filter_map(|b| b.value(target).map(|v| (b.date, v)))
            .collect(),
    }
}

fn model_error_panel(err: anyhow::Error) -> Result<Panel> {
    match err.downcast_ref::<ModelNotFound>() {
        Some(nf) => Ok(Panel::Warning {
            message: nf.to_string(),
        }),
        None => Err(err),
    }
}

fn fetch_error_panel(symbol: &str, err: &anyhow::Error) -> Panel {
    tracing::warn!(%symbol, error = %format!("{err:#}"), "history fetch failed");
    Panel::Error {
        message: err.to_string(),
    }
}

pub fn format_price(v: f64) -> String {
    if v < 0.0 {
        format!("-${:.2}", -v)
    } else {
        format!("${v:.2}")
    }
}

/// Rounds to a whole number with thousands separators, e.g. `1,234,568`.
pub fn format_volume(v: f64) -> String {
    let rounded = v.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        out.insert(0, '-');
    }
    out
}
