use crate::config::Settings;
use crate::market::error::{ProviderError, UNKNOWN_PROVIDER_ERROR};
use crate::market::types::HistoricalBar;
use crate::market::MarketDataClient;
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::time::Duration;

const PROVIDER_NAME: &str = "twelvedata";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DAILY_INTERVAL: &str = "1day";
// Largest page the provider serves in one response.
const OUTPUT_SIZE: u32 = 5000;

#[derive(Debug, Clone)]
pub struct TwelveDataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TwelveDataClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_twelvedata_api_key()?.to_string();
        let timeout_secs = settings
            .twelvedata_timeout_secs
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(&settings.twelvedata_base_url, api_key, Duration::from_secs(timeout_secs))
    }

    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build twelvedata http client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/time_series", self.base_url)
    }

    fn query(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("interval", DAILY_INTERVAL.to_string()),
            ("start_date", start_date.to_string()),
        ];
        if let Some(end) = end_date {
            params.push(("end_date", end.to_string()));
        }
        params.push(("apikey", self.api_key.clone()));
        params.push(("outputsize", OUTPUT_SIZE.to_string()));
        params
    }
}

#[async_trait::async_trait]
impl MarketDataClient for TwelveDataClient {
    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<HistoricalBar>> {
        let res = self
            .http
            .get(self.url())
            .query(&self.query(symbol, start_date, end_date))
            .send()
            .await
            .context("twelvedata request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read twelvedata response")?;
        // Errors arrive as JSON bodies, frequently with HTTP 200, so the body decides.
        let raw = serde_json::from_str::<Value>(&text).with_context(|| {
            format!("twelvedata HTTP {status}: response is not valid JSON: {text}")
        })?;

        let bars = parse_time_series(&raw)?;
        tracing::debug!(%symbol, %start_date, ?end_date, bars = bars.len(), "fetched daily bars");
        Ok(bars)
    }
}

/// Turns a `/time_series` body into bars sorted ascending by date.
pub fn parse_time_series(raw: &Value) -> Result<Vec<HistoricalBar>> {
    let Some(values) = raw.get("values") else {
        let message = raw
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN_PROVIDER_ERROR.to_string());
        return Err(ProviderError {
            provider: PROVIDER_NAME,
            code: raw.get("code").and_then(Value::as_i64),
            message,
        }
        .into());
    };

    let records = values
        .as_array()
        .context("twelvedata `values` is not an array")?;

    let mut bars = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        bars.push(parse_record(record).with_context(|| format!("invalid bar at index {idx}"))?);
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

fn parse_record(record: &Value) -> Result<HistoricalBar> {
    let datetime = record
        .get("datetime")
        .and_then(Value::as_str)
        .context("missing datetime")?;

    Ok(HistoricalBar {
        date: parse_datetime(datetime)?,
        open: coerce_num(record, "open")?,
        high: coerce_num(record, "high")?,
        low: coerce_num(record, "low")?,
        close: coerce_num(record, "close")?,
        volume: coerce_num(record, "volume")?,
    })
}

fn parse_datetime(s: &str) -> Result<NaiveDate> {
    let t = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Ok(d);
    }
    NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.date())
        .with_context(|| format!("unrecognized datetime: {s}"))
}

// The provider sends numbers as strings. Absent and empty fields are missing; anything else that
// does not parse is an error.
fn coerce_num(record: &Value, field: &str) -> Result<Option<f64>> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(None);
            }
            t.parse::<f64>()
                .map(Some)
                .with_context(|| format!("{field} is not numeric: {s}"))
        }
        Some(other) => anyhow::bail!("{field} is not numeric: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_and_sorts_ascending() {
        let raw = json!({
            "meta": {"symbol": "AAPL", "interval": "1day"},
            "values": [
                {"datetime": "2024-01-05", "open": "181.99", "high": "182.76", "low": "180.17", "close": "181.18", "volume": "62303300"},
                {"datetime": "2024-01-04", "open": "182.15", "high": "183.09", "low": "180.88", "close": "181.91", "volume": "71983600"},
            ],
            "status": "ok"
        });

        let bars = parse_time_series(&raw).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, date(2024, 1, 4));
        assert_eq!(bars[1].date, date(2024, 1, 5));
        assert_eq!(bars[0].close, Some(181.91));
        assert_eq!(bars[1].volume, Some(62_303_300.0));
    }

    #[test]
    fn missing_values_carries_provider_message() {
        let raw = json!({
            "code": 429,
            "message": "You have run out of API credits for the current minute.",
            "status": "error"
        });

        let err = parse_time_series(&raw).unwrap_err();
        let provider = err.downcast_ref::<ProviderError>().unwrap();
        assert_eq!(provider.code, Some(429));
        assert_eq!(
            provider.message,
            "You have run out of API credits for the current minute."
        );
        assert!(err.to_string().contains("run out of API credits"));
    }

    #[test]
    fn missing_values_without_message_is_unknown_error() {
        let err = parse_time_series(&json!({"status": "error"})).unwrap_err();
        let provider = err.downcast_ref::<ProviderError>().unwrap();
        assert_eq!(provider.message, UNKNOWN_PROVIDER_ERROR);
    }

    #[test]
    fn absent_fields_are_missing_but_garbage_is_rejected() {
        let raw = json!({
            "values": [
                {"datetime": "2024-01-04 00:00:00", "open": "1.5", "high": "2", "low": "1", "close": "", "volume": null}
            ]
        });
        let bars = parse_time_series(&raw).unwrap();
        assert_eq!(bars[0].date, date(2024, 1, 4));
        assert_eq!(bars[0].close, None);
        assert_eq!(bars[0].volume, None);

        let bad = json!({"values": [{"datetime": "2024-01-04", "open": "n/a"}]});
        assert!(parse_time_series(&bad).is_err());
    }

    #[test]
    fn builds_daily_query_with_optional_end() {
        let client =
            TwelveDataClient::new("https://example.test/", "k".to_string(), Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.url(), "https://example.test/time_series");

        let q = client.query("AAPL", date(2019, 1, 1), None);
        assert!(q.contains(&("interval", "1day".to_string())));
        assert!(q.contains(&("outputsize", "5000".to_string())));
        assert!(!q.iter().any(|(k, _)| *k == "end_date"));

        let q = client.query("AAPL", date(2019, 1, 1), Some(date(2020, 1, 1)));
        assert!(q.contains(&("end_date", "2020-01-01".to_string())));
    }
}
