pub mod error;
pub mod twelvedata;
pub mod types;

use crate::market::types::HistoricalBar;
use chrono::NaiveDate;

#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Daily bars for `symbol` from `start_date` through `end_date` (or the latest bar when
    /// `None`), sorted ascending by date.
    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> anyhow::Result<Vec<HistoricalBar>>;
}
