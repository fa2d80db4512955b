use chrono::NaiveDate;
use std::time::Duration;
use stockcast_core::catalog::Company;
use stockcast_core::forecast::artifact::ModelStore;
use stockcast_core::forecast::train::{train_target, TrainOptions, TrainOutcome};
use stockcast_core::forecast::Target;
use stockcast_core::market::MarketDataClient;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tickers_processed: usize,
    pub tickers_failed: usize,
    pub models_saved: usize,
    pub targets_skipped: usize,
    pub targets_failed: usize,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub start_date: NaiveDate,
    pub request_delay: Duration,
    pub train: TrainOptions,
}

/// Trains every target for every company. A failed fetch skips the ticker; a failed fit or save
/// skips only that target.
pub async fn run(
    client: &dyn MarketDataClient,
    store: &ModelStore,
    companies: &[&'static Company],
    opts: &RunOptions,
) -> RunSummary {
    let mut summary = RunSummary::default();

    for (idx, company) in companies.iter().enumerate() {
        if idx != 0 && !opts.request_delay.is_zero() {
            tokio::time::sleep(opts.request_delay).await;
        }

        tracing::info!(ticker = company.symbol, name = company.name, "processing ticker");
        let results = match process_ticker(client, store, company.symbol, opts).await {
            Ok(results) => results,
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                summary.tickers_failed += 1;
                tracing::error!(
                    ticker = company.symbol,
                    error = %format!("{err:#}"),
                    "ticker failed"
                );
                continue;
            }
        };

        summary.tickers_processed += 1;
        for (target, result) in results {
            match result {
                Ok(TrainOutcome::Saved { .. }) => summary.models_saved += 1,
                Ok(TrainOutcome::Fitted { .. }) => {}
                Ok(TrainOutcome::NotEnoughData { .. } | TrainOutcome::ColumnMissing) => {
                    summary.targets_skipped += 1
                }
                Err(err) => {
                    sentry_anyhow::capture_anyhow(&err);
                    summary.targets_failed += 1;
                    tracing::error!(
                        ticker = company.symbol,
                        %target,
                        error = %format!("{err:#}"),
                        "target failed"
                    );
                }
            }
        }
    }

    summary
}

async fn process_ticker(
    client: &dyn MarketDataClient,
    store: &ModelStore,
    ticker: &str,
    opts: &RunOptions,
) -> anyhow::Result<Vec<(Target, anyhow::Result<TrainOutcome>)>> {
    let bars = client.fetch_daily_bars(ticker, opts.start_date, None).await?;
    tracing::debug!(
        %ticker,
        bars = bars.len(),
        provider = client.provider_name(),
        "fetched history"
    );

    Ok(Target::ALL
        .into_iter()
        .map(|target| (target, train_target(store, ticker, target, &bars, &opts.train)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use stockcast_core::catalog;
    use stockcast_core::market::error::ProviderError;
    use stockcast_core::market::types::HistoricalBar;

    struct FakeClient;

    #[async_trait::async_trait]
    impl MarketDataClient for FakeClient {
        fn provider_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_daily_bars(
            &self,
            symbol: &str,
            start_date: NaiveDate,
            _end_date: Option<NaiveDate>,
        ) -> anyhow::Result<Vec<HistoricalBar>> {
            let n = match symbol {
                "AAPL" => 150,
                "AMZN" => 40,
                _ => {
                    return Err(ProviderError {
                        provider: "fake",
                        code: Some(400),
                        message: format!("**symbol** {symbol} not found"),
                    }
                    .into())
                }
            };
            Ok((0..n)
                .map(|i| {
                    let px = 10.0 + 0.1 * i as f64 + (i % 5) as f64;
                    HistoricalBar {
                        date: start_date + Days::new(i),
                        open: Some(px),
                        high: Some(px + 1.0),
                        low: Some(px - 1.0),
                        close: Some(px + 0.2),
                        volume: Some(1000.0 + i as f64),
                    }
                })
                .collect())
        }
    }

    fn opts() -> RunOptions {
        RunOptions {
            start_date: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            request_delay: Duration::ZERO,
            train: TrainOptions::default(),
        }
    }

    #[tokio::test]
    async fn failures_are_isolated_per_ticker() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        // BLK errors in the fake; it sits between two tickers that succeed.
        let companies = catalog::parse_subset("AAPL,BLK,AMZN").unwrap();

        let summary = run(&FakeClient, &store, &companies, &opts()).await;

        assert_eq!(
            summary,
            RunSummary {
                tickers_processed: 2,
                tickers_failed: 1,
                models_saved: 3,
                targets_skipped: 3,
                targets_failed: 0,
            }
        );
        for target in Target::ALL {
            assert!(store.exists("AAPL", target));
            assert!(!store.exists("AMZN", target));
            assert!(!store.exists("BLK", target));
        }
    }

    #[tokio::test]
    async fn failed_save_skips_only_that_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        // A directory where the close artifact should go makes its rename fail.
        let blocked = store.path_for("AAPL", Target::Close);
        std::fs::create_dir_all(blocked.join("occupied")).unwrap();
        let companies = catalog::parse_subset("AAPL").unwrap();

        let summary = run(&FakeClient, &store, &companies, &opts()).await;

        assert_eq!(
            summary,
            RunSummary {
                tickers_processed: 1,
                tickers_failed: 0,
                models_saved: 2,
                targets_skipped: 0,
                targets_failed: 1,
            }
        );
        assert!(store.exists("AAPL", Target::Open));
        assert!(!store.exists("AAPL", Target::Close));
        assert!(store.exists("AAPL", Target::Volume));
    }
}
