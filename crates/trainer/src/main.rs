use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use stockcast_core::catalog;
use stockcast_core::forecast::artifact::ModelStore;
use stockcast_core::forecast::train::TrainOptions;
use stockcast_core::market::twelvedata::TwelveDataClient;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod pipeline;

#[derive(Debug, Parser)]
#[command(name = "stockcast_trainer")]
struct Args {
    /// First day of history to train on (YYYY-MM-DD).
    #[arg(long, default_value = "2019-01-01")]
    start_date: String,

    /// Where to write `<TICKER>_<target>.json`. Defaults to MODEL_DIR or `models`.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Comma separated subset of the catalog, e.g. `AAPL,NFLX`.
    #[arg(long)]
    tickers: Option<String>,

    /// Pause between tickers, to stay under the provider's per-minute quota.
    #[arg(long, default_value_t = 0)]
    request_delay_ms: u64,

    /// Fetch and fit, but do not write artifacts.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockcast_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let start_date = chrono::NaiveDate::parse_from_str(&args.start_date, "%Y-%m-%d")
        .with_context(|| format!("invalid --start-date: {}", args.start_date))?;
    let companies = match args.tickers.as_deref() {
        Some(list) => catalog::parse_subset(list)?,
        None => catalog::companies().iter().collect(),
    };

    let client = TwelveDataClient::from_settings(&settings)?;
    let store = ModelStore::new(args.output_dir.unwrap_or_else(|| settings.model_dir.clone()));
    if !args.dry_run {
        store.ensure_dir()?;
    }

    let opts = pipeline::RunOptions {
        start_date,
        request_delay: Duration::from_millis(args.request_delay_ms),
        train: TrainOptions {
            dry_run: args.dry_run,
            ..TrainOptions::default()
        },
    };

    tracing::info!(
        %start_date,
        tickers = companies.len(),
        model_dir = %store.dir().display(),
        dry_run = args.dry_run,
        "training run started"
    );

    let summary = pipeline::run(&client, &store, &companies, &opts).await;

    tracing::info!(
        tickers_processed = summary.tickers_processed,
        tickers_failed = summary.tickers_failed,
        models_saved = summary.models_saved,
        targets_skipped = summary.targets_skipped,
        targets_failed = summary.targets_failed,
        "training run finished"
    );
    Ok(())
}

fn init_sentry(settings: &stockcast_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
