use crate::forecast::artifact::{ModelArtifact, ModelStore};
use crate::forecast::model::{AdditiveModel, ModelConfig};
use crate::forecast::Target;
use crate::market::types::{target_series, HistoricalBar};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Targets with fewer non-missing observations than this are not trained.
pub const MIN_OBSERVATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    Saved { path: PathBuf, observations: usize },
    /// Fitted but not written (dry run).
    Fitted { observations: usize },
    NotEnoughData { observations: usize },
    ColumnMissing,
}

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub min_observations: usize,
    pub dry_run: bool,
    pub model: ModelConfig,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            min_observations: MIN_OBSERVATIONS,
            dry_run: false,
            model: ModelConfig::default(),
        }
    }
}

/// Fits and persists the model for one ticker/target from already-fetched bars.
pub fn train_target(
    store: &ModelStore,
    ticker: &str,
    target: Target,
    bars: &[HistoricalBar],
    opts: &TrainOptions,
) -> Result<TrainOutcome> {
    if !bars.iter().any(|b| b.value(target).is_some()) {
        tracing::warn!(%ticker, %target, "target column not found");
        return Ok(TrainOutcome::ColumnMissing);
    }

    let series = target_series(bars, target);
    let observations = series.len();
    if observations < opts.min_observations {
        tracing::info!(
            %ticker,
            %target,
            observations,
            min = opts.min_observations,
            "skipping target: not enough data"
        );
        return Ok(TrainOutcome::NotEnoughData { observations });
    }

    let model = AdditiveModel::fit(&series, opts.model.clone())
        .with_context(|| format!("fit failed for {ticker} {target}"))?;
    tracing::debug!(
        %ticker,
        %target,
        changepoints = model.changepoint_count(),
        seasonalities = model.seasonalities().len(),
        "model fitted"
    );

    if opts.dry_run {
        tracing::info!(%ticker, %target, observations, dry_run = true, "fitted model");
        return Ok(TrainOutcome::Fitted { observations });
    }

    let path = store.save(&ModelArtifact::new(ticker, target, model))?;
    tracing::info!(%ticker, %target, observations, path = %path.display(), "saved model");
    Ok(TrainOutcome::Saved { path, observations })
}
