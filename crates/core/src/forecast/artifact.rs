use crate::forecast::model::AdditiveModel;
use crate::forecast::Target;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub ticker: String,
    pub target: Target,
    pub trained_at: DateTime<Utc>,
    pub observations: usize,
    pub model: AdditiveModel,
}

impl ModelArtifact {
    pub fn new(ticker: &str, target: Target, model: AdditiveModel) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            ticker: normalize_ticker(ticker),
            target,
            trained_at: Utc::now(),
            observations: model.history_len(),
            model,
        }
    }
}

/// No artifact on disk for the requested ticker/target.
#[derive(Debug, Clone)]
pub struct ModelNotFound {
    pub ticker: String,
    pub target: Target,
    pub path: PathBuf,
}

impl fmt::Display for ModelNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Model files for {} not found.", self.ticker)
    }
}

impl std::error::Error for ModelNotFound {}

/// Directory of `<TICKER>_<target>.json` artifacts.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, ticker: &str, target: Target) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", normalize_ticker(ticker), target.as_str()))
    }

    pub fn exists(&self, ticker: &str, target: Target) -> bool {
        self.path_for(ticker, target).is_file()
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create model dir {}", self.dir.display()))
    }

    /// Writes through a temp file and rename so readers never see a partial artifact.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.path_for(&artifact.ticker, artifact.target);
        let tmp = path.with_extension("json.tmp");

        let body = serde_json::to_vec(artifact).context("failed to serialize model artifact")?;
        std::fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move artifact into {}", path.display()))?;
        Ok(path)
    }

    pub fn load(&self, ticker: &str, target: Target) -> Result<ModelArtifact> {
        let path = self.path_for(ticker, target);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ModelNotFound {
                    ticker: normalize_ticker(ticker),
                    target,
                    path,
                }
                .into());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        let artifact: ModelArtifact = serde_json::from_slice(&bytes)
            .with_context(|| format!("model artifact {} is not valid", path.display()))?;
        anyhow::ensure!(
            artifact.format_version == FORMAT_VERSION,
            "unsupported model artifact version {} in {}",
            artifact.format_version,
            path.display()
        );
        anyhow::ensure!(
            artifact.target == target,
            "artifact {} holds a {} model",
            path.display(),
            artifact.target
        );
        Ok(artifact)
    }
}

fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::model::ModelConfig;
    use chrono::{Days, NaiveDate};

    fn small_model() -> AdditiveModel {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series: Vec<_> = (0..40)
            .map(|i| (start + Days::new(i), 10.0 + i as f64))
            .collect();
        AdditiveModel::fit(&series, ModelConfig::default()).unwrap()
    }

    #[test]
    fn path_uses_ticker_and_target() {
        let store = ModelStore::new("models");
        assert_eq!(
            store.path_for("aapl", Target::Close),
            PathBuf::from("models").join("AAPL_close.json")
        );
    }

    #[test]
    fn saves_and_loads_the_same_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("nested"));
        let artifact = ModelArtifact::new("AAPL", Target::Open, small_model());

        let path = store.save(&artifact).unwrap();
        assert!(path.ends_with("AAPL_open.json"));
        assert!(store.exists("AAPL", Target::Open));

        let loaded = store.load("AAPL", Target::Open).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(loaded.observations, 40);
    }

    #[test]
    fn missing_file_is_model_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());

        let err = store.load("GS", Target::Volume).unwrap_err();
        let nf = err.downcast_ref::<ModelNotFound>().unwrap();
        assert_eq!(nf.ticker, "GS");
        assert_eq!(err.to_string(), "Model files for GS not found.");
    }

    #[test]
    fn rejects_unknown_format_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let mut artifact = ModelArtifact::new("FOX", Target::Close, small_model());
        artifact.format_version = 99;
        store.save(&artifact).unwrap();

        let err = store.load("FOX", Target::Close).unwrap_err();
        assert!(err.downcast_ref::<ModelNotFound>().is_none());
        assert!(err.to_string().contains("unsupported model artifact version"));
    }
}
