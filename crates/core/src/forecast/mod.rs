pub mod artifact;
pub mod linalg;
pub mod model;
pub mod serve;
pub mod train;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Open,
    Close,
    Volume,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::Open, Target::Close, Target::Volume];

    pub fn as_str(self) -> &'static str {
        match self {
            Target::Open => "open",
            Target::Close => "close",
            Target::Volume => "volume",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Target::Open => "Open",
            Target::Close => "Close",
            Target::Volume => "Volume",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Target::Open),
            "close" => Ok(Target::Close),
            "volume" => Ok(Target::Volume),
            other => anyhow::bail!("unknown target field: {other}"),
        }
    }
}

/// One predicted point. Only `yhat` is shown to users; the bounds travel along in the JSON API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}
