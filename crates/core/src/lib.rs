pub mod catalog;
pub mod forecast;
pub mod market;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    pub const DEFAULT_TWELVEDATA_BASE_URL: &str = "https://api.twelvedata.com";
    pub const DEFAULT_MODEL_DIR: &str = "models";
    pub const DEFAULT_PORT: u16 = 3000;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub twelvedata_api_key: Option<String>,
        pub twelvedata_base_url: String,
        pub twelvedata_timeout_secs: Option<u64>,
        pub model_dir: PathBuf,
        pub sentry_dsn: Option<String>,
        pub port: u16,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let twelvedata_timeout_secs = match std::env::var("TWELVEDATA_TIMEOUT_SECS") {
                Ok(s) => Some(
                    s.trim()
                        .parse::<u64>()
                        .with_context(|| format!("TWELVEDATA_TIMEOUT_SECS is not a number: {s}"))?,
                ),
                Err(_) => None,
            };
            let port = parse_port(std::env::var("PORT").ok().as_deref())?;

            Ok(Self {
                twelvedata_api_key: std::env::var("TWELVEDATA_API_KEY")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                twelvedata_base_url: std::env::var("TWELVEDATA_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_TWELVEDATA_BASE_URL.to_string()),
                twelvedata_timeout_secs,
                model_dir: std::env::var("MODEL_DIR")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                port,
            })
        }

        pub fn require_twelvedata_api_key(&self) -> anyhow::Result<&str> {
            self.twelvedata_api_key
                .as_deref()
                .context("TWELVEDATA_API_KEY is required")
        }
    }

    fn parse_port(value: Option<&str>) -> anyhow::Result<u16> {
        match value.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(DEFAULT_PORT),
            Some(s) => s
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port: {s}")),
        }
    }

}
