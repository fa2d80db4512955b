use std::fmt;

pub const UNKNOWN_PROVIDER_ERROR: &str = "Unknown error";

/// Error reported by the market-data provider in its response body (rate limits, bad symbols,
/// missing plan access).
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: &'static str,
    pub code: Option<i64>,
    pub message: String,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error fetching data: {}", self.message)
    }
}

impl std::error::Error for ProviderError {}
