use std::path::PathBuf;

use crate::limits::MAX_QUERY_WINDOW_DAYS;

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub dataset: PathBuf,
    /// URL query string the calendar starts from.
    pub query: String,
    /// Channel used for the nightly commission quote, if any.
    pub platform: Option<String>,
    pub window_days: i64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("./dataset.json"),
            query: String::new(),
            platform: None,
            window_days: 30,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            dataset: var("RENTCAL_DATASET")
                .map(PathBuf::from)
                .unwrap_or(defaults.dataset),
            query: var("RENTCAL_QUERY").unwrap_or_default(),
            platform: var("RENTCAL_PLATFORM").filter(|s| !s.trim().is_empty()),
            window_days: var("RENTCAL_WINDOW_DAYS")
                .and_then(|s| s.parse().ok())
                .filter(|d| (1..=MAX_QUERY_WINDOW_DAYS).contains(d))
                .unwrap_or(defaults.window_days),
            metrics_port: var("RENTCAL_METRICS_PORT").and_then(|s| s.parse().ok()),
        }
    }
}
