//! Client configuration.

use std::time::Duration;

use crate::error::{BoardError, BoardResult};

pub const DEFAULT_API_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL, without a trailing slash
    pub api_url: String,
    /// Search page size, fixed for the session
    pub page_size: usize,
    /// Request timeout
    pub request_timeout: Duration,
    /// Rows from the bottom of the list that trigger continuation
    pub scroll_threshold: usize,
    /// Minimum gap between continuation triggers
    pub scroll_interval: Duration,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            page_size: 5,
            request_timeout: Duration::from_secs(30),
            scroll_threshold: 3,
            scroll_interval: Duration::from_millis(1000),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Create config from environment variables (after loading `.env`).
    pub fn from_env() -> BoardResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> BoardResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());

        let config = Self {
            api_url: lookup("JOBBOARD_API_URL").unwrap_or(defaults.api_url),
            page_size: number("JOBBOARD_PAGE_SIZE")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.page_size),
            request_timeout: number("JOBBOARD_TIMEOUT_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            scroll_threshold: number("JOBBOARD_SCROLL_THRESHOLD")
                .map(|n| n as usize)
                .unwrap_or(defaults.scroll_threshold),
            scroll_interval: number("JOBBOARD_SCROLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.scroll_interval),
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        };
        let url = config.api_url.clone();
        config.with_api_url(&url)
    }

    /// Replace the base URL, normalising and checking it.
    pub fn with_api_url(mut self, url: &str) -> BoardResult<Self> {
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(BoardError::Config("API URL is empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(BoardError::Config(format!(
                "API URL must start with http:// or https://, got '{}'",
                url
            )));
        }
        self.api_url = url.to_string();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> BoardResult<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.page_size, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.scroll_threshold, 3);
        assert_eq!(config.scroll_interval, Duration::from_secs(1));
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("JOBBOARD_API_URL", "https://jobs.example.com/"),
            ("JOBBOARD_PAGE_SIZE", "10"),
            ("JOBBOARD_SCROLL_INTERVAL_MS", "250"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.api_url, "https://jobs.example.com");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.scroll_interval, Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = from_pairs(&[("JOBBOARD_PAGE_SIZE", "lots"), ("JOBBOARD_TIMEOUT_SECS", "0")]).unwrap();
        assert_eq!(config.page_size, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_bad_url_is_config_error() {
        let err = from_pairs(&[("JOBBOARD_API_URL", "localhost:5000")]).unwrap_err();
        assert!(matches!(err, BoardError::Config(_)));
        assert!(Config::default().with_api_url("  ").is_err());
    }
}
