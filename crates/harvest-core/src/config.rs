use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;
use crate::throttle::PacingMode;

pub const DEFAULT_BASE_URL: &str = "https://www.repeaterbook.com";
pub const DEFAULT_USER_AGENT: &str = "repeater-harvest/0.3 (Amateur Radio Tool)";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_secs(1);
pub const DEFAULT_PROGRESS_EVERY: usize = 10;

/// Runtime settings for a harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
    pub pacing: PacingMode,
    /// Parent of the per-run scratch directory; system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
    /// Log every extracted field at debug level.
    pub verbose: bool,
    /// Crawl progress is reported every this many items.
    pub progress_every: usize,
    /// Follow EchoLink/IRLP status links (second hop).
    pub resolve_status: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            pacing: PacingMode::fixed(DEFAULT_RATE_LIMIT),
            scratch_root: None,
            verbose: false,
            progress_every: DEFAULT_PROGRESS_EVERY,
            resolve_status: true,
        }
    }
}

impl HarvestConfig {
    /// Read configuration from environment variables.
    ///
    /// - `HARVEST_BASE_URL` (optional, directory root URL)
    /// - `HARVEST_TIMEOUT_SECS` (optional, defaults to 30)
    /// - `HARVEST_USER_AGENT` (optional)
    /// - `HARVEST_RATE_LIMIT` (optional, seconds between requests, defaults to 1.0)
    /// - `HARVEST_NOHAMMER` (optional, `true` for random 1-10 s delays)
    /// - `HARVEST_TEMP_DIR` (optional, scratch root)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(url) = var("HARVEST_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(raw) = var("HARVEST_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AppError::ConfigError(format!(
                    "Invalid HARVEST_TIMEOUT_SECS '{raw}': must be a positive integer"
                ))
            })?;
            if secs == 0 {
                return Err(AppError::ConfigError(
                    "HARVEST_TIMEOUT_SECS must be at least 1".into(),
                ));
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(agent) = var("HARVEST_USER_AGENT").filter(|v| !v.trim().is_empty()) {
            config.user_agent = agent;
        }
        if let Some(raw) = var("HARVEST_RATE_LIMIT") {
            config.pacing = PacingMode::fixed(parse_rate_limit(&raw)?);
        }
        if let Some(raw) = var("HARVEST_NOHAMMER")
            && parse_flag("HARVEST_NOHAMMER", &raw)?
        {
            config.pacing = PacingMode::polite();
        }
        if let Some(dir) = var("HARVEST_TEMP_DIR").filter(|v| !v.trim().is_empty()) {
            config.scratch_root = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn with_pacing(mut self, pacing: PacingMode) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every.max(1);
        self
    }

    pub fn with_resolve_status(mut self, resolve: bool) -> Self {
        self.resolve_status = resolve;
        self
    }
}

/// Seconds between requests; non-negative and finite.
pub fn parse_rate_limit(raw: &str) -> Result<Duration, AppError> {
    let secs: f64 = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid rate limit '{raw}': must be a number of seconds"))
    })?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(AppError::ConfigError(format!(
            "Invalid rate limit '{raw}': must be zero or positive"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| AppError::ConfigError(format!("Invalid rate limit '{raw}': {e}")))
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::ConfigError(format!(
            "Invalid {name} '{raw}': expected true or false"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarvestConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.pacing, PacingMode::fixed(Duration::from_secs(1)));
        assert_eq!(config.progress_every, 10);
        assert!(config.resolve_status);
        assert!(config.scratch_root.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = HarvestConfig::from_lookup(lookup(&[
            ("HARVEST_BASE_URL", "http://localhost:8080/"),
            ("HARVEST_TIMEOUT_SECS", "5"),
            ("HARVEST_RATE_LIMIT", "2.5"),
            ("HARVEST_TEMP_DIR", "/tmp/scratch"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.pacing, PacingMode::fixed(Duration::from_millis(2500)));
        assert_eq!(config.scratch_root, Some(PathBuf::from("/tmp/scratch")));
    }

    #[test]
    fn test_nohammer_wins_over_rate_limit() {
        let config = HarvestConfig::from_lookup(lookup(&[
            ("HARVEST_RATE_LIMIT", "3"),
            ("HARVEST_NOHAMMER", "true"),
        ]))
        .unwrap();
        assert_eq!(config.pacing, PacingMode::polite());
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for pairs in [
            [("HARVEST_TIMEOUT_SECS", "abc")],
            [("HARVEST_TIMEOUT_SECS", "0")],
            [("HARVEST_RATE_LIMIT", "-1")],
            [("HARVEST_NOHAMMER", "maybe")],
        ] {
            let err = HarvestConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(err, AppError::ConfigError(_)), "{pairs:?}");
        }
    }

    #[test]
    fn test_rate_limit_parsing() {
        assert_eq!(parse_rate_limit("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_rate_limit(" 0.5 ").unwrap(), Duration::from_millis(500));
        for raw in ["1e20", "inf", "NaN", "-0.1", "fast"] {
            let err = parse_rate_limit(raw).unwrap_err();
            assert!(matches!(err, AppError::ConfigError(_)), "{raw}");
        }
    }

    #[test]
    fn test_builder_methods() {
        let config = HarvestConfig::default()
            .with_base_url("http://mirror.test")
            .with_progress_every(0)
            .with_resolve_status(false)
            .with_verbose(true);
        assert_eq!(config.base_url, "http://mirror.test");
        assert_eq!(config.progress_every, 1);
        assert!(!config.resolve_status);
        assert!(config.verbose);
    }
}
