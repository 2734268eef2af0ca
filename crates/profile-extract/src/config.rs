//! Configuration loading and resolution.
//!
//! Every knob has a default; `from_env` overlays values from the process
//! environment. Nothing here is global: the resulting [`ExtractorConfig`] is
//! passed explicitly to the orchestrator and the session factory.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::renderer::stealth::DEFAULT_USER_AGENT;
use crate::selectors::SelectorCatalog;
use crate::types::AuthCredential;

/// Session creation retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// How each browser is launched.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Explicit Chromium binary; discovered automatically when `None`.
    pub chrome_path: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window_width: 1920,
            window_height: 1080,
            chrome_path: None,
        }
    }
}

/// Delays and bounds used while loading a page.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderSettings {
    /// Wait after navigation for initial client-side rendering.
    pub settle_delay: Duration,
    pub scroll_pause: Duration,
    pub scroll_max_attempts: u32,
    /// Wait between scrolling an expander into view and clicking it.
    pub expand_pre_click: Duration,
    pub expand_post_click: Duration,
    /// Wait after the expand pass before extraction starts.
    pub post_expand_settle: Duration,
    pub navigation_timeout: Duration,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            scroll_pause: Duration::from_millis(1500),
            scroll_max_attempts: 8,
            expand_pre_click: Duration::from_millis(500),
            expand_post_click: Duration::from_secs(1),
            post_expand_settle: Duration::from_secs(1),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Maximum number of simultaneously live rendering sessions.
    pub concurrency_limit: usize,
    pub session: SessionSettings,
    pub browser: BrowserSettings,
    pub loader: LoaderSettings,
    /// Upper bound on one task, from session ready to fields extracted.
    pub task_deadline: Duration,
    pub catalog: SelectorCatalog,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 2,
            session: SessionSettings::default(),
            browser: BrowserSettings::default(),
            loader: LoaderSettings::default(),
            task_deadline: Duration::from_secs(180),
            catalog: SelectorCatalog::default(),
        }
    }
}

impl ExtractorConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    ///
    /// Recognised keys: `HEADLESS`, `SCRAPER_MAX_CONCURRENCY`,
    /// `SCRAPER_RETRY_ATTEMPTS`, `SCRAPER_DELAY` (seconds), `SCRAPER_TIMEOUT`
    /// (navigation, seconds), `SCRAPER_TASK_DEADLINE` (seconds),
    /// `CHROMIUM_PATH`, `SCRAPER_CATALOG` (JSON file).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("HEADLESS") {
            config.browser.headless = parse_bool("HEADLESS", &value)?;
        }
        if let Some(value) = lookup("SCRAPER_MAX_CONCURRENCY") {
            config.concurrency_limit = parse_num("SCRAPER_MAX_CONCURRENCY", &value)?;
        }
        if let Some(value) = lookup("SCRAPER_RETRY_ATTEMPTS") {
            config.session.max_retries = parse_num("SCRAPER_RETRY_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("SCRAPER_DELAY") {
            config.session.retry_delay = parse_secs("SCRAPER_DELAY", &value)?;
        }
        if let Some(value) = lookup("SCRAPER_TIMEOUT") {
            config.loader.navigation_timeout = parse_secs("SCRAPER_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("SCRAPER_TASK_DEADLINE") {
            config.task_deadline = parse_secs("SCRAPER_TASK_DEADLINE", &value)?;
        }
        if let Some(value) = lookup("CHROMIUM_PATH").filter(|v| !v.is_empty()) {
            config.browser.chrome_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("SCRAPER_CATALOG").filter(|v| !v.is_empty()) {
            config.catalog = SelectorCatalog::from_json_file(PathBuf::from(value))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "SCRAPER_MAX_CONCURRENCY",
                value: "0".to_string(),
                reason: "at least one session must be allowed".to_string(),
            });
        }
        if self.session.max_retries == 0 {
            return Err(ConfigError::Invalid {
                key: "SCRAPER_RETRY_ATTEMPTS",
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.loader.scroll_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "scroll_max_attempts",
                value: "0".to_string(),
                reason: "at least one scroll is required".to_string(),
            });
        }
        Ok(())
    }
}

impl AuthCredential {
    /// Credential from `LINKEDIN_ACCESS_TOKEN` and `LINKEDIN_ACCESS_TOKEN_EXP`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("LINKEDIN_ACCESS_TOKEN")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("LINKEDIN_ACCESS_TOKEN"))?;
        let expiry = lookup("LINKEDIN_ACCESS_TOKEN_EXP")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("LINKEDIN_ACCESS_TOKEN_EXP"))?;
        Ok(Self::session_cookie(token.trim(), expiry.trim()))
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn parse_num<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_num(key, value)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a non-negative number of seconds".to_string(),
        });
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExtractorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.concurrency_limit, 2);
        assert_eq!(config.session.max_retries, 3);
        assert_eq!(config.session.retry_delay, Duration::from_secs(2));
        assert_eq!(config.loader.scroll_max_attempts, 8);
        assert_eq!(config.loader.scroll_pause, Duration::from_millis(1500));
        assert!(config.browser.headless);
    }

    #[test]
    fn test_env_overrides() {
        let config = ExtractorConfig::from_lookup(lookup(&[
            ("HEADLESS", "False"),
            ("SCRAPER_MAX_CONCURRENCY", "4"),
            ("SCRAPER_RETRY_ATTEMPTS", "5"),
            ("SCRAPER_DELAY", "0.5"),
            ("SCRAPER_TIMEOUT", "45"),
            ("CHROMIUM_PATH", "/opt/chrome/chrome"),
        ]))
        .unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.session.max_retries, 5);
        assert_eq!(config.session.retry_delay, Duration::from_millis(500));
        assert_eq!(config.loader.navigation_timeout, Duration::from_secs(45));
        assert_eq!(
            config.browser.chrome_path,
            Some(PathBuf::from("/opt/chrome/chrome"))
        );
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = ExtractorConfig::from_lookup(lookup(&[("SCRAPER_MAX_CONCURRENCY", "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "SCRAPER_MAX_CONCURRENCY",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(ExtractorConfig::from_lookup(lookup(&[("HEADLESS", "maybe")])).is_err());
        assert!(ExtractorConfig::from_lookup(lookup(&[("SCRAPER_DELAY", "-1")])).is_err());
        assert!(ExtractorConfig::from_lookup(lookup(&[("SCRAPER_RETRY_ATTEMPTS", "x")])).is_err());
    }

    #[test]
    fn test_credential_requires_token_and_expiry() {
        let err = AuthCredential::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("LINKEDIN_ACCESS_TOKEN")));

        let err = AuthCredential::from_lookup(lookup(&[("LINKEDIN_ACCESS_TOKEN", "abc")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("LINKEDIN_ACCESS_TOKEN_EXP")));

        let cred = AuthCredential::from_lookup(lookup(&[
            ("LINKEDIN_ACCESS_TOKEN", "abc"),
            ("LINKEDIN_ACCESS_TOKEN_EXP", "1767225600"),
        ]))
        .unwrap();
        assert_eq!(cred.cookie_name, "li_at");
        assert_eq!(cred.cookie_domain, ".www.linkedin.com");
        assert_eq!(cred.token, "abc");
        assert!(cred.secure && cred.http_only);
    }

    #[test]
    fn test_catalog_file_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut catalog = SelectorCatalog::default();
        catalog.site = "staging.example.com".to_string();
        std::fs::write(&path, serde_json::to_string(&catalog).unwrap()).unwrap();

        let config = ExtractorConfig::from_lookup(lookup(&[(
            "SCRAPER_CATALOG",
            path.to_str().unwrap(),
        )]))
        .unwrap();
        assert_eq!(config.catalog.site, "staging.example.com");
    }
}
