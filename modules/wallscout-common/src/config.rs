use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::WallScoutError;

/// How the VK client obtains its session.
#[derive(Clone)]
pub enum VkAuthConfig {
    Token(String),
    Password {
        username: String,
        password: String,
        app_id: String,
        app_secret: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    pub vk_auth: VkAuthConfig,
    pub vk_api_version: String,

    // Collector
    /// Rolling window; wall items older than `now - collect_period` end a page scan.
    pub collect_period: chrono::Duration,
    pub page_stride: u64,
    pub request_delay: Duration,
    pub cursor_dir: PathBuf,

    // Pipeline
    pub notify_duplicate_period: chrono::Duration,
    /// Notes older than this are removed by the prune sweep.
    pub note_max_age: chrono::Duration,

    // Enrichment
    /// `None` keeps every resolved user for the life of the process.
    pub user_cache_capacity: Option<usize>,
}

impl Config {
    pub fn from_env() -> Result<Self, WallScoutError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WallScoutError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vk_auth = match lookup("VK_ACCESS_TOKEN").filter(|t| !t.is_empty()) {
            Some(token) => VkAuthConfig::Token(token),
            None => VkAuthConfig::Password {
                username: required(&lookup, "VK_USERNAME")?,
                password: required(&lookup, "VK_PASSWORD")?,
                app_id: required(&lookup, "VK_APP_ID")?,
                app_secret: required(&lookup, "VK_APP_SECRET")?,
            },
        };

        let collect_period_secs: i64 = parsed_or(&lookup, "COLLECT_PERIOD_SECS", 86_400)?;
        let notify_period_secs: i64 = parsed_or(&lookup, "NOTIFY_DUPLICATE_PERIOD_SECS", 86_400)?;
        let page_stride: u64 = parsed_or(&lookup, "PAGE_STRIDE", 10)?;
        let request_delay_ms: u64 = parsed_or(&lookup, "REQUEST_DELAY_MS", 200)?;
        let note_max_age_secs: i64 = parsed_or(&lookup, "NOTE_MAX_AGE_SECS", 604_800)?;

        if collect_period_secs <= 0 {
            return Err(WallScoutError::Config(
                "COLLECT_PERIOD_SECS must be positive".to_string(),
            ));
        }
        if notify_period_secs < 0 {
            return Err(WallScoutError::Config(
                "NOTIFY_DUPLICATE_PERIOD_SECS must not be negative".to_string(),
            ));
        }
        if note_max_age_secs <= 0 {
            return Err(WallScoutError::Config(
                "NOTE_MAX_AGE_SECS must be positive".to_string(),
            ));
        }
        if page_stride == 0 {
            return Err(WallScoutError::Config("PAGE_STRIDE must be > 0".to_string()));
        }

        let user_cache_capacity = match lookup("USER_CACHE_CAPACITY") {
            Some(raw) => Some(parse_value::<usize>("USER_CACHE_CAPACITY", &raw)?),
            None => None,
        };

        let collect_period = seconds("COLLECT_PERIOD_SECS", collect_period_secs)?;
        let notify_duplicate_period = seconds("NOTIFY_DUPLICATE_PERIOD_SECS", notify_period_secs)?;
        let note_max_age = seconds("NOTE_MAX_AGE_SECS", note_max_age_secs)?;

        Ok(Self {
            vk_auth,
            vk_api_version: lookup("VK_API_VERSION").unwrap_or_else(|| "5.64".to_string()),
            collect_period,
            page_stride,
            request_delay: Duration::from_millis(request_delay_ms),
            cursor_dir: lookup("CURSOR_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/cursors")),
            notify_duplicate_period,
            note_max_age,
            user_cache_capacity,
        })
    }

    /// Log the effective settings, secrets left out.
    pub fn log_redacted(&self) {
        let auth = match &self.vk_auth {
            VkAuthConfig::Token(_) => "token".to_string(),
            VkAuthConfig::Password { username, .. } => format!("password ({username})"),
        };
        info!(
            auth = %auth,
            api_version = %self.vk_api_version,
            collect_period_secs = self.collect_period.num_seconds(),
            notify_duplicate_period_secs = self.notify_duplicate_period.num_seconds(),
            page_stride = self.page_stride,
            request_delay_ms = self.request_delay.as_millis() as u64,
            cursor_dir = %self.cursor_dir.display(),
            note_max_age_secs = self.note_max_age.num_seconds(),
            user_cache_capacity = ?self.user_cache_capacity,
            "Configuration loaded"
        );
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, WallScoutError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WallScoutError::Config(format!("{key} environment variable is required")))
}

fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, WallScoutError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn seconds(key: &str, secs: i64) -> Result<chrono::Duration, WallScoutError> {
    chrono::Duration::try_seconds(secs)
        .ok_or_else(|| WallScoutError::Config(format!("{key} is out of range: {secs}")))
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, WallScoutError> {
    raw.trim()
        .parse()
        .map_err(|_| WallScoutError::Config(format!("{key} must be a number, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn token_config_uses_defaults() {
        let config = Config::from_lookup(lookup(&[("VK_ACCESS_TOKEN", "abc")])).unwrap();

        assert!(matches!(config.vk_auth, VkAuthConfig::Token(ref t) if t == "abc"));
        assert_eq!(config.collect_period, chrono::Duration::days(1));
        assert_eq!(config.notify_duplicate_period, chrono::Duration::days(1));
        assert_eq!(config.page_stride, 10);
        assert_eq!(config.request_delay, Duration::from_millis(200));
        assert_eq!(config.cursor_dir, PathBuf::from("data/cursors"));
        assert_eq!(config.note_max_age, chrono::Duration::days(7));
        assert_eq!(config.user_cache_capacity, None);
    }

    #[test]
    fn password_config_requires_all_credentials() {
        let err = Config::from_lookup(lookup(&[("VK_USERNAME", "u"), ("VK_PASSWORD", "p")]))
            .err()
            .unwrap();
        assert!(matches!(err, WallScoutError::Config(msg) if msg.contains("VK_APP_ID")));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("VK_ACCESS_TOKEN", "abc"),
            ("COLLECT_PERIOD_SECS", "3600"),
            ("PAGE_STRIDE", "20"),
            ("REQUEST_DELAY_MS", "0"),
            ("USER_CACHE_CAPACITY", "500"),
        ]))
        .unwrap();

        assert_eq!(config.collect_period, chrono::Duration::hours(1));
        assert_eq!(config.page_stride, 20);
        assert!(config.request_delay.is_zero());
        assert_eq!(config.user_cache_capacity, Some(500));
    }

    #[test]
    fn out_of_range_periods_are_config_errors() {
        for key in ["COLLECT_PERIOD_SECS", "NOTIFY_DUPLICATE_PERIOD_SECS", "NOTE_MAX_AGE_SECS"] {
            let err = Config::from_lookup(lookup(&[
                ("VK_ACCESS_TOKEN", "abc"),
                (key, "10000000000000000"),
            ]))
            .err()
            .unwrap();
            assert!(matches!(err, WallScoutError::Config(ref msg) if msg.contains(key)), "{key}: {err}");
        }
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let err = Config::from_lookup(lookup(&[
            ("VK_ACCESS_TOKEN", "abc"),
            ("PAGE_STRIDE", "ten"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, WallScoutError::Config(msg) if msg.contains("PAGE_STRIDE")));

        let err = Config::from_lookup(lookup(&[("VK_ACCESS_TOKEN", "abc"), ("PAGE_STRIDE", "0")]))
            .err()
            .unwrap();
        assert!(matches!(err, WallScoutError::Config(_)));
    }
}
