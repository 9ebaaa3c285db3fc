//! Configuration loading for the feed client.
//!
//! Read from a TOML file named by `--config <path>` or `FEEDCACHE_CONFIG`.
//! `api_base_url` and `request_timeout_ms` are required; everything else
//! has a default matching the web client's behavior.

use std::path::{Path, PathBuf};
use std::time::Duration;

use feedcache_storage::CacheConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    #[serde(default = "default_posts_page_size")]
    pub posts_page_size: u32,
    #[serde(default = "default_comments_page_size")]
    pub comments_page_size: u32,
    #[serde(default)]
    pub cache: CacheSection,
    /// Session directory for the LMDB store. In-memory when absent.
    #[serde(default)]
    pub session_dir: Option<PathBuf>,
    #[serde(default = "default_session_max_size_mb")]
    pub session_max_size_mb: usize,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_comments_ttl_secs")]
    pub comments_ttl_secs: u64,
    #[serde(default = "default_prefetch_delay_ms")]
    pub prefetch_delay_ms: u64,
    #[serde(default = "default_true")]
    pub prefetch_enabled: bool,
    #[serde(default)]
    pub namespace: String,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            comments_ttl_secs: default_comments_ttl_secs(),
            prefetch_delay_ms: default_prefetch_delay_ms(),
            prefetch_enabled: true,
            namespace: String::new(),
        }
    }
}

impl CacheSection {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_ttl(Duration::from_secs(self.ttl_secs))
            .with_comments_ttl(Duration::from_secs(self.comments_ttl_secs))
            .with_prefetch_delay(Duration::from_millis(self.prefetch_delay_ms))
            .with_prefetch(self.prefetch_enabled)
            .with_namespace(self.namespace.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `FEEDCACHE_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_posts_page_size() -> u32 {
    9
}

fn default_comments_page_size() -> u32 {
    10
}

fn default_session_max_size_mb() -> usize {
    64
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_comments_ttl_secs() -> u64 {
    30
}

fn default_prefetch_delay_ms() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or FEEDCACHE_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults for everything but the backend address.
    pub fn for_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            request_timeout_ms: 10_000,
            posts_page_size: default_posts_page_size(),
            comments_page_size: default_comments_page_size(),
            cache: CacheSection::default(),
            session_dir: None,
            session_max_size_mb: default_session_max_size_mb(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.posts_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "posts_page_size",
                reason: "must be > 0".to_string(),
            });
        }
        if self.comments_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "comments_page_size",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.ttl_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.comments_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.comments_ttl_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.namespace.contains('|') {
            return Err(ConfigError::InvalidValue {
                field: "cache.namespace",
                reason: "must not contain '|'".to_string(),
            });
        }
        if let Some(dir) = &self.session_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "session_dir",
                    reason: "must not be empty when set".to_string(),
                });
            }
            if self.session_max_size_mb == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "session_max_size_mb",
                    reason: "must be > 0".to_string(),
                });
            }
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("FEEDCACHE_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
api_base_url = "http://localhost:8080"
request_timeout_ms = 5000
posts_page_size = 12
comments_page_size = 20
session_dir = "/tmp/feedcache-session"

[cache]
ttl_secs = 120
comments_ttl_secs = 15
prefetch_delay_ms = 100
prefetch_enabled = false
namespace = "s1:"

[logging]
filter = "feedcache_storage=debug,info"
json = true
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ClientConfig::from_toml(
            "api_base_url = \"https://feed.example.com\"\nrequest_timeout_ms = 3000\n",
        )
        .unwrap();
        assert_eq!(config.posts_page_size, 9);
        assert_eq!(config.comments_page_size, 10);
        assert!(config.session_dir.is_none());
        assert_eq!(config.logging.filter, "info");

        let cache = config.cache.to_cache_config();
        assert_eq!(cache.default_ttl, Duration::from_secs(60));
        assert_eq!(cache.comments_ttl, Duration::from_secs(30));
        assert_eq!(cache.prefetch_delay, Duration::from_millis(300));
        assert!(cache.prefetch_enabled);
    }

    #[test]
    fn test_full_config() {
        let config = ClientConfig::from_toml(FULL).unwrap();
        assert_eq!(config.posts_page_size, 12);
        assert_eq!(config.session_dir, Some(PathBuf::from("/tmp/feedcache-session")));
        assert!(config.logging.json);

        let cache = config.cache.to_cache_config();
        assert_eq!(cache.default_ttl, Duration::from_secs(120));
        assert!(!cache.prefetch_enabled);
        assert_eq!(cache.namespace, "s1:");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ClientConfig::from_toml(
            "api_base_url = \"http://x\"\nrequest_timeout_ms = 1\nretries = 3\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let err = ClientConfig::from_toml("api_base_url = \"http://x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            ("api_base_url = \"\"\nrequest_timeout_ms = 1\n", "api_base_url"),
            ("api_base_url = \"ftp://x\"\nrequest_timeout_ms = 1\n", "api_base_url"),
            ("api_base_url = \"http://x\"\nrequest_timeout_ms = 0\n", "request_timeout_ms"),
            (
                "api_base_url = \"http://x\"\nrequest_timeout_ms = 1\nposts_page_size = 0\n",
                "posts_page_size",
            ),
            (
                "api_base_url = \"http://x\"\nrequest_timeout_ms = 1\n[cache]\nttl_secs = 0\n",
                "cache.ttl_secs",
            ),
            (
                "api_base_url = \"http://x\"\nrequest_timeout_ms = 1\n[cache]\nnamespace = \"a|b\"\n",
                "cache.namespace",
            ),
        ];
        for (toml, expected) in cases {
            match ClientConfig::from_toml(toml) {
                Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected invalid {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedcache.toml");
        std::fs::write(&path, FULL).unwrap();
        let config = ClientConfig::from_path(&path).unwrap();
        assert_eq!(config.api_base_url, "http://localhost:8080");

        let missing = ClientConfig::from_path(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
