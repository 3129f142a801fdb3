//! Client configuration
//!
//! Read from `~/.ctrack/config.toml` (or `config.<profile>.toml`), then
//! overridden by `CTRACK_API_URL` and `CTRACK_API_KEY`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/v1";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default max retries
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between retries; doubled on every attempt
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Environment variable overriding the base URL
pub const ENV_API_URL: &str = "CTRACK_API_URL";

/// Environment variable overriding the API key
pub const ENV_API_KEY: &str = "CTRACK_API_KEY";

/// Configuration for the backend client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// On-disk shape of the config file
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl ClientConfig {
    /// Load a profile, falling back to defaults when no file exists
    pub fn load(profile: Option<&str>) -> Result<Self> {
        let path = Self::config_path(profile)?;
        let config = Self::load_from(&path)?.with_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load one file without environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let file: FileConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid {}: {e}", path.display())))?;
        Ok(Self::default().merge(file))
    }

    fn merge(mut self, file: FileConfig) -> Self {
        if let Some(url) = file.api_url {
            self.base_url = url;
        }
        if let Some(key) = file.api_key {
            self.api_key = key;
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = file.max_retries {
            self.max_retries = retries;
        }
        if let Some(ms) = file.retry_delay_ms {
            self.retry_delay = Duration::from_millis(ms);
        }
        self
    }

    /// Apply `CTRACK_API_URL` / `CTRACK_API_KEY` from `lookup`
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.api_key = key;
        }
        self
    }

    /// Reject base URLs that cannot carry path segments
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)?;
        if url.cannot_be_a_base() {
            return Err(Error::Config(format!("{} cannot be used as a base URL", self.base_url)));
        }
        Ok(())
    }

    fn config_path(profile: Option<&str>) -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| Error::Config("cannot find home directory".into()))?;
        let filename = match profile {
            Some(p) => format!("config.{p}.toml"),
            None => "config.toml".to_string(),
        };
        Ok(home.join(".ctrack").join(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_file_values_and_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.staging.toml");
        fs::write(
            &path,
            r#"
api_url = "https://tracker.example.com/api/v1"
api_key = "from-file"
max_retries = 5
retry_delay_ms = 250
"#,
        )
        .unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.base_url, "https://tracker.example.com/api/v1");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);

        let env: HashMap<&str, &str> = [(ENV_API_KEY, "from-env"), (ENV_API_URL, " ")].into_iter().collect();
        let config = config.with_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.base_url, "https://tracker.example.com/api/v1");
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_file_and_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_retries = \"many\"").unwrap();
        assert!(matches!(ClientConfig::load_from(&path), Err(Error::Config(_))));

        let config = ClientConfig {
            base_url: "mailto:ops@example.com".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
