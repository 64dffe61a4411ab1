//! fieldsync configuration.
//!
//! Loaded from `~/.fieldsync/config.toml`; a missing file means defaults.
//! Two environment variables override the file, so a device can be pointed
//! elsewhere without editing it:
//!
//! 1. `FIELDSYNC_REMOTE_URL`: base URL of the remote authority
//! 2. `FIELDSYNC_TOKEN`: bearer token for it

use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs};

use serde::{Deserialize, Serialize};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// fieldsync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Base URL of the remote authority. Only needed to pull or push.
    pub remote_url: Option<String>,

    pub auth_token: Option<String>,

    /// Per-request timeout enforced by the transport.
    pub timeout_secs: u64,

    /// Where the device database lives. Defaults to `~/.fieldsync/`.
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_url: None,
            auth_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            data_dir: None,
        }
    }
}

impl Config {
    /// Load config from `~/.fieldsync/config.toml` plus environment
    /// overrides.
    pub fn load() -> Result<Self, String> {
        let mut config = match Self::path() {
            Some(path) => match fs::read_to_string(&path) {
                Ok(contents) => Self::from_toml(&contents)
                    .map_err(|e| format!("invalid config at {}: {e}", path.display()))?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
                Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
            },
            None => Self::default(),
        };
        config.apply_overrides(
            env::var("FIELDSYNC_REMOTE_URL").ok(),
            env::var("FIELDSYNC_TOKEN").ok(),
        );
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Non-empty values replace what the file said.
    fn apply_overrides(&mut self, remote_url: Option<String>, token: Option<String>) {
        if let Some(url) = remote_url.filter(|s| !s.is_empty()) {
            self.remote_url = Some(url);
        }
        if let Some(token) = token.filter(|s| !s.is_empty()) {
            self.auth_token = Some(token);
        }
    }

    /// The remote URL, or an explanation of how to set one.
    pub fn remote_url(&self) -> Result<&str, String> {
        self.remote_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                "no remote configured\n\
                 Set FIELDSYNC_REMOTE_URL or add to ~/.fieldsync/config.toml:\n\n\
                 remote-url = \"https://ops.example.com/api\""
                    .to_string()
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The data directory: configured, or `~/.fieldsync/`.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(crate::storage::Storage::default_root)
    }

    /// The config file path: `~/.fieldsync/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".fieldsync").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn reads_kebab_case_keys() {
        let config = Config::from_toml(
            r#"
            remote-url = "https://ops.example.com/api"
            auth-token = "s3cret"
            timeout-secs = 5
            data-dir = "/var/lib/fieldsync"
            "#,
        )
        .unwrap();

        assert_eq!(config.remote_url().unwrap(), "https://ops.example.com/api");
        assert_eq!(config.auth_token.as_deref(), Some("s3cret"));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.data_dir(), Some(PathBuf::from("/var/lib/fieldsync")));
    }

    #[test]
    fn missing_remote_explains_itself() {
        let err = Config::default().remote_url().unwrap_err();
        assert!(err.contains("FIELDSYNC_REMOTE_URL"));
    }

    #[test]
    fn overrides_win_unless_empty() {
        let mut config = Config::from_toml(r#"remote-url = "http://file""#).unwrap();

        config.apply_overrides(Some(String::new()), Some("tok".into()));
        assert_eq!(config.remote_url().unwrap(), "http://file");
        assert_eq!(config.auth_token.as_deref(), Some("tok"));

        config.apply_overrides(Some("http://env".into()), None);
        assert_eq!(config.remote_url().unwrap(), "http://env");
    }
}
