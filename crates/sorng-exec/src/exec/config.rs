// ── Dial configuration ────────────────────────────────────────────────────────

use crate::exec::error::{ExecError, ExecResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Cipher preference applied to both directions of every remote dial.
pub const DEFAULT_CIPHERS: &[&str] = &[
    "aes128-ctr",
    "aes192-ctr",
    "aes256-ctr",
    "aes128-gcm@openssh.com",
    "arcfour256",
    "arcfour128",
    "aes128-cbc",
    "3des-cbc",
    "aes192-cbc",
    "aes256-cbc",
];

/// Username used by [`crate::exec::factory::remote_default`].
pub const DEFAULT_USERNAME: &str = "root";

/// Key used by [`crate::exec::factory::remote_default`], relative to the home directory.
pub const DEFAULT_KEY_RELATIVE_PATH: &str = ".ssh/id_rsa";

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_connect_timeout_secs() -> u64 {
    60
}
fn default_ciphers() -> Vec<String> {
    DEFAULT_CIPHERS.iter().map(|c| c.to_string()).collect()
}
fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

/// How the server host key is checked after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum HostKeyPolicy {
    /// Accept any host key without verification.
    #[default]
    AcceptAll,
    /// Require a matching entry in the known_hosts file.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialConfig {
    /// Timeout for connecting and authenticating.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_ciphers")]
    pub ciphers: Vec<String>,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    /// Defaults to `~/.ssh/known_hosts` when unset.
    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,
    /// 0 disables keepalives.
    #[serde(default)]
    pub keepalive_interval_secs: u32,
    #[serde(default)]
    pub compress: bool,
    #[serde(default = "default_username")]
    pub default_username: String,
    /// Defaults to `~/.ssh/id_rsa` when unset.
    #[serde(default)]
    pub default_key_path: Option<PathBuf>,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            ciphers: default_ciphers(),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
            keepalive_interval_secs: 0,
            compress: false,
            default_username: default_username(),
            default_key_path: None,
        }
    }
}

impl DialConfig {
    pub fn from_json_str(json: &str) -> ExecResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ExecError::invalid_config(format!("dial config: {}", e)))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ExecResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExecError::invalid_config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Comma-joined cipher list in the form libssh2 expects.
    pub fn cipher_pref(&self) -> String {
        self.ciphers.join(",")
    }

    pub fn resolved_known_hosts_path(&self) -> Option<PathBuf> {
        self.known_hosts_path
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts")))
    }

    pub fn resolved_default_key_path(&self) -> Option<PathBuf> {
        self.default_key_path
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join(DEFAULT_KEY_RELATIVE_PATH)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::error::ExecErrorKind;

    #[test]
    fn test_defaults() {
        let config = DialConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(60));
        assert_eq!(config.ciphers.len(), 10);
        assert_eq!(config.host_key_policy, HostKeyPolicy::AcceptAll);
        assert_eq!(config.default_username, "root");
        assert!(config.cipher_pref().starts_with("aes128-ctr,aes192-ctr,"));
        assert!(config.cipher_pref().ends_with(",aes256-cbc"));
    }

    #[test]
    fn test_empty_json_matches_default() {
        let config = DialConfig::from_json_str("{}").unwrap();
        assert_eq!(config.connect_timeout_secs, 60);
        assert_eq!(config.cipher_pref(), DialConfig::default().cipher_pref());
    }

    #[test]
    fn test_json_overrides() {
        let config = DialConfig::from_json_str(
            r#"{"connectTimeoutSecs": 5, "hostKeyPolicy": "strict", "ciphers": ["aes256-ctr"]}"#,
        )
        .unwrap();
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.host_key_policy, HostKeyPolicy::Strict);
        assert_eq!(config.cipher_pref(), "aes256-ctr");
    }

    #[test]
    fn test_bad_json_is_invalid_config() {
        let err = DialConfig::from_json_str("{\"hostKeyPolicy\": 3}").unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::InvalidConfig);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dial.json");
        std::fs::write(&path, r#"{"defaultUsername": "deploy"}"#).unwrap();
        let config = DialConfig::from_json_file(&path).unwrap();
        assert_eq!(config.default_username, "deploy");

        let missing = DialConfig::from_json_file(dir.path().join("nope.json"));
        assert!(missing.is_err());
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = DialConfig {
            default_key_path: Some(PathBuf::from("/keys/deploy")),
            known_hosts_path: Some(PathBuf::from("/etc/ssh/known")),
            ..Default::default()
        };
        assert_eq!(config.resolved_default_key_path(), Some(PathBuf::from("/keys/deploy")));
        assert_eq!(config.resolved_known_hosts_path(), Some(PathBuf::from("/etc/ssh/known")));
    }
}
