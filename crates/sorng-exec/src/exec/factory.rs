// ── Connection factory ──────────────────────────────────────────────────────

use crate::exec::auth::{load_private_key, AuthMethod};
use crate::exec::config::DialConfig;
use crate::exec::error::{ExecError, ExecResult};
use crate::exec::local::LocalConnection;
use crate::exec::remote::RemoteConnection;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Dial `addr` and authenticate with a password (keyboard-interactive fallback).
pub async fn remote_with_password(
    username: &str,
    password: &str,
    addr: &str,
    config: &DialConfig,
) -> ExecResult<RemoteConnection> {
    let auth = AuthMethod::Password(SecretString::new(password.to_string()));
    RemoteConnection::dial(username, auth, addr, config).await
}

/// Dial `addr` and authenticate with the private key stored at `key_path`.
pub async fn remote_with_key(
    username: &str,
    key_path: impl AsRef<Path>,
    addr: &str,
    config: &DialConfig,
) -> ExecResult<RemoteConnection> {
    let key = load_private_key(key_path.as_ref())?;
    RemoteConnection::dial(username, AuthMethod::PrivateKey(key), addr, config).await
}

/// Dial `addr` as the configured default user with the default key
/// (`root` and `~/.ssh/id_rsa` unless overridden).
pub async fn remote_default(addr: &str, config: &DialConfig) -> ExecResult<RemoteConnection> {
    let key_path = config.resolved_default_key_path().ok_or_else(|| {
        ExecError::key_read("cannot locate the default key: no home directory")
    })?;
    remote_with_key(&config.default_username, key_path, addr, config).await
}

pub fn local() -> LocalConnection {
    LocalConnection::new()
}

pub fn local_at(addr: impl Into<String>) -> LocalConnection {
    LocalConnection::at(addr)
}

/// How to authenticate against a remote host.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Credentials {
    Password { username: String, password: String },
    KeyFile { username: String, path: PathBuf },
    /// Configured default user and key.
    Default,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credentials::KeyFile { username, path } => f
                .debug_struct("KeyFile")
                .field("username", username)
                .field("path", path)
                .finish(),
            Credentials::Default => f.write_str("Default"),
        }
    }
}

/// Dial `addr` with whichever factory matches `credentials`.
pub async fn remote(
    credentials: &Credentials,
    addr: &str,
    config: &DialConfig,
) -> ExecResult<RemoteConnection> {
    match credentials {
        Credentials::Password { username, password } => {
            remote_with_password(username, password, addr, config).await
        }
        Credentials::KeyFile { username, path } => {
            remote_with_key(username, path, addr, config).await
        }
        Credentials::Default => remote_default(addr, config).await,
    }
}
