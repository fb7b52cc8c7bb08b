// ── sorng-exec / exec module ─────────────────────────────────────────────────
//
// Dual-context command execution and file copy:
//   • Local connections backed by `sh -c` subprocesses
//   • Remote connections over libssh2 (exec channels + SFTP)
//   • Shared execute / copy layer over any connection
//   • Monitored copies feeding a progress channel and a text progress bar
//   • Password / key / default-key connection factories

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod factory;
pub mod local;
mod monitor;
pub mod progress;
pub mod remote;
pub mod session;
mod transfer;
pub mod types;

pub use auth::{load_private_key, parse_private_key, AuthMethod, PrivateKeyPem};
pub use config::{DialConfig, HostKeyPolicy, DEFAULT_CIPHERS, DEFAULT_USERNAME};
pub use connection::{Connection, ConnectionExt};
pub use error::{ExecError, ExecErrorKind, ExecResult};
pub use factory::{
    local, local_at, remote, remote_default, remote_with_key, remote_with_password, Credentials,
};
pub use local::{LocalConnection, LocalSession};
pub use progress::ProgressBar;
pub use remote::{RemoteConnection, RemoteSession};
pub use session::Session;
pub use transfer::shell_escape;
pub use types::*;
