//! Execution / transfer error type.

use serde::{Deserialize, Serialize};
use sorng_core::AddrError;

/// Categorised execution error.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("[exec {kind:?}] {message}")]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub message: String,
    /// Exit code of the command that triggered the error, if any.
    pub exit_code: Option<i32>,
    /// Output captured before the failure, when a session produced some.
    pub output: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecErrorKind {
    /// TCP connect / DNS failure.
    ConnectionFailed,
    /// SSH handshake or algorithm negotiation failure.
    HandshakeFailed,
    /// Server host key did not pass the configured policy.
    HostKeyRejected,
    /// Every authentication method was refused.
    AuthFailed,
    /// Private key file could not be read.
    KeyRead,
    /// Private key bytes could not be parsed.
    KeyParse,
    /// Exec channel / SFTP subsystem could not be opened.
    SessionFailed,
    /// Local process could not be started.
    SpawnFailed,
    /// Output pipe could not be attached.
    PipeFailed,
    /// Command finished with a non-zero status.
    NonZeroExit,
    /// Local or remote file I/O failure.
    Io,
    /// Permission string is not a base-8 number.
    InvalidMode,
    /// Address failed validation.
    InvalidAddress,
    /// Config could not be loaded.
    InvalidConfig,
    /// Cancelled through the caller's token.
    Cancelled,
    /// Operation not available for this connection or session.
    Unsupported,
    /// Catch-all.
    Unknown,
}

pub type ExecResult<T> = Result<T, ExecError>;

// ── Construction helpers ─────────────────────────────────────────────

impl ExecError {
    pub fn new(kind: ExecErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            exit_code: None,
            output: None,
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::ConnectionFailed, msg)
    }

    pub fn handshake_failed(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::HandshakeFailed, msg)
    }

    pub fn host_key_rejected(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::HostKeyRejected, msg)
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::AuthFailed, msg)
    }

    pub fn key_read(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::KeyRead, msg)
    }

    pub fn key_parse(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::KeyParse, msg)
    }

    pub fn session_failed(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::SessionFailed, msg)
    }

    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::SpawnFailed, msg)
    }

    pub fn pipe_failed(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::PipeFailed, msg)
    }

    pub fn non_zero_exit(code: i32) -> Self {
        Self::new(
            ExecErrorKind::NonZeroExit,
            format!("command exited with status {}", code),
        )
        .with_exit_code(code)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::Io, msg)
    }

    pub fn invalid_mode(mode: &str) -> Self {
        Self::new(
            ExecErrorKind::InvalidMode,
            format!("'{}' is not an octal permission mode", mode),
        )
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::InvalidConfig, msg)
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::Cancelled, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::Unsupported, msg)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ExecErrorKind::Cancelled
    }
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<ssh2::Error> for ExecError {
    fn from(e: ssh2::Error) -> Self {
        Self::session_failed(format!("ssh: {}", e))
    }
}

impl From<AddrError> for ExecError {
    fn from(e: AddrError) -> Self {
        Self::new(ExecErrorKind::InvalidAddress, e.to_string())
    }
}

impl From<tokio::task::JoinError> for ExecError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            Self::cancelled("worker task was cancelled")
        } else {
            Self::new(ExecErrorKind::Unknown, format!("worker task panicked: {}", e))
        }
    }
}

impl From<ExecError> for String {
    fn from(e: ExecError) -> String {
        e.message
    }
}
