// ── Types ─────────────────────────────────────────────────────────────────────

use crate::exec::error::{ExecError, ExecResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::time::Duration;

/// Address reported by local connections. It is never dialed.
pub const DEFAULT_LOCAL_ADDRESS: &str = "127.0.0.1:22";

/// Destination-size sampling period of monitored copies.
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

/// Buffer size of the byte pump.
pub const COPY_CHUNK_SIZE: usize = 32 * 1024;

/// Blocking byte source handed to a copy.
pub type ByteSource = Box<dyn Read + Send>;

/// Blocking byte sink opened on one side of a connection.
pub type ByteSink = Box<dyn Write + Send>;

/// Receives stdout one line at a time (without the trailing newline).
pub type LineConsumer = Box<dyn FnMut(String) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionKind {
    Local,
    Remote,
}

/// Unix permission bits parsed from an octal string such as `"0755"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMode(u32);

impl FileMode {
    pub const fn new(bits: u32) -> Self {
        FileMode(bits)
    }

    /// Parse a base-8 permission string into 32 bits.
    pub fn parse(mode: &str) -> ExecResult<Self> {
        let digits = mode.trim();
        if digits.is_empty() {
            return Err(ExecError::invalid_mode(mode));
        }
        u32::from_str_radix(digits, 8)
            .map(FileMode)
            .map_err(|_| ExecError::invalid_mode(mode))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Permission bits only (`0o7777`), as handed to chmod-like calls.
    pub fn permissions(self) -> u32 {
        self.0 & 0o7777
    }
}

impl Default for FileMode {
    fn default() -> Self {
        FileMode(0o644)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl std::str::FromStr for FileMode {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileMode::parse(s)
    }
}
