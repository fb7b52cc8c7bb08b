//! Validation errors for connection addresses.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AddrError {
    #[error("connection address must not be empty")]
    Empty,
    #[error("invalid host '{0}': use 'localhost' or an IPv4 address")]
    InvalidHost(String),
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}
