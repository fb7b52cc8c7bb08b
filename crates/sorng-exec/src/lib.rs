//! # SortOfRemote NG – Exec
//!
//! Run shell commands and copy files through one interface, whether the
//! target is the current machine (subprocesses) or a host reached over SSH
//! (exec channels, SFTP for file transfer).
//!
//! ## Features
//!
//! - **Connections**: [`LocalConnection`] and [`RemoteConnection`] behind the
//!   [`Connection`] trait; execution and copies come from [`ConnectionExt`]
//! - **Sessions**: one command per session, output captured or streamed line
//!   by line, cancellable through a `CancellationToken`
//! - **Monitored copies**: destination size reported on a progress channel
//!   while bytes are pumped, rendered by [`ProgressBar`]
//! - **Factories**: password, key file or default-key dialing with a
//!   serde-loadable [`DialConfig`]

pub mod exec;

pub use exec::*;
