//! # dualexec
//!
//! One interface for running shell commands and copying files, on the local
//! machine or on a host reached over SSH.
//!
//! ```no_run
//! use dualexec::{connect, CancellationToken, Connection, ConnectionExt, Credentials, DialConfig};
//!
//! # async fn demo() -> dualexec::ExecResult<()> {
//! let creds = Credentials::Password { username: "deploy".into(), password: "secret".into() };
//! let mut conn = connect(&creds, "192.168.10.100", &DialConfig::default()).await?;
//! let out = conn.execute_shell(&CancellationToken::new(), "uname -a").await?;
//! println!("{}", out);
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod logging;

pub use sorng_core::{
    classify_ip, host_of, is_ipv4, is_ipv6, is_local_ip, normalize_address, port_of,
    up_ipv4_interfaces, AddrError, IpFamily, LocalInterface, DEFAULT_SSH_PORT, LOCALHOST,
};
pub use sorng_exec::*;
pub use tokio_util::sync::CancellationToken;

use log::info;

/// Open a connection to `addr`, choosing the execution context by target.
///
/// Addresses that resolve to this machine (loopback, `localhost`, or an IP
/// of an enabled local interface) get a [`LocalConnection`] and
/// `credentials` are not used. Anything else is dialed over SSH.
pub async fn connect(
    credentials: &Credentials,
    addr: &str,
    config: &DialConfig,
) -> ExecResult<Box<dyn Connection>> {
    let address = normalize_address(addr)?;
    if is_local_ip(host_of(&address)) {
        info!("{} is this machine; using a local connection", address);
        return Ok(Box::new(LocalConnection::at(address)));
    }
    let conn = sorng_exec::remote(credentials, &address, config).await?;
    Ok(Box::new(conn))
}
