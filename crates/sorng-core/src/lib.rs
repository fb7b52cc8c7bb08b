//! # SortOfRemote NG – Core
//!
//! Shared, stateless helpers used by the execution crates:
//!   • `host:port` validation and normalisation
//!   • IPv4 / IPv6 classification
//!   • local-host detection against the machine's enabled interfaces

pub mod addr;
pub mod error;
pub mod ip;

pub use addr::{
    host_of, normalize_address, port_of, ADDR_SEPARATOR, DEFAULT_SSH_PORT, LOCALHOST,
};
pub use error::AddrError;
pub use ip::{
    classify_ip, is_ipv4, is_ipv6, is_local_ip, up_ipv4_interfaces, v4_address, IpFamily,
    LocalInterface,
};
