//! multiping - a concurrent ICMP echo probing engine.
//!
//! Measures round-trip latency and packet loss to a set of hosts in one
//! measurement round per [`PingEngine::send`] call: one echo request per
//! host, one raw socket per address family, a single readiness wait
//! multiplexing all of them until every host answered or the timeout passed.
//! Raw ICMP sockets need CAP_NET_RAW (or root).
//!
//! ```no_run
//! use multiping::{InfoField, PingEngine};
//!
//! # fn main() -> multiping::PingResult<()> {
//! let mut engine = PingEngine::new();
//! engine.add_host("localhost")?;
//! let replies = engine.send()?;
//! for host in engine.iter() {
//!     match host.latency() {
//!         Some(rtt) => println!("{}: {rtt:?}", host.hostname()),
//!         None => println!("{}: no reply ({} dropped)", host.hostname(), host.dropped()),
//!     }
//! }
//! # Ok(()) }
//! ```

#![warn(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub use engine::PingEngine;
pub use error::{PingError, PingResult};
pub use icmp::Family;
pub use iter::{HostInfo, InfoField, InfoValue, ResultIter};
pub use options::{
    AddressFamily, OptionValue, PingOption, DEFAULT_FAMILY, DEFAULT_PAYLOAD_LEN, DEFAULT_TIMEOUT,
    DEFAULT_TTL,
};

mod engine;
mod error;
mod host;
mod icmp;
mod iter;
mod options;
mod transport;
