//! ICMP echo wire format, one submodule per address family.
//!
//! The two families differ in header type values, checksum coverage (ICMPv6
//! includes a pseudo-header with the source and destination addresses) and
//! in what the raw delivery path hands us (IPv4 arrives with its IP header
//! still attached, ICMPv6 arrives bare). The [`Family`] tag is picked once
//! per socket and dispatched here, not re-decided per packet.

use crate::error::PingResult;
use std::net::{IpAddr, Ipv6Addr};

mod sequence_number;
mod ttl;
pub(crate) mod v4;
pub(crate) mod v6;

pub(crate) use sequence_number::SequenceNumber;
pub(crate) use ttl::Ttl;

/// Concrete address family of a resolved host and its socket.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub(crate) fn of(addr: &IpAddr) -> Family {
        match addr {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

/// A validated inbound echo reply. `ttl` is present only when the network
/// header carrying it was part of the datagram (IPv4); for IPv6 the hop
/// limit travels as socket control data and is supplied by the transport.
#[derive(Debug)]
pub(crate) struct EchoReply {
    pub ident: u16,
    pub sequence: SequenceNumber,
    pub payload: Vec<u8>,
    pub ttl: Option<Ttl>,
}

/// Source and destination of an ICMPv6 exchange, for pseudo-header checksums.
pub(crate) type PseudoHeader = (Ipv6Addr, Ipv6Addr);

pub(crate) fn encode_echo_request(
    family: Family,
    ident: u16,
    sequence: SequenceNumber,
    payload: &[u8],
    pseudo: Option<PseudoHeader>,
) -> PingResult<Vec<u8>> {
    match family {
        Family::V4 => v4::encode(ident, sequence, payload),
        Family::V6 => v6::encode(ident, sequence, payload, pseudo),
    }
}

pub(crate) fn decode_echo_reply(
    family: Family,
    bytes: &[u8],
    pseudo: Option<PseudoHeader>,
) -> PingResult<EchoReply> {
    match family {
        Family::V4 => v4::decode(bytes),
        Family::V6 => v6::decode(bytes, pseudo),
    }
}
