use crate::error::{PingError, PingResult};
use crate::host::Host;
use crate::icmp::Family;
use std::net::IpAddr;
use std::time::Duration;

/// Per-host result fields, the retrieval surface of [`HostInfo::get_info`].
/// Each field carries a stable integer code for embedding layers.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InfoField {
    Hostname,
    Address,
    Family,
    Latency,
    Sequence,
    Ident,
    Data,
    Username,
    Dropped,
    RecvTtl,
}

impl InfoField {
    pub fn code(self) -> i32 {
        match self {
            InfoField::Hostname => 1,
            InfoField::Address => 2,
            InfoField::Family => 3,
            InfoField::Latency => 4,
            InfoField::Sequence => 5,
            InfoField::Ident => 6,
            InfoField::Data => 7,
            InfoField::Username => 8,
            InfoField::Dropped => 9,
            InfoField::RecvTtl => 10,
        }
    }

    pub fn from_code(code: i32) -> PingResult<Self> {
        match code {
            1 => Ok(InfoField::Hostname),
            2 => Ok(InfoField::Address),
            3 => Ok(InfoField::Family),
            4 => Ok(InfoField::Latency),
            5 => Ok(InfoField::Sequence),
            6 => Ok(InfoField::Ident),
            7 => Ok(InfoField::Data),
            8 => Ok(InfoField::Username),
            9 => Ok(InfoField::Dropped),
            10 => Ok(InfoField::RecvTtl),
            other => Err(PingError::UnknownField(other)),
        }
    }
}

/// A dynamically typed field value. Text and Bytes are variable-sized and
/// drive the two-phase capacity protocol; the scalar variants have fixed
/// required sizes.
#[derive(Clone, Debug, PartialEq)]
pub enum InfoValue {
    Text(String),
    Integer(i64),
    Seconds(f64),
    Counter(u32),
    Bytes(Vec<u8>),
}

/// Read-only view of one host's identity and latest round result.
pub struct HostInfo<'a> {
    host: &'a Host,
}

impl<'a> HostInfo<'a> {
    /// Two-phase sized retrieval. Callers pass a capacity hint; when it is
    /// smaller than the field's value the call fails with
    /// [`PingError::BufferTooSmall`] naming the required capacity, without
    /// producing partial data. Retrying with that capacity succeeds.
    ///
    /// Absent measurements use sentinels: latency −1.0, received TTL −1,
    /// sequence −1 before the first round.
    pub fn get_info(&self, field: InfoField, capacity: usize) -> PingResult<InfoValue> {
        let required = self.required_size(field);
        if capacity < required {
            return Err(PingError::BufferTooSmall { required });
        }
        Ok(self.value(field))
    }

    /// The capacity [`get_info`](Self::get_info) needs for this field.
    pub fn required_size(&self, field: InfoField) -> usize {
        match field {
            InfoField::Hostname => self.host.hostname.len(),
            InfoField::Address => self.host.addr.to_string().len(),
            InfoField::Username => self.host.username.len(),
            InfoField::Data => self.host.result.as_ref().map_or(0, |r| r.data.len()),
            InfoField::Family | InfoField::Sequence | InfoField::Ident | InfoField::RecvTtl => {
                std::mem::size_of::<i64>()
            }
            InfoField::Latency => std::mem::size_of::<f64>(),
            InfoField::Dropped => std::mem::size_of::<u32>(),
        }
    }

    fn value(&self, field: InfoField) -> InfoValue {
        let result = self.host.result.as_ref();
        match field {
            InfoField::Hostname => InfoValue::Text(self.host.hostname.clone()),
            InfoField::Address => InfoValue::Text(self.host.addr.to_string()),
            InfoField::Username => InfoValue::Text(self.host.username.clone()),
            InfoField::Family => InfoValue::Integer(match self.host.family {
                Family::V4 => i64::from(libc::AF_INET),
                Family::V6 => i64::from(libc::AF_INET6),
            }),
            InfoField::Latency => InfoValue::Seconds(
                self.latency().map_or(-1.0, |d| d.as_secs_f64()),
            ),
            InfoField::Sequence => InfoValue::Integer(
                result.map_or(-1, |r| i64::from(u16::from(r.sequence))),
            ),
            InfoField::Ident => InfoValue::Integer(i64::from(self.host.ident)),
            InfoField::Data => {
                InfoValue::Bytes(result.map(|r| r.data.clone()).unwrap_or_default())
            }
            InfoField::Dropped => InfoValue::Counter(self.host.dropped),
            InfoField::RecvTtl => InfoValue::Integer(
                result
                    .and_then(|r| r.recv_ttl)
                    .map_or(-1, |ttl| i64::from(u8::from(ttl))),
            ),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.host.hostname
    }

    pub fn address(&self) -> IpAddr {
        self.host.addr
    }

    pub fn family(&self) -> Family {
        self.host.family
    }

    pub fn username(&self) -> &str {
        &self.host.username
    }

    pub fn ident(&self) -> u16 {
        self.host.ident
    }

    /// Round-trip time of the latest round, absent when no verified reply
    /// arrived before the deadline.
    pub fn latency(&self) -> Option<Duration> {
        self.host.result.as_ref().and_then(|r| r.latency)
    }

    /// Sequence number the latest round used; `None` before the first round.
    pub fn sequence(&self) -> Option<u16> {
        self.host.result.as_ref().map(|r| r.sequence.into())
    }

    /// TTL / hop limit observed on the latest reply.
    pub fn recv_ttl(&self) -> Option<u8> {
        self.host
            .result
            .as_ref()
            .and_then(|r| r.recv_ttl)
            .map(u8::from)
    }

    /// Payload echoed by the peer in the latest reply.
    pub fn data(&self) -> &[u8] {
        self.host.result.as_ref().map_or(&[], |r| r.data.as_slice())
    }

    /// Cumulative count of rounds without a reply.
    pub fn dropped(&self) -> u32 {
        self.host.dropped
    }
}

/// Restartable cursor over the registry in insertion order. The shared
/// borrow of the engine keeps the registry stable for the cursor's
/// lifetime, so there is no way to observe a half-mutated host set.
pub struct ResultIter<'a> {
    hosts: &'a [Host],
    position: usize,
}

impl<'a> ResultIter<'a> {
    pub(crate) fn new(hosts: &'a [Host]) -> Self {
        ResultIter { hosts, position: 0 }
    }

    /// Restarts the cursor at the first host.
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl<'a> Iterator for ResultIter<'a> {
    type Item = HostInfo<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let host = self.hosts.get(self.position)?;
        self.position += 1;
        Some(HostInfo { host })
    }
}
