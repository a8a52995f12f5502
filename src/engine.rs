//! The probing engine: one measurement round per [`PingEngine::send`] call.
//!
//! A round walks the registry in insertion order, emits one echo request per
//! host, then multiplexes the raw sockets until every probe is matched or
//! the deadline passes. All I/O is non-blocking; the only suspension point
//! is the readiness wait, bounded by the round timeout.

use crate::error::{PingError, PingResult};
use crate::host::{HostRegistry, RoundResult};
use crate::icmp::{self, Family, SequenceNumber};
use crate::iter::ResultIter;
use crate::options::{EngineOptions, OptionValue, PingOption};
use crate::transport::{RawTransport, Transport};
use rand::Rng;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// How long one blocked send may wait for its socket to drain.
const SEND_RETRY_WAIT: Duration = Duration::from_millis(100);

/// A request sent this round and not yet matched. Keyed externally by
/// (identifier, sequence, destination address); verified replies must agree
/// on all three.
struct OutstandingProbe {
    host_index: usize,
    sent_at: Instant,
}

type ProbeKey = (u16, SequenceNumber, IpAddr);

pub(crate) struct Engine<T> {
    options: EngineOptions,
    registry: HostRegistry,
    transport: T,
    /// Source of per-host echo identifiers. Engine-instance state, seeded
    /// randomly; never shared between instances.
    next_ident: u16,
}

impl<T: Transport> Engine<T> {
    pub(crate) fn with_transport(transport: T) -> Self {
        Engine {
            options: EngineOptions::default(),
            registry: HostRegistry::default(),
            transport,
            next_ident: rand::thread_rng().gen(),
        }
    }

    pub(crate) fn set_option(&mut self, option: PingOption, value: OptionValue) -> PingResult<()> {
        self.options.set(option, value)
    }

    pub(crate) fn option(&self, option: PingOption) -> OptionValue {
        self.options.get(option)
    }

    pub(crate) fn add_host(&mut self, hostname: &str) -> PingResult<()> {
        let ident = self.next_ident;
        self.registry.add(hostname, self.options.family, ident)?;
        self.next_ident = self.next_ident.wrapping_add(1);
        Ok(())
    }

    pub(crate) fn remove_host(&mut self, hostname: &str) -> PingResult<()> {
        self.registry.remove(hostname)
    }

    pub(crate) fn set_username(&mut self, hostname: &str, username: &str) -> PingResult<()> {
        self.registry.get_mut(hostname)?.username = username.to_string();
        Ok(())
    }

    pub(crate) fn iter(&self) -> ResultIter<'_> {
        ResultIter::new(self.registry.hosts())
    }

    /// Runs one round and returns the number of hosts that produced a
    /// verified reply.
    pub(crate) fn send(&mut self) -> PingResult<usize> {
        if self.registry.is_empty() {
            return Err(PingError::NoHostsRegistered);
        }

        // Frozen snapshot: a concurrent set_option between rounds can never
        // leave this round half-configured.
        let options = self.options.clone();

        let families: Vec<Family> = self.registry.families_in_use().collect();
        for family in families {
            self.transport.open(family, &options)?;
        }

        let outstanding = self.send_requests(&options);
        let replies = self.await_replies(outstanding, options.timeout)?;
        Ok(replies)
    }

    fn send_requests(&mut self, options: &EngineOptions) -> HashMap<ProbeKey, OutstandingProbe> {
        let mut outstanding = HashMap::new();
        let local_v6 = self.transport.local_v6();

        for index in 0..self.registry.hosts().len() {
            let (family, addr, ident, sequence) = {
                let host = &mut self.registry.hosts_mut()[index];
                let sequence = host.sequence.post_increment();
                host.result = Some(RoundResult::pending(sequence, host.ident));
                (host.family, host.addr, host.ident, sequence)
            };

            let pseudo = match (addr, local_v6) {
                (IpAddr::V6(destination), Some(source)) => Some((source, destination)),
                _ => None,
            };

            let sent = icmp::encode_echo_request(family, ident, sequence, &options.data, pseudo)
                .and_then(|packet| {
                    self.transmit(family, addr, &packet).map_err(PingError::Io)
                });
            match sent {
                Ok(()) => {
                    outstanding.insert(
                        (ident, sequence, addr),
                        OutstandingProbe {
                            host_index: index,
                            sent_at: Instant::now(),
                        },
                    );
                }
                Err(error) => {
                    // One host's send failure degrades to its dropped-round
                    // outcome; the rest of the round continues.
                    let host = &mut self.registry.hosts_mut()[index];
                    tracing::warn!(host = %host.hostname, %error, "send failed, round dropped for this host");
                    host.dropped += 1;
                }
            }
        }
        outstanding
    }

    fn transmit(&mut self, family: Family, dest: IpAddr, packet: &[u8]) -> io::Result<()> {
        match self.transport.send(family, dest, packet) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.transport.wait_writable(family, SEND_RETRY_WAIT)?;
                self.transport.send(family, dest, packet).map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }

    fn await_replies(
        &mut self,
        mut outstanding: HashMap<ProbeKey, OutstandingProbe>,
        timeout: Duration,
    ) -> PingResult<usize> {
        let deadline = Instant::now() + timeout;
        let mut replies = 0;

        while !outstanding.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let readable = self.transport.poll(deadline - now)?;
            for family in readable {
                while let Some(datagram) = self.transport.receive(family)? {
                    let received_at = Instant::now();
                    let reply = match icmp::decode_echo_reply(family, &datagram.bytes, None) {
                        Ok(reply) => reply,
                        Err(error) => {
                            tracing::debug!(source = %datagram.source, %error, "discarding packet");
                            continue;
                        }
                    };
                    let key = (reply.ident, reply.sequence, datagram.source);
                    let Some(probe) = outstanding.remove(&key) else {
                        // Duplicate, foreign or stale; not ours to report.
                        tracing::debug!(source = %datagram.source, "discarding unmatched echo reply");
                        continue;
                    };

                    let host = &mut self.registry.hosts_mut()[probe.host_index];
                    let latency = received_at.duration_since(probe.sent_at);
                    if let Some(result) = host.result.as_mut() {
                        result.latency = Some(latency);
                        result.recv_ttl = reply.ttl.or(datagram.recv_ttl);
                        result.data = reply.payload;
                    }
                    replies += 1;
                    tracing::trace!(host = %host.hostname, ?latency, "verified echo reply");
                }
            }
        }

        // Everything still outstanding has missed the deadline.
        for probe in outstanding.values() {
            self.registry.hosts_mut()[probe.host_index].dropped += 1;
        }
        Ok(replies)
    }
}

/// The public probing engine over raw ICMP sockets.
///
/// Configure via [`set_option`](Self::set_option), register hosts, then call
/// [`send`](Self::send) once per measurement round and read the outcome
/// through [`iter`](Self::iter). One engine instance runs one round at a
/// time on the calling thread and owns its sockets exclusively; independent
/// instances can probe concurrently.
pub struct PingEngine(Engine<RawTransport>);

impl PingEngine {
    pub fn new() -> Self {
        PingEngine(Engine::with_transport(RawTransport::new()))
    }

    /// Validates and stores an option. Takes effect on the next round.
    pub fn set_option(&mut self, option: PingOption, value: OptionValue) -> PingResult<()> {
        self.0.set_option(option, value)
    }

    /// The current value of an option, or its documented default.
    pub fn option(&self, option: PingOption) -> OptionValue {
        self.0.option(option)
    }

    /// Registers a host, resolving it immediately under the current
    /// address-family preference.
    pub fn add_host(&mut self, hostname: &str) -> PingResult<()> {
        self.0.add_host(hostname)
    }

    pub fn remove_host(&mut self, hostname: &str) -> PingResult<()> {
        self.0.remove_host(hostname)
    }

    /// Attaches an opaque tag to a host, echoed back by the USERNAME field.
    pub fn set_username(&mut self, hostname: &str, username: &str) -> PingResult<()> {
        self.0.set_username(hostname, username)
    }

    /// Runs one measurement round: one echo request per registered host,
    /// then waits until every host answered or the timeout passed. Returns
    /// the number of hosts with a verified reply.
    pub fn send(&mut self) -> PingResult<usize> {
        self.0.send()
    }

    /// A restartable cursor over the hosts in insertion order.
    pub fn iter(&self) -> ResultIter<'_> {
        self.0.iter()
    }
}

impl Default for PingEngine {
    fn default() -> Self {
        Self::new()
    }
}
