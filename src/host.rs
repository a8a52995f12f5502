use crate::error::{PingError, PingResult};
use crate::icmp::{Family, SequenceNumber, Ttl};
use crate::options::AddressFamily;
use std::net::IpAddr;
use std::time::Duration;

/// The outcome of one measurement round for one host.
///
/// Created when the round's request goes out and completed only on a
/// verified match (identifier, sequence and source address all agree), so an
/// absent latency means "no reply", never zero.
#[derive(Clone, Debug)]
pub(crate) struct RoundResult {
    pub sequence: SequenceNumber,
    pub ident: u16,
    pub latency: Option<Duration>,
    pub recv_ttl: Option<Ttl>,
    /// Payload echoed back by the peer.
    pub data: Vec<u8>,
}

impl RoundResult {
    pub(crate) fn pending(sequence: SequenceNumber, ident: u16) -> Self {
        RoundResult {
            sequence,
            ident,
            latency: None,
            recv_ttl: None,
            data: Vec::new(),
        }
    }
}

/// One registered probe target.
#[derive(Clone, Debug)]
pub(crate) struct Host {
    /// The identifier exactly as the caller gave it.
    pub hostname: String,
    /// Opaque caller-attached tag, echoed back unmodified. Defaults to the
    /// hostname.
    pub username: String,
    pub addr: IpAddr,
    pub family: Family,
    /// Echo identifier used for this host's probes, unique within the engine.
    pub ident: u16,
    /// Sequence number the next round will use.
    pub sequence: SequenceNumber,
    /// Cumulative count of rounds without a matching reply. Monotonic.
    pub dropped: u32,
    pub result: Option<RoundResult>,
}

impl Host {
    fn new(hostname: &str, addr: IpAddr, ident: u16) -> Self {
        Host {
            hostname: hostname.to_string(),
            username: hostname.to_string(),
            addr,
            family: Family::of(&addr),
            ident,
            sequence: SequenceNumber::start_value(),
            dropped: 0,
            result: None,
        }
    }
}

/// Insertion-ordered set of probe targets. The order is stable across
/// rounds; removing a host does not reorder the rest.
#[derive(Default)]
pub(crate) struct HostRegistry {
    hosts: Vec<Host>,
}

impl HostRegistry {
    /// Registers a host, resolving it immediately under the given
    /// address-family preference.
    pub(crate) fn add(
        &mut self,
        hostname: &str,
        family: AddressFamily,
        ident: u16,
    ) -> PingResult<()> {
        if self.hosts.iter().any(|h| h.hostname == hostname) {
            return Err(PingError::DuplicateHost(hostname.to_string()));
        }
        let addr = resolve(hostname, family)?;
        tracing::debug!(host = hostname, %addr, ident, "registered host");
        self.hosts.push(Host::new(hostname, addr, ident));
        Ok(())
    }

    pub(crate) fn remove(&mut self, hostname: &str) -> PingResult<()> {
        let position = self
            .hosts
            .iter()
            .position(|h| h.hostname == hostname)
            .ok_or_else(|| PingError::UnknownHost(hostname.to_string()))?;
        self.hosts.remove(position);
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, hostname: &str) -> PingResult<&mut Host> {
        self.hosts
            .iter_mut()
            .find(|h| h.hostname == hostname)
            .ok_or_else(|| PingError::UnknownHost(hostname.to_string()))
    }

    pub(crate) fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub(crate) fn hosts_mut(&mut self) -> &mut [Host] {
        &mut self.hosts
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Families a round needs sockets for.
    pub(crate) fn families_in_use(&self) -> impl Iterator<Item = Family> + '_ {
        let v4 = self.hosts.iter().any(|h| h.family == Family::V4);
        let v6 = self.hosts.iter().any(|h| h.family == Family::V6);
        [(v4, Family::V4), (v6, Family::V6)]
            .into_iter()
            .filter_map(|(used, family)| used.then_some(family))
    }
}

fn resolve(hostname: &str, family: AddressFamily) -> PingResult<IpAddr> {
    // Literal addresses short-circuit the resolver but still honor the
    // family constraint.
    if let Ok(addr) = hostname.parse::<IpAddr>() {
        if !family.accepts(&addr) {
            return Err(PingError::ResolutionFailure {
                host: hostname.to_string(),
                reason: format!("literal address is not {family:?}"),
            });
        }
        return Ok(addr);
    }

    let addrs = dns_lookup::lookup_host(hostname).map_err(|e| PingError::ResolutionFailure {
        host: hostname.to_string(),
        reason: e.to_string(),
    })?;
    addrs
        .into_iter()
        .find(|addr| family.accepts(addr))
        .ok_or_else(|| PingError::ResolutionFailure {
            host: hostname.to_string(),
            reason: format!("no address for family constraint {family:?}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_ok(registry: &mut HostRegistry, host: &str, ident: u16) {
        registry.add(host, AddressFamily::Any, ident).unwrap();
    }

    #[test]
    fn add_literal_hosts_preserves_insertion_order() {
        let mut registry = HostRegistry::default();
        add_ok(&mut registry, "10.0.0.1", 1);
        add_ok(&mut registry, "10.0.0.2", 2);
        add_ok(&mut registry, "::1", 3);

        let names: Vec<&str> = registry.hosts().iter().map(|h| h.hostname.as_str()).collect();
        assert_eq!(vec!["10.0.0.1", "10.0.0.2", "::1"], names);
        assert_eq!(Family::V6, registry.hosts()[2].family);
    }

    #[test]
    fn duplicate_hosts_are_rejected() {
        let mut registry = HostRegistry::default();
        add_ok(&mut registry, "10.0.0.1", 1);
        let err = registry.add("10.0.0.1", AddressFamily::Any, 2).unwrap_err();
        assert!(matches!(err, PingError::DuplicateHost(_)));
        assert_eq!(1, registry.hosts().len());
    }

    #[test]
    fn removing_an_unknown_host_fails() {
        let mut registry = HostRegistry::default();
        let err = registry.remove("10.9.9.9").unwrap_err();
        assert!(matches!(err, PingError::UnknownHost(_)));
    }

    #[test]
    fn removal_keeps_remaining_order_and_readd_gets_fresh_counters() {
        let mut registry = HostRegistry::default();
        add_ok(&mut registry, "10.0.0.1", 1);
        add_ok(&mut registry, "10.0.0.2", 2);
        add_ok(&mut registry, "10.0.0.3", 3);

        registry.hosts_mut()[1].dropped = 9;
        registry.remove("10.0.0.2").unwrap();
        add_ok(&mut registry, "10.0.0.4", 4);

        let names: Vec<&str> = registry.hosts().iter().map(|h| h.hostname.as_str()).collect();
        assert_eq!(vec!["10.0.0.1", "10.0.0.3", "10.0.0.4"], names);
        assert_eq!(0, registry.hosts()[2].dropped);
        assert_eq!(SequenceNumber(0), registry.hosts()[2].sequence);
    }

    #[test]
    fn family_constraint_applies_to_literals() {
        let mut registry = HostRegistry::default();
        let err = registry.add("::1", AddressFamily::Inet, 1).unwrap_err();
        assert!(matches!(err, PingError::ResolutionFailure { .. }));
    }

    #[test]
    fn resolution_failure_surfaces_the_resolver_message() {
        let mut registry = HostRegistry::default();
        let err = registry
            .add("host.invalid.multiping.test", AddressFamily::Any, 1)
            .unwrap_err();
        match err {
            PingError::ResolutionFailure { host, reason } => {
                assert_eq!("host.invalid.multiping.test", host);
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn families_in_use_reports_each_family_once() {
        let mut registry = HostRegistry::default();
        add_ok(&mut registry, "10.0.0.1", 1);
        add_ok(&mut registry, "10.0.0.2", 2);
        add_ok(&mut registry, "::1", 3);
        let families: Vec<Family> = registry.families_in_use().collect();
        assert_eq!(vec![Family::V4, Family::V6], families);
    }
}
