/// Hop count observed on a received reply: the IPv4 time-to-live or the
/// ICMPv6 hop limit. The two travel differently (IP header field for v4,
/// `IPV6_HOPLIMIT` control data for v6) but mean the same thing once
/// extracted, so one type covers both.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Ttl(pub u8);

impl From<u8> for Ttl {
    fn from(hops: u8) -> Self {
        Ttl(hops)
    }
}

impl From<Ttl> for u8 {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl std::fmt::Display for Ttl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
