use crate::icmp::Family;
use crate::options::PingOption;
use std::io;

pub type PingResult<T> = std::result::Result<T, PingError>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PingError {
    /// An option code that is not part of the closed option enumeration.
    #[error("unknown option code {0:#x}")]
    InvalidOption(i32),

    /// A value of the wrong type or outside the documented range for its option.
    #[error("invalid value for option {option:?}: {reason}")]
    InvalidValue { option: PingOption, reason: String },

    /// The resolver could not produce an address under the current
    /// address-family constraint. Carries the resolver's own message.
    #[error("cannot resolve {host}: {reason}")]
    ResolutionFailure { host: String, reason: String },

    #[error("host {0:?} is already registered")]
    DuplicateHost(String),

    #[error("host {0:?} is not registered")]
    UnknownHost(String),

    /// Raw ICMP sockets need CAP_NET_RAW (or root). Fatal to the engine instance.
    #[error("opening a raw ICMP socket requires elevated privileges")]
    PermissionDenied(#[source] io::Error),

    /// The platform has no raw ICMP support for this address family.
    #[error("no raw ICMP support for {0} on this platform")]
    UnsupportedFamily(Family),

    #[error("no hosts registered")]
    NoHostsRegistered,

    /// An inbound packet that is not a well-formed echo reply. Never surfaced
    /// by a round; the scheduler discards these silently.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Part of the two-phase sizing protocol, not a true failure: retry with
    /// a capacity of at least `required`.
    #[error("buffer too small, {required} bytes required")]
    BufferTooSmall { required: usize },

    #[error("unknown info field code {0}")]
    UnknownField(i32),

    #[error("I/O error")]
    Io(#[from] io::Error),
}

impl PingError {
    pub(crate) fn invalid_value(option: PingOption, reason: impl Into<String>) -> Self {
        PingError::InvalidValue {
            option,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        PingError::MalformedPacket(reason.into())
    }
}
