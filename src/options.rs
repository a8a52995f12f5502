use crate::error::{PingError, PingResult};
use std::net::IpAddr;
use std::time::Duration;

/// Default round timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
/// Default time-to-live / hop limit for outbound echo requests.
pub const DEFAULT_TTL: u8 = 255;
/// Default address-family preference.
pub const DEFAULT_FAMILY: AddressFamily = AddressFamily::Any;
/// Length of the default payload fill pattern.
pub const DEFAULT_PAYLOAD_LEN: usize = 56;

/// The engine's configuration surface. A closed enumeration; each option
/// also carries a stable integer code so embedding layers can drive the
/// engine with numeric constants.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PingOption {
    Timeout,
    Ttl,
    AddressFamily,
    Data,
    Source,
    Device,
}

impl PingOption {
    pub fn code(self) -> i32 {
        match self {
            PingOption::Timeout => 0x01,
            PingOption::Ttl => 0x02,
            PingOption::AddressFamily => 0x04,
            PingOption::Data => 0x08,
            PingOption::Source => 0x10,
            PingOption::Device => 0x20,
        }
    }

    pub fn from_code(code: i32) -> PingResult<Self> {
        match code {
            0x01 => Ok(PingOption::Timeout),
            0x02 => Ok(PingOption::Ttl),
            0x04 => Ok(PingOption::AddressFamily),
            0x08 => Ok(PingOption::Data),
            0x10 => Ok(PingOption::Source),
            0x20 => Ok(PingOption::Device),
            other => Err(PingError::InvalidOption(other)),
        }
    }
}

/// Address-family preference for host resolution and socket selection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum AddressFamily {
    #[default]
    Any,
    Inet,
    Inet6,
}

impl AddressFamily {
    pub(crate) fn accepts(self, addr: &IpAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::Inet => addr.is_ipv4(),
            AddressFamily::Inet6 => addr.is_ipv6(),
        }
    }
}

/// A dynamically typed option value, the argument of [`PingEngine::set_option`]
/// and the return of [`PingEngine::option`].
///
/// [`PingEngine::set_option`]: crate::PingEngine::set_option
/// [`PingEngine::option`]: crate::PingEngine::option
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Seconds(f64),
    Integer(i64),
    Family(AddressFamily),
    Bytes(Vec<u8>),
    Text(String),
}

pub(crate) fn default_payload() -> Vec<u8> {
    // Fixed fill pattern, long enough for RTT-over-payload experiments to
    // have something to corrupt.
    (0..DEFAULT_PAYLOAD_LEN).map(|i| i as u8).collect()
}

/// The validated option set. Cloned into an immutable snapshot at the start
/// of every round; mutations only affect later rounds.
#[derive(Clone, Debug)]
pub(crate) struct EngineOptions {
    pub timeout: Duration,
    pub ttl: u8,
    pub family: AddressFamily,
    pub data: Vec<u8>,
    pub source: Option<IpAddr>,
    pub device: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            timeout: DEFAULT_TIMEOUT,
            ttl: DEFAULT_TTL,
            family: DEFAULT_FAMILY,
            data: default_payload(),
            source: None,
            device: None,
        }
    }
}

impl EngineOptions {
    pub(crate) fn set(&mut self, option: PingOption, value: OptionValue) -> PingResult<()> {
        match (option, value) {
            (PingOption::Timeout, OptionValue::Seconds(secs)) => {
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(PingError::invalid_value(option, "timeout must be a positive number of seconds"));
                }
                self.timeout = Duration::from_secs_f64(secs);
            }
            (PingOption::Ttl, OptionValue::Integer(ttl)) => {
                if !(1..=255).contains(&ttl) {
                    return Err(PingError::invalid_value(option, "TTL must be in 1..=255"));
                }
                self.ttl = ttl as u8;
            }
            (PingOption::AddressFamily, OptionValue::Family(family)) => {
                self.family = family;
            }
            (PingOption::Data, OptionValue::Bytes(bytes)) => {
                self.data = bytes;
            }
            (PingOption::Source, OptionValue::Text(text)) => {
                let addr = text.parse::<IpAddr>().map_err(|e| {
                    PingError::invalid_value(option, format!("{text:?} is not an address literal: {e}"))
                })?;
                self.source = Some(addr);
            }
            (PingOption::Device, OptionValue::Text(text)) => {
                if text.is_empty() {
                    return Err(PingError::invalid_value(option, "device name must not be empty"));
                }
                self.device = Some(text);
            }
            (option, value) => {
                return Err(PingError::invalid_value(
                    option,
                    format!("wrong value type {value:?}"),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn get(&self, option: PingOption) -> OptionValue {
        match option {
            PingOption::Timeout => OptionValue::Seconds(self.timeout.as_secs_f64()),
            PingOption::Ttl => OptionValue::Integer(i64::from(self.ttl)),
            PingOption::AddressFamily => OptionValue::Family(self.family),
            PingOption::Data => OptionValue::Bytes(self.data.clone()),
            PingOption::Source => OptionValue::Text(
                self.source.map(|a| a.to_string()).unwrap_or_default(),
            ),
            PingOption::Device => {
                OptionValue::Text(self.device.clone().unwrap_or_default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_documented_constants() {
        let opts = EngineOptions::default();
        assert_eq!(OptionValue::Seconds(1.0), opts.get(PingOption::Timeout));
        assert_eq!(OptionValue::Integer(255), opts.get(PingOption::Ttl));
        assert_eq!(OptionValue::Family(AddressFamily::Any), opts.get(PingOption::AddressFamily));
        assert_eq!(OptionValue::Bytes(default_payload()), opts.get(PingOption::Data));
        assert_eq!(DEFAULT_PAYLOAD_LEN, default_payload().len());
    }

    #[test]
    fn set_then_get_returns_value_unchanged() {
        let mut opts = EngineOptions::default();
        opts.set(PingOption::Timeout, OptionValue::Seconds(2.5)).unwrap();
        assert_eq!(OptionValue::Seconds(2.5), opts.get(PingOption::Timeout));

        opts.set(PingOption::Ttl, OptionValue::Integer(64)).unwrap();
        assert_eq!(OptionValue::Integer(64), opts.get(PingOption::Ttl));

        opts.set(PingOption::Data, OptionValue::Bytes(b"abc".to_vec())).unwrap();
        assert_eq!(OptionValue::Bytes(b"abc".to_vec()), opts.get(PingOption::Data));

        opts.set(PingOption::Source, OptionValue::Text("127.0.0.1".into())).unwrap();
        assert_eq!(OptionValue::Text("127.0.0.1".into()), opts.get(PingOption::Source));

        opts.set(PingOption::Device, OptionValue::Text("lo".into())).unwrap();
        assert_eq!(OptionValue::Text("lo".into()), opts.get(PingOption::Device));
    }

    #[test]
    fn out_of_range_values_never_partially_apply() {
        let mut opts = EngineOptions::default();

        for bad in [0i64, 256, -3] {
            let err = opts.set(PingOption::Ttl, OptionValue::Integer(bad)).unwrap_err();
            assert!(matches!(err, PingError::InvalidValue { .. }));
        }
        assert_eq!(OptionValue::Integer(i64::from(DEFAULT_TTL)), opts.get(PingOption::Ttl));

        for bad in [0.0f64, -1.0, f64::NAN, f64::INFINITY] {
            let err = opts.set(PingOption::Timeout, OptionValue::Seconds(bad)).unwrap_err();
            assert!(matches!(err, PingError::InvalidValue { .. }));
        }
        assert_eq!(OptionValue::Seconds(1.0), opts.get(PingOption::Timeout));
    }

    #[test]
    fn mistyped_values_are_rejected() {
        let mut opts = EngineOptions::default();
        let err = opts
            .set(PingOption::Timeout, OptionValue::Text("soon".into()))
            .unwrap_err();
        assert!(matches!(err, PingError::InvalidValue { .. }));
    }

    #[test]
    fn source_must_be_an_address_literal() {
        let mut opts = EngineOptions::default();
        assert!(opts.set(PingOption::Source, OptionValue::Text("::1".into())).is_ok());
        let err = opts
            .set(PingOption::Source, OptionValue::Text("not-an-ip".into()))
            .unwrap_err();
        assert!(matches!(err, PingError::InvalidValue { .. }));
    }

    #[test]
    fn option_codes_round_trip() {
        for opt in [
            PingOption::Timeout,
            PingOption::Ttl,
            PingOption::AddressFamily,
            PingOption::Data,
            PingOption::Source,
            PingOption::Device,
        ] {
            assert_eq!(opt, PingOption::from_code(opt.code()).unwrap());
        }
        assert!(matches!(PingOption::from_code(0x40), Err(PingError::InvalidOption(0x40))));
    }
}
