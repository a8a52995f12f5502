//! Raw-socket transport: one socket per address family in use, multiplexed
//! with a single `poll(2)` readiness wait.
//!
//! The transport only moves datagrams and reports readiness. It never
//! decides loss: a socket that stays quiet until the deadline is simply not
//! reported, and the scheduler draws the conclusion.

use crate::error::{PingError, PingResult};
use crate::icmp::{Family, Ttl};
use crate::options::EngineOptions;
use socket2::{Domain, Protocol, SockAddr, Type};
use std::io;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::os::unix::prelude::AsRawFd;
use std::time::Duration;

const RECV_BUFFER_SIZE: usize = 4096;

/// Backing storage for `recvmsg` control data. `CMSG_FIRSTHDR` hands out a
/// `cmsghdr` pointer into this buffer, so it must be aligned for that type;
/// a plain byte array is not.
#[repr(align(8))]
struct CmsgBuffer([u8; 128]);

/// One received raw datagram. For IPv4 the bytes still carry the IP header
/// (the codec strips it and reads the TTL from it); for IPv6 the hop limit
/// arrives as socket control data and is reported in `recv_ttl`, absent when
/// the platform did not deliver it.
#[derive(Debug)]
pub(crate) struct Datagram {
    pub bytes: Vec<u8>,
    pub source: IpAddr,
    pub recv_ttl: Option<Ttl>,
}

/// Seam between the scheduler and the wire. Implemented by [`RawTransport`]
/// and by the mock used in scheduler tests.
pub(crate) trait Transport {
    /// Opens the socket for `family` if it does not exist yet, or re-applies
    /// the per-round options (TTL) to the existing one.
    fn open(&mut self, family: Family, options: &EngineOptions) -> PingResult<()>;
    fn is_open(&self, family: Family) -> bool;
    /// Non-blocking send. `WouldBlock` is transient; wait for writability
    /// and retry.
    fn send(&mut self, family: Family, dest: IpAddr, packet: &[u8]) -> io::Result<usize>;
    fn wait_writable(&mut self, family: Family, timeout: Duration) -> io::Result<bool>;
    /// One readiness wait covering every open socket. Returns the families
    /// with pending data; an empty set means the timeout (or a signal)
    /// interrupted the wait and the caller should re-check its deadline.
    fn poll(&mut self, timeout: Duration) -> io::Result<Vec<Family>>;
    /// Non-blocking receive; `None` when the socket has nothing left.
    fn receive(&mut self, family: Family) -> io::Result<Option<Datagram>>;
    /// The bound IPv6 source address, when one was configured. Needed for
    /// pseudo-header checksums.
    fn local_v6(&self) -> Option<Ipv6Addr>;
}

pub(crate) struct RawTransport {
    v4: Option<RawSocket>,
    v6: Option<RawSocket>,
}

impl RawTransport {
    pub(crate) fn new() -> Self {
        RawTransport { v4: None, v6: None }
    }

    fn slot(&self, family: Family) -> Option<&RawSocket> {
        match family {
            Family::V4 => self.v4.as_ref(),
            Family::V6 => self.v6.as_ref(),
        }
    }

    fn socket(&self, family: Family) -> io::Result<&RawSocket> {
        self.slot(family).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, format!("no {family} socket open"))
        })
    }
}

impl Transport for RawTransport {
    fn open(&mut self, family: Family, options: &EngineOptions) -> PingResult<()> {
        let slot = match family {
            Family::V4 => &mut self.v4,
            Family::V6 => &mut self.v6,
        };
        match slot {
            Some(raw) => raw.set_ttl(options.ttl)?,
            None => *slot = Some(RawSocket::open(family, options)?),
        }
        Ok(())
    }

    fn is_open(&self, family: Family) -> bool {
        self.slot(family).is_some()
    }

    fn send(&mut self, family: Family, dest: IpAddr, packet: &[u8]) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddr::new(dest, 0));
        self.socket(family)?.socket.send_to(packet, &addr)
    }

    fn wait_writable(&mut self, family: Family, timeout: Duration) -> io::Result<bool> {
        let mut fd = libc::pollfd {
            fd: self.socket(family)?.socket.as_raw_fd(),
            events: libc::POLLOUT,
            revents: 0,
        };
        let rc = unsafe { libc::poll(std::ptr::addr_of_mut!(fd), 1, poll_millis(timeout)) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(rc > 0 && fd.revents & libc::POLLOUT != 0)
    }

    fn poll(&mut self, timeout: Duration) -> io::Result<Vec<Family>> {
        let mut families = Vec::with_capacity(2);
        let mut fds = Vec::with_capacity(2);
        for family in [Family::V4, Family::V6] {
            if let Some(raw) = self.slot(family) {
                families.push(family);
                fds.push(libc::pollfd {
                    fd: raw.socket.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                });
            }
        }
        if fds.is_empty() {
            return Ok(Vec::new());
        }

        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, poll_millis(timeout)) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        Ok(families
            .into_iter()
            .zip(&fds)
            .filter(|(_, fd)| fd.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0)
            .map(|(family, _)| family)
            .collect())
    }

    fn receive(&mut self, family: Family) -> io::Result<Option<Datagram>> {
        let raw = self.socket(family)?;
        match family {
            Family::V4 => raw.recv_v4(),
            Family::V6 => raw.recv_v6(),
        }
    }

    fn local_v6(&self) -> Option<Ipv6Addr> {
        match self.v6.as_ref()?.source {
            Some(IpAddr::V6(addr)) => Some(addr),
            _ => None,
        }
    }
}

struct RawSocket {
    socket: socket2::Socket,
    family: Family,
    source: Option<IpAddr>,
}

impl RawSocket {
    fn open(family: Family, options: &EngineOptions) -> PingResult<RawSocket> {
        let (domain, protocol) = match family {
            Family::V4 => (Domain::IPV4, Protocol::ICMPV4),
            Family::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };
        let socket = socket2::Socket::new(domain, Type::RAW, Some(protocol))
            .map_err(|e| classify_open_error(family, e))?;
        socket.set_nonblocking(true).map_err(PingError::Io)?;

        let raw = RawSocket {
            socket,
            family,
            source: options.source.filter(|s| Family::of(s) == family),
        };
        raw.set_ttl(options.ttl)?;
        if family == Family::V6 {
            enable_recv_hoplimit(&raw.socket);
        }
        if let Some(source) = raw.source {
            raw.socket
                .bind(&SockAddr::from(SocketAddr::new(source, 0)))
                .map_err(PingError::Io)?;
        }
        if let Some(device) = &options.device {
            bind_to_device(&raw.socket, device).map_err(PingError::Io)?;
        }
        tracing::trace!(%family, "opened raw ICMP socket");
        Ok(raw)
    }

    fn set_ttl(&self, ttl: u8) -> PingResult<()> {
        let result = match self.family {
            Family::V4 => self.socket.set_ttl(u32::from(ttl)),
            Family::V6 => self.socket.set_unicast_hops_v6(u32::from(ttl)),
        };
        result.map_err(PingError::Io)
    }

    fn recv_v4(&self) -> io::Result<Option<Datagram>> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        // Socket2 guarantees it never writes uninitialized bytes, which is
        // what makes this cast sound.
        // https://docs.rs/socket2/0.4.7/socket2/struct.Socket.html#method.recv
        let result = self.socket.recv_from(unsafe {
            &mut *(std::ptr::addr_of_mut!(buf) as *mut [u8] as *mut [std::mem::MaybeUninit<u8>])
        });
        match result {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
            Ok((n, addr)) => {
                let source = addr
                    .as_socket()
                    .map(|s| s.ip())
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "peer is not an inet address"))?;
                Ok(Some(Datagram {
                    bytes: buf[..n].to_vec(),
                    source,
                    // On a raw IPv4 socket the TTL sits in the delivered IP
                    // header, which the codec reads while stripping it.
                    recv_ttl: None,
                }))
            }
        }
    }

    /// `recvmsg` instead of `recv_from`: the hop limit only travels as an
    /// `IPV6_HOPLIMIT` control message.
    fn recv_v6(&self) -> io::Result<Option<Datagram>> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let mut addr_storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut control = CmsgBuffer([0u8; 128]);
        let mut iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
        msg.msg_name = std::ptr::addr_of_mut!(addr_storage).cast();
        msg.msg_namelen = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        msg.msg_iov = std::ptr::addr_of_mut!(iov);
        msg.msg_iovlen = 1;
        msg.msg_control = control.0.as_mut_ptr().cast();
        msg.msg_controllen = std::mem::size_of_val(&control.0) as _;

        let n = unsafe { libc::recvmsg(self.socket.as_raw_fd(), std::ptr::addr_of_mut!(msg), 0) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            return Err(err);
        }

        Ok(Some(Datagram {
            bytes: buf[..n as usize].to_vec(),
            source: source_from_storage(&addr_storage)?,
            recv_ttl: hoplimit_from_control(&msg),
        }))
    }
}

fn classify_open_error(family: Family, error: io::Error) -> PingError {
    if error.kind() == io::ErrorKind::PermissionDenied {
        return PingError::PermissionDenied(error);
    }
    if error.raw_os_error() == Some(libc::EAFNOSUPPORT) {
        return PingError::UnsupportedFamily(family);
    }
    PingError::Io(error)
}

#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
fn bind_to_device(socket: &socket2::Socket, device: &str) -> io::Result<()> {
    socket.bind_device(Some(device.as_bytes()))
}

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
fn bind_to_device(_socket: &socket2::Socket, _device: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "device binding is not available on this platform",
    ))
}

fn enable_recv_hoplimit(socket: &socket2::Socket) {
    let on: libc::c_int = 1;
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IPV6,
            libc::IPV6_RECVHOPLIMIT,
            std::ptr::addr_of!(on).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        // Hop limits will be reported as absent, not fabricated.
        tracing::warn!(
            error = %io::Error::last_os_error(),
            "could not enable IPV6_RECVHOPLIMIT"
        );
    }
}

fn hoplimit_from_control(msg: &libc::msghdr) -> Option<Ttl> {
    let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(msg) };
    while !cmsg.is_null() {
        let header = unsafe { &*cmsg };
        if header.cmsg_level == libc::IPPROTO_IPV6 && header.cmsg_type == libc::IPV6_HOPLIMIT {
            let value =
                unsafe { std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const libc::c_int) };
            return u8::try_from(value).ok().map(Ttl);
        }
        cmsg = unsafe { libc::CMSG_NXTHDR(msg, cmsg) };
    }
    None
}

fn source_from_storage(storage: &libc::sockaddr_storage) -> io::Result<IpAddr> {
    if storage.ss_family != libc::AF_INET6 as libc::sa_family_t {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unexpected peer address family on ICMPv6 socket",
        ));
    }
    let sa = unsafe { &*(std::ptr::addr_of!(*storage) as *const libc::sockaddr_in6) };
    Ok(IpAddr::V6(Ipv6Addr::from(sa.sin6_addr.s6_addr)))
}

fn poll_millis(timeout: Duration) -> libc::c_int {
    // Round up so a sub-millisecond remainder does not turn into a busy spin.
    let millis = (timeout.as_micros() + 999) / 1000;
    millis.min(libc::c_int::MAX as u128) as libc::c_int
}
