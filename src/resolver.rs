//! Boundary glue: turning a configured port into a set of listening sockets,
//! and a configured upstream host/port into a connected Gopher socket.
//!
//! Grounded directly in `original_source/idigna.c`'s `add_listen`/
//! `setup_listen`/`connect_to_remote`: wildcard-bind one IPv4 and one IPv6
//! listener per port (disabling IPv4-mapped addresses on the v6 socket so
//! the two coexist), and synchronously try each resolved upstream address
//! until one connects.

use std::io;
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6, TcpStream as StdTcpStream, ToSocketAddrs};
use std::os::fd::FromRawFd;

use mio::net::{TcpListener, TcpStream};

/// Binds one listening socket per wildcard address family (IPv4 `0.0.0.0`
/// and IPv6 `::`), each with `SO_REUSEADDR` set and, for the v6 socket,
/// `IPV6_V6ONLY` enabled so it does not shadow the v4 listener on the same
/// port. Mirrors the original's enumeration of every locally configured
/// passive address, specialized to the common case of "every interface".
pub fn bind_listeners(port: u16) -> io::Result<Vec<TcpListener>> {
    let mut listeners = Vec::new();

    let v4 = SocketAddr::V4(SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, port));
    match bind_raw(v4) {
        Ok(listener) => listeners.push(listener),
        Err(e) => gateway_log::warn!("could not bind IPv4 listener on port {}: {}", port, e),
    }

    let v6 = SocketAddr::V6(SocketAddrV6::new(std::net::Ipv6Addr::UNSPECIFIED, port, 0, 0));
    match bind_raw(v6) {
        Ok(listener) => listeners.push(listener),
        Err(e) => gateway_log::warn!("could not bind IPv6 listener on port {}: {}", port, e),
    }

    if listeners.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address family could bind port {}", port),
        ));
    }

    Ok(listeners)
}

fn bind_raw(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };

    unsafe {
        let fd = libc::socket(domain, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let yes: libc::c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &yes as *const _ as *const libc::c_void,
            std::mem::size_of_val(&yes) as libc::socklen_t,
        ) < 0
        {
            let e = io::Error::last_os_error();
            libc::close(fd);
            return Err(e);
        }

        if domain == libc::AF_INET6 {
            if libc::setsockopt(
                fd,
                libc::IPPROTO_IPV6,
                libc::IPV6_V6ONLY,
                &yes as *const _ as *const libc::c_void,
                std::mem::size_of_val(&yes) as libc::socklen_t,
            ) < 0
            {
                let e = io::Error::last_os_error();
                libc::close(fd);
                return Err(e);
            }
        }

        let (sockaddr, len) = sockaddr_for(addr);
        if libc::bind(fd, &sockaddr as *const _ as *const libc::sockaddr, len) < 0 {
            let e = io::Error::last_os_error();
            libc::close(fd);
            return Err(e);
        }

        if libc::listen(fd, 16) < 0 {
            let e = io::Error::last_os_error();
            libc::close(fd);
            return Err(e);
        }

        let std_listener = std::net::TcpListener::from_raw_fd(fd);
        std_listener.set_nonblocking(true)?;
        Ok(TcpListener::from_std(std_listener))
    }
}

unsafe fn sockaddr_for(addr: SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = std::mem::zeroed();
    match addr {
        SocketAddr::V4(v4) => {
            let sin = libc::sockaddr_in {
                sin_family: libc::AF_INET as libc::sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in, sin);
            (storage, std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t)
        }
        SocketAddr::V6(v6) => {
            let sin6 = libc::sockaddr_in6 {
                sin6_family: libc::AF_INET6 as libc::sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: 0,
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: 0,
            };
            std::ptr::write(&mut storage as *mut _ as *mut libc::sockaddr_in6, sin6);
            (storage, std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t)
        }
    }
}

/// The configured Gopher origin. Connecting is synchronous, matching
/// spec §4.2 / §5: the whole process blocks on DNS resolution and the TCP
/// handshake for the duration of one `CONNECT` step.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub host: String,
    pub port: u16,
}

impl UpstreamTarget {
    pub fn connect(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match StdTcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    return Ok(TcpStream::from_std(stream));
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved")))
    }
}
