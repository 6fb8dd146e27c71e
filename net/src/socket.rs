//! The raw UDP transport is an external collaborator (§1) — the engine only
//! needs a non-blocking send/receive contract, not a concrete reactor.

use std::io;
use std::net::{SocketAddrV4, UdpSocket};

pub trait Socket {
	fn send_to(&self, buf: &[u8], addr: SocketAddrV4) -> io::Result<usize>;
	fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddrV4)>;
}

impl Socket for UdpSocket {
	fn send_to(&self, buf: &[u8], addr: SocketAddrV4) -> io::Result<usize> {
		UdpSocket::send_to(self, buf, addr)
	}

	fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddrV4)> {
		let (n, from) = UdpSocket::recv_from(self, buf)?;

		match from {
			std::net::SocketAddr::V4(v4) => Ok((n, v4)),
			std::net::SocketAddr::V6(_) => Err(io::Error::new(io::ErrorKind::InvalidInput, "IPv6 peer unsupported")),
		}
	}
}
