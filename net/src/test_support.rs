//! In-memory [`Socket`] double used by `server.rs`/`client.rs` tests to
//! drive deterministic tick-by-tick scenarios without real sockets.

#![cfg(test)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddrV4;
use std::rc::Rc;

use crate::socket::Socket;

type Mailbox = Rc<RefCell<VecDeque<(SocketAddrV4, Vec<u8>)>>>;

/// A shared loopback network: every [`TestSocket`] bound on it can reach
/// every other by address, the way real UDP sockets on the same host can.
#[derive(Default, Clone)]
pub(crate) struct Network {
	mailboxes: Rc<RefCell<HashMap<SocketAddrV4, Mailbox>>>,
	/// Addresses whose outbound datagrams are silently dropped, to simulate
	/// a peer that has gone silent without tearing down its socket.
	blackholed: Rc<RefCell<std::collections::HashSet<SocketAddrV4>>>,
}

impl Network {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn socket(&self, addr: SocketAddrV4) -> TestSocket {
		let mailbox = self.mailbox_for(addr);
		TestSocket { addr, mailbox, network: self.clone() }
	}

	fn mailbox_for(&self, addr: SocketAddrV4) -> Mailbox {
		self.mailboxes.borrow_mut().entry(addr).or_insert_with(|| Rc::new(RefCell::new(VecDeque::new()))).clone()
	}

	/// Datagrams sent *from* `addr` from now on vanish instead of being
	/// delivered, modelling scenario 4's silent peer.
	pub(crate) fn blackhole(&self, addr: SocketAddrV4) {
		self.blackholed.borrow_mut().insert(addr);
	}
}

pub(crate) struct TestSocket {
	addr: SocketAddrV4,
	mailbox: Mailbox,
	network: Network,
}

impl Socket for TestSocket {
	fn send_to(&self, buf: &[u8], addr: SocketAddrV4) -> io::Result<usize> {
		if self.network.blackholed.borrow().contains(&self.addr) {
			return Ok(buf.len());
		}

		let dest = self.network.mailbox_for(addr);
		dest.borrow_mut().push_back((self.addr, buf.to_vec()));
		Ok(buf.len())
	}

	fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddrV4)> {
		match self.mailbox.borrow_mut().pop_front() {
			Some((from, data)) => {
				let n = data.len().min(buf.len());
				buf[..n].copy_from_slice(&data[..n]);
				Ok((n, from))
			}
			None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no datagrams queued")),
		}
	}
}
