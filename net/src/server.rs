//! The server engine (§2.4, §4.3 server side, §4.5 server tick): a table of
//! client records keyed by `(addr, port)`, driven one tick at a time.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use collections::map::{Key, Map};
use log::{debug, trace, warn};
use packet::PacketBuffer;

use crate::conn::ConnCommon;
use crate::control::{ClientControl, ConnectResult, KickReason, ServerControl};
use crate::events::{ServerEvents, Stats};
use crate::message::MessageHandler;
use crate::settings::Settings;
use crate::socket::Socket;
use crate::MAX_DATAGRAM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
	Pending,
	Established { awaiting_tick_reset: bool },
	Kicking { reason: KickReason, notices_sent: u16 },
}

/// A connected (or connecting, or being kicked) client record. The server
/// owns this exclusively from the first `NOTICE_CONNECTING` until the
/// disconnect callback returns.
pub struct ClientHandle<C> {
	key: (u32, u16),
	addr: SocketAddrV4,
	common: ConnCommon,
	state: Lifecycle,
	msg: MessageHandler,
	userdata: C,
}

impl<C> ClientHandle<C> {
	pub fn addr(&self) -> Ipv4Addr {
		*self.addr.ip()
	}

	pub fn port(&self) -> u16 {
		self.addr.port()
	}

	pub fn userdata(&self) -> &C {
		&self.userdata
	}

	pub fn userdata_mut(&mut self) -> &mut C {
		&mut self.userdata
	}

	/// The highest remote tick accepted from this client so far.
	pub fn external_tick(&self) -> u16 {
		self.common.cur_remote_tick
	}

	pub fn is_established(&self) -> bool {
		matches!(self.state, Lifecycle::Established { .. })
	}

	/// Queues a reliable sub-message for this client, returning the
	/// monotonic application-visible id.
	pub fn send_message(&mut self, buf: &[u8]) -> Option<u32> {
		self.msg.message_send(buf)
	}
}

impl<C> Key for ClientHandle<C> {
	type Type = (u32, u16);

	fn key(&self) -> &Self::Type {
		&self.key
	}
}

fn addr_key(addr: SocketAddrV4) -> (u32, u16) {
	(u32::from(*addr.ip()), addr.port())
}

pub struct Server<C, E, S: Socket = UdpSocket> {
	socket: S,
	settings: Settings,
	clients: Map<ClientHandle<C>>,
	events: E,
	stats: Stats,
	local_tick: u16,
	closing: bool,
	closed: bool,
	in_buf: Vec<u8>,
}

impl<C: Default, E: ServerEvents<C>> Server<C, E, UdpSocket> {
	pub fn bind(addr: SocketAddrV4, settings: Settings, events: E) -> io::Result<Self> {
		let socket = UdpSocket::bind(addr)?;
		socket.set_nonblocking(true)?;
		Ok(Self::new(socket, settings, events))
	}
}

impl<C: Default, E: ServerEvents<C>, S: Socket> Server<C, E, S> {
	pub fn new(socket: S, settings: Settings, events: E) -> Self {
		Self {
			socket,
			settings,
			clients: Map::default(),
			events,
			stats: Stats::default(),
			local_tick: 0,
			closing: false,
			closed: false,
			in_buf: vec![0; MAX_DATAGRAM],
		}
	}

	pub fn stats(&self) -> Stats {
		self.stats
	}

	pub fn local_tick(&self) -> u16 {
		self.local_tick
	}

	pub fn is_closed(&self) -> bool {
		self.closed
	}

	/// Marks every connected client `NOTICE_KICK(SERVER_CLOSING)`; subsequent
	/// ticks stop accepting inbound and drain the kick notices to
	/// completion (§4.3 "Server shutdown").
	pub fn close(&mut self) {
		self.closing = true;

		for (_, client) in self.clients.iter_mut() {
			client.state = Lifecycle::Kicking { reason: KickReason::ServerClosing, notices_sent: 0 };
		}
	}

	pub fn kick_client(&mut self, key: (u32, u16), reason: KickReason) {
		if let Some(client) = self.clients.find_mut(&key) {
			client.state = Lifecycle::Kicking { reason, notices_sent: 0 };
		}
	}

	/// Established clients only, per `server_cli_get_next`'s skip-pending
	/// /skip-kicking contract (§1.1).
	pub fn clients(&self) -> impl Iterator<Item = &ClientHandle<C>> {
		self.clients.iter().map(|(_, c)| c).filter(|c| c.is_established())
	}

	pub fn find_client_mut(&mut self, key: (u32, u16)) -> Option<&mut ClientHandle<C>> {
		self.clients.find_mut(&key)
	}

	/// Runs one server tick: drain, dispatch, emit, advance.
	pub fn process(&mut self) {
		if self.closing && self.clients.is_empty() {
			if !self.closed {
				self.events.on_srv_close();
				self.closed = true;
			}
			return;
		}

		if !self.closing {
			self.drain_socket();
		}

		self.events.b_on_send_pkt();

		let mut to_remove = Vec::new();
		let mut out = PacketBuffer::growable();

		for (_, client) in self.clients.iter_mut() {
			client.common.advance_tick();

			match &mut client.state {
				Lifecycle::Pending => {
					if client.common.n_local_tick_noresp == self.settings.pending_conn_timeout_tick {
						client.state = Lifecycle::Kicking { reason: KickReason::ConnectionTimeout, notices_sent: 0 };
					}
					continue;
				}
				Lifecycle::Established { awaiting_tick_reset } => {
					if !*awaiting_tick_reset
						&& client.common.n_local_tick_noresp == self.settings.timeout_tick
					{
						client.state = Lifecycle::Kicking { reason: KickReason::ConnectionTimeout, notices_sent: 0 };
					} else if !*awaiting_tick_reset && client.common.long_silence() {
						*awaiting_tick_reset = true;
					}
				}
				Lifecycle::Kicking { .. } => {}
			}

			out.reset();
			out.w_16(self.local_tick).ok();

			match &mut client.state {
				Lifecycle::Pending => unreachable!("handled above"),
				Lifecycle::Established { awaiting_tick_reset } => {
					let control = if *awaiting_tick_reset {
						ServerControl::RequestResetTickCount
					} else {
						ServerControl::None
					};
					out.w_bits(control.bits(), 2).ok();

					client.msg.encode(&mut out).ok();
					self.events.on_send_pkt(client, &mut out);
				}
				Lifecycle::Kicking { reason, notices_sent } => {
					out.w_bits(ServerControl::NoticeKick.bits(), 2).ok();
					out.w_bits(reason.bits(), 3).ok();
					*notices_sent += 1;

					if *notices_sent >= self.settings.kick_notice_tick {
						to_remove.push((client.key, *reason));
					}
				}
			}

			if let Err(e) = self.socket.send_to(out.as_slice(), client.addr) {
				if e.kind() == io::ErrorKind::WouldBlock {
					warn!("send to {} would block, dropping this tick's datagram", client.addr);
				} else {
					warn!("send to {} failed: {e}", client.addr);
				}
			} else {
				self.stats.record_sent(out.as_slice().len());
			}
		}

		for (key, reason) in to_remove {
			if let Some(mut client) = self.clients.remove(&key) {
				self.events.on_disconnect(&mut client, reason);
			}
		}

		self.local_tick = self.local_tick.wrapping_add(1);
	}

	fn drain_socket(&mut self) {
		loop {
			let (n, from) = match self.socket.recv_from(&mut self.in_buf) {
				Ok(v) => v,
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
				Err(e) => {
					warn!("recvfrom failed: {e}");
					break;
				}
			};

			self.stats.record_received(n);

			let mut inbound = PacketBuffer::fixed(n);
			inbound.w(&self.in_buf[..n]).ok();
			inbound.rewind();

			self.handle_datagram(&mut inbound, from);
		}
	}

	fn handle_datagram(&mut self, inbound: &mut PacketBuffer, from: SocketAddrV4) {
		let Ok(tick) = inbound.r_16() else {
			warn!("truncated header from {from}");
			return;
		};
		let Ok(control_bits) = inbound.r_bits(2) else {
			warn!("truncated header from {from}");
			return;
		};
		let control = ClientControl::from_bits(control_bits);

		let key = addr_key(from);

		if self.clients.find(&key).is_none() {
			match control {
				ClientControl::NoticeConnecting => self.accept_new_client(key, from, tick, inbound),
				ClientControl::NoticeDisconnect => self.reply_one_shot_kick(from, KickReason::Disconnect),
				_ => trace!("discarding {control:?} from unknown client {from}"),
			}
			return;
		}

		let Some(client) = self.clients.find_mut(&key) else { return };

		// A kicking client ignores all inbound; its kick reason/countdown is never overridden.
		if matches!(client.state, Lifecycle::Kicking { .. }) {
			return;
		}

		// Disconnect notice tears the record down regardless of lifecycle state.
		if control == ClientControl::NoticeDisconnect {
			if let Some(mut client) = self.clients.remove(&key) {
				self.events.on_disconnect(&mut client, KickReason::Disconnect);
			}
			return;
		}

		let Some(client) = self.clients.find_mut(&key) else { return };

		let awaiting_reset = matches!(client.state, Lifecycle::Established { awaiting_tick_reset: true });

		if awaiting_reset {
			if control != ClientControl::NoticeResetTickCount {
				trace!("discarding {control:?} from {from} while awaiting tick reset");
				return;
			}

			client.common.force_accept(tick);

			if let Lifecycle::Established { awaiting_tick_reset } = &mut client.state {
				*awaiting_tick_reset = false;
			}
		} else if !client.common.accept(tick, self.settings.expected_tick_tolerance) {
			trace!("tick filter rejected datagram from {from}");
			return;
		}

		match client.state {
			Lifecycle::Pending => {
				if control != ClientControl::NoticeConnecting {
					trace!("discarding {control:?} from pending client {from}");
					return;
				}

				self.run_on_connect(key, inbound);
			}
			Lifecycle::Established { .. } => {
				let Some(client) = self.clients.find_mut(&key) else { return };
				let mut acked = Vec::new();
				let mut delivered: Vec<Vec<u8>> = Vec::new();

				client
					.msg
					.decode(inbound, |iid| acked.push(iid), |bytes| delivered.push(bytes.to_vec()))
					.ok();

				let Some(client) = self.clients.find_mut(&key) else { return };

				for iid in acked {
					self.events.on_message_ack(client, iid);
				}

				let client = self.clients.find_mut(&key).expect("present");

				for payload in &delivered {
					self.events.on_receive_msg(client, payload);
				}

				let remaining = inbound.get_readable();
				let Ok(payload) = inbound.read_slice(remaining) else { return };
				self.events.on_receive_pkt(self.clients.find_mut(&key).expect("present"), payload);
			}
			Lifecycle::Kicking { .. } => {}
		}
	}

	fn accept_new_client(&mut self, key: (u32, u16), from: SocketAddrV4, tick: u16, inbound: &mut PacketBuffer) {
		let mut common = ConnCommon::default();
		common.force_accept(tick);

		self.clients.insert_unique(&key).insert(ClientHandle {
			key,
			addr: from,
			common,
			state: Lifecycle::Pending,
			msg: MessageHandler::new(),
			userdata: C::default(),
		});

		debug!("new pending client {from}");
		self.run_on_connect(key, inbound);
	}

	fn run_on_connect(&mut self, key: (u32, u16), inbound: &mut PacketBuffer) {
		let Some(client) = self.clients.find_mut(&key) else { return };

		let mut outbound = PacketBuffer::growable();
		outbound.w_16(self.local_tick).ok();
		outbound.w_bits(ServerControl::PendingConnection.bits(), 2).ok();

		let result = self.events.on_connect(client, inbound, &mut outbound);

		let Some(client) = self.clients.find_mut(&key) else { return };

		match result {
			ConnectResult::Allow => {
				client.state = Lifecycle::Established { awaiting_tick_reset: false };
			}
			ConnectResult::Refuse => {
				client.state = Lifecycle::Kicking { reason: KickReason::ConnectionRefused, notices_sent: 0 };
			}
			ConnectResult::Again => {
				if let Err(e) = self.socket.send_to(outbound.as_slice(), client.addr) {
					if e.kind() != io::ErrorKind::WouldBlock {
						warn!("send to {} failed: {e}", client.addr);
					}
				} else {
					self.stats.record_sent(outbound.as_slice().len());
				}
			}
		}
	}

	fn reply_one_shot_kick(&mut self, to: SocketAddrV4, reason: KickReason) {
		let mut out = PacketBuffer::growable();
		out.w_16(self.local_tick).ok();
		out.w_bits(ServerControl::NoticeKick.bits(), 2).ok();
		out.w_bits(reason.bits(), 3).ok();

		if let Err(e) = self.socket.send_to(out.as_slice(), to) {
			if e.kind() != io::ErrorKind::WouldBlock {
				warn!("send to {to} failed: {e}");
			}
		} else {
			self.stats.record_sent(out.as_slice().len());
		}
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::net::Ipv4Addr;
	use std::rc::Rc;

	use super::*;
	use crate::test_support::Network;

	fn settings() -> Settings {
		Settings::new(20, 10, 3, 16).unwrap()
	}

	#[derive(Default)]
	struct Log {
		connects: u32,
		disconnects: Vec<KickReason>,
		received_pkts: Vec<Vec<u8>>,
	}

	struct Events {
		log: Rc<RefCell<Log>>,
		verdict: ConnectResult,
	}

	impl ServerEvents<()> for Events {
		fn on_connect(&mut self, _client: &mut ClientHandle<()>, _inbound: &mut PacketBuffer, _outbound: &mut PacketBuffer) -> ConnectResult {
			self.log.borrow_mut().connects += 1;
			self.verdict
		}

		fn on_disconnect(&mut self, _client: &mut ClientHandle<()>, reason: KickReason) {
			self.log.borrow_mut().disconnects.push(reason);
		}

		fn on_receive_msg(&mut self, _client: &mut ClientHandle<()>, _payload: &[u8]) {}

		fn on_receive_pkt(&mut self, _client: &mut ClientHandle<()>, payload: &[u8]) {
			self.log.borrow_mut().received_pkts.push(payload.to_vec());
		}

		fn on_send_pkt(&mut self, _client: &mut ClientHandle<()>, _outbound: &mut PacketBuffer) {}

		fn on_message_ack(&mut self, _client: &mut ClientHandle<()>, _iid: u32) {}
	}

	fn addr(port: u16) -> SocketAddrV4 {
		SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
	}

	fn events(log: &Rc<RefCell<Log>>) -> Events {
		Events { log: log.clone(), verdict: ConnectResult::Allow }
	}

	/// Hand-builds a client datagram: tick, 2-bit control, empty msg block,
	/// then a raw unreliable payload, delivered to `to` as if sent by `from`.
	fn send_from_client(
		net: &Network,
		from: SocketAddrV4,
		to: SocketAddrV4,
		tick: u16,
		control: ClientControl,
		payload: &[u8],
	) {
		let mut out = PacketBuffer::growable();
		out.w_16(tick).ok();
		out.w_bits(control.bits(), 2).ok();
		crate::message::MessageHandler::encode_empty(&mut out).ok();
		out.w(payload).ok();

		net.socket(from).send_to(out.as_slice(), to).unwrap();
	}

	#[test]
	fn accepts_new_client_and_exchanges_payload() {
		let net = Network::new();
		let server_addr = addr(1);
		let client_addr = addr(2);
		let log = Rc::new(RefCell::new(Log::default()));

		let mut server = Server::new(net.socket(server_addr), settings(), events(&log));

		send_from_client(&net, client_addr, server_addr, 0, ClientControl::NoticeConnecting, b"hi");
		server.process();

		assert_eq!(log.borrow().connects, 1);
		let key = addr_key(client_addr);
		assert!(server.find_client_mut(key).unwrap().is_established());

		send_from_client(&net, client_addr, server_addr, 1, ClientControl::None, b"echo");
		server.process();

		assert_eq!(log.borrow().received_pkts, vec![b"echo".to_vec()]);
	}

	#[test]
	fn tick_reset_recovery_ignores_ordinary_traffic() {
		let net = Network::new();
		let server_addr = addr(1);
		let client_addr = addr(2);
		let log = Rc::new(RefCell::new(Log::default()));

		let mut server = Server::new(net.socket(server_addr), settings(), events(&log));

		send_from_client(&net, client_addr, server_addr, 0, ClientControl::NoticeConnecting, &[]);
		server.process();

		let key = addr_key(client_addr);
		{
			let client = server.find_client_mut(key).unwrap();
			client.state = Lifecycle::Established { awaiting_tick_reset: true };
			client.common.cur_remote_tick = 5;
		}

		// Ordinary traffic must be a complete no-op while awaiting the reset
		// notice: no force-accept, no decode, no callbacks.
		send_from_client(&net, client_addr, server_addr, 999, ClientControl::None, b"should not arrive");
		server.process();

		let client = server.find_client_mut(key).unwrap();
		assert_eq!(client.common.cur_remote_tick, 5, "ordinary traffic must not force-accept during recovery");
		assert!(matches!(client.state, Lifecycle::Established { awaiting_tick_reset: true }));
		assert!(log.borrow().received_pkts.is_empty());

		// The explicit reset notice is the only thing recovery accepts.
		send_from_client(&net, client_addr, server_addr, 999, ClientControl::NoticeResetTickCount, b"resumed");
		server.process();

		let client = server.find_client_mut(key).unwrap();
		assert_eq!(client.common.cur_remote_tick, 999);
		assert!(matches!(client.state, Lifecycle::Established { awaiting_tick_reset: false }));
		assert_eq!(log.borrow().received_pkts, vec![b"resumed".to_vec()]);
	}

	#[test]
	fn established_client_times_out_without_traffic() {
		let net = Network::new();
		let server_addr = addr(1);
		let client_addr = addr(2);
		let log = Rc::new(RefCell::new(Log::default()));

		let mut server = Server::new(net.socket(server_addr), settings(), events(&log));

		send_from_client(&net, client_addr, server_addr, 0, ClientControl::NoticeConnecting, &[]);
		server.process();

		let key = addr_key(client_addr);
		assert!(server.find_client_mut(key).unwrap().is_established());

		for _ in 0..=settings().timeout_tick {
			server.process();
		}

		assert!(server.find_client_mut(key).is_none());
		assert_eq!(log.borrow().disconnects, vec![KickReason::ConnectionTimeout]);
	}

	#[test]
	fn kicked_client_ignores_disconnect_notice_during_countdown() {
		let net = Network::new();
		let server_addr = addr(1);
		let log = Rc::new(RefCell::new(Log::default()));

		let mut server = Server::new(net.socket(server_addr), settings(), events(&log));

		let kicked = addr(10);
		let bystander = addr(11);

		for c in [kicked, bystander] {
			send_from_client(&net, c, server_addr, 0, ClientControl::NoticeConnecting, &[]);
			server.process();
			assert!(server.find_client_mut(addr_key(c)).unwrap().is_established());
		}

		server.kick_client(addr_key(kicked), KickReason::ConnectionRefused);

		// The kicked client tries to leave on its own mid-countdown; the
		// original kick reason must win, not be overridden by this notice.
		send_from_client(&net, kicked, server_addr, 1, ClientControl::NoticeDisconnect, &[]);

		for _ in 0..=settings().kick_notice_tick {
			server.process();
		}

		assert_eq!(log.borrow().disconnects, vec![KickReason::ConnectionRefused]);
		assert!(server.find_client_mut(addr_key(kicked)).is_none());
		assert!(server.find_client_mut(addr_key(bystander)).unwrap().is_established());
	}

	#[test]
	fn graceful_close_kicks_every_established_client() {
		let net = Network::new();
		let server_addr = addr(1);
		let log = Rc::new(RefCell::new(Log::default()));

		let mut server = Server::new(net.socket(server_addr), settings(), events(&log));

		let clients: Vec<SocketAddrV4> = (0..3).map(|i| addr(20 + i)).collect();
		for &c in &clients {
			send_from_client(&net, c, server_addr, 0, ClientControl::NoticeConnecting, &[]);
			server.process();
			assert!(server.find_client_mut(addr_key(c)).unwrap().is_established());
		}

		server.close();

		for _ in 0..=settings().kick_notice_tick {
			server.process();
		}

		assert_eq!(log.borrow().disconnects, vec![KickReason::ServerClosing; 3]);
		assert!(server.is_closed());
	}
}
