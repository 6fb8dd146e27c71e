//! The client engine (§2.5, §4.3 client side, §4.5 client tick): the
//! single-peer dual of the server engine.

use std::io;
use std::net::{SocketAddrV4, UdpSocket};

use log::{trace, warn};
use packet::PacketBuffer;

use crate::conn::ConnCommon;
use crate::control::{ClientControl, KickReason, ServerControl};
use crate::events::{ClientEvents, Stats};
use crate::message::MessageHandler;
use crate::settings::Settings;
use crate::socket::Socket;
use crate::MAX_DATAGRAM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
	Connecting,
	Connected { awaiting_tick_reset: bool },
	Disconnecting { notices_sent: u16 },
	Gone,
}

pub struct Client<E, S: Socket = UdpSocket> {
	socket: S,
	server_addr: SocketAddrV4,
	settings: Settings,
	common: ConnCommon,
	local_tick: u16,
	state: Lifecycle,
	msg: MessageHandler,
	events: E,
	stats: Stats,
	connect_payload: Vec<u8>,
	in_buf: Vec<u8>,
}

impl<E: ClientEvents> Client<E, UdpSocket> {
	pub fn connect(server_addr: SocketAddrV4, settings: Settings, events: E) -> io::Result<Self> {
		let socket = UdpSocket::bind(SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0))?;
		socket.set_nonblocking(true)?;
		Ok(Self::new(socket, server_addr, settings, events))
	}
}

impl<E: ClientEvents, S: Socket> Client<E, S> {
	pub fn new(socket: S, server_addr: SocketAddrV4, settings: Settings, events: E) -> Self {
		Self {
			socket,
			server_addr,
			settings,
			common: ConnCommon::default(),
			local_tick: 0,
			state: Lifecycle::Connecting,
			msg: MessageHandler::new(),
			events,
			stats: Stats::default(),
			connect_payload: Vec::new(),
			in_buf: vec![0; MAX_DATAGRAM],
		}
	}

	pub fn stats(&self) -> Stats {
		self.stats
	}

	pub fn local_tick(&self) -> u16 {
		self.local_tick
	}

	pub fn external_tick(&self) -> u16 {
		self.common.cur_remote_tick
	}

	pub fn is_connected(&self) -> bool {
		matches!(self.state, Lifecycle::Connected { .. })
	}

	pub fn is_gone(&self) -> bool {
		matches!(self.state, Lifecycle::Gone)
	}

	/// Queues a reliable sub-message, returning the monotonic
	/// application-visible id. `None` if not connected.
	pub fn send_message(&mut self, buf: &[u8]) -> Option<u32> {
		if !self.is_connected() {
			return None;
		}

		self.msg.message_send(buf)
	}

	/// Begins graceful disconnection: `NOTICE_DISCONNECT` is emitted every
	/// tick until `kick_notice_tick` ticks pass without a response.
	pub fn disconnect(&mut self) {
		if !matches!(self.state, Lifecycle::Gone) {
			self.state = Lifecycle::Disconnecting { notices_sent: 0 };
		}
	}

	/// Runs one client tick: finalisation check, drain, dispatch, emit,
	/// advance.
	pub fn process(&mut self) {
		if matches!(self.state, Lifecycle::Gone) {
			return;
		}

		if let Lifecycle::Disconnecting { notices_sent } = self.state {
			if notices_sent >= self.settings.kick_notice_tick {
				self.events.on_disconnect(KickReason::Disconnect);
				self.state = Lifecycle::Gone;
				return;
			}
		}

		self.drain_socket();

		if !matches!(self.state, Lifecycle::Gone)
			&& self.common.n_local_tick_noresp == self.settings.timeout_tick
		{
			self.events.on_disconnect(KickReason::ConnectionTimeout);
			self.state = Lifecycle::Gone;
		}

		if !matches!(self.state, Lifecycle::Gone) {
			self.emit();
			self.common.advance_tick();
			self.local_tick = self.local_tick.wrapping_add(1);
		}
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

			if from != self.server_addr {
				trace!("discarding datagram from unexpected peer {from}");
				continue;
			}

			self.stats.record_received(n);

			let mut inbound = PacketBuffer::fixed(n);
			inbound.w(&self.in_buf[..n]).ok();
			inbound.rewind();

			self.handle_datagram(&mut inbound);

			if matches!(self.state, Lifecycle::Gone) {
				break;
			}
		}
	}

	fn handle_datagram(&mut self, inbound: &mut PacketBuffer) {
		let Ok(tick) = inbound.r_16() else {
			warn!("truncated header from server");
			return;
		};
		let Ok(control_bits) = inbound.r_bits(2) else {
			warn!("truncated header from server");
			return;
		};
		let control = ServerControl::from_bits(control_bits);

		let awaiting_reset = matches!(self.state, Lifecycle::Connected { awaiting_tick_reset: true });

		if awaiting_reset {
			self.common.force_accept(tick);
		} else if !self.common.accept(tick, self.settings.expected_tick_tolerance) {
			trace!("tick filter rejected datagram from server");
			return;
		}

		if control == ServerControl::NoticeKick {
			let Ok(reason_bits) = inbound.r_bits(3) else {
				warn!("truncated kick reason from server");
				return;
			};
			self.events.on_disconnect(KickReason::from_bits(reason_bits));
			self.state = Lifecycle::Gone;
			return;
		}

		match self.state {
			Lifecycle::Connecting => match control {
				ServerControl::PendingConnection => self.rebuild_connect_payload(Some(inbound)),
				ServerControl::None => {
					self.state = Lifecycle::Connected { awaiting_tick_reset: false };
					self.consume_established_body(inbound);
				}
				_ => trace!("discarding {control:?} while connecting"),
			},
			Lifecycle::Connected { awaiting_tick_reset } => match control {
				ServerControl::None => {
					if awaiting_tick_reset {
						self.state = Lifecycle::Connected { awaiting_tick_reset: false };
					}
					self.consume_established_body(inbound);
				}
				ServerControl::RequestResetTickCount => {
					self.local_tick = 0;
					self.state = Lifecycle::Connected { awaiting_tick_reset: true };
					self.consume_established_body(inbound);
				}
				_ => trace!("discarding {control:?} while connected"),
			},
			Lifecycle::Disconnecting { .. } | Lifecycle::Gone => {}
		}
	}

	fn consume_established_body(&mut self, inbound: &mut PacketBuffer) {
		let mut acked = Vec::new();
		let mut delivered: Vec<Vec<u8>> = Vec::new();

		if self.msg.decode(inbound, |iid| acked.push(iid), |bytes| delivered.push(bytes.to_vec())).is_err() {
			warn!("malformed message block from server, discarding datagram");
			return;
		}

		for iid in acked {
			self.events.on_message_ack(iid);
		}

		for payload in &delivered {
			self.events.on_receive_msg(payload);
		}

		let remaining = inbound.get_readable();

		if let Ok(payload) = inbound.read_slice(remaining) {
			self.events.on_receive_pkt(payload);
		}
	}

	fn rebuild_connect_payload(&mut self, inbound: Option<&mut PacketBuffer>) {
		let mut scratch = PacketBuffer::growable();
		self.events.on_connect(inbound, &mut scratch);
		self.connect_payload.clear();
		self.connect_payload.extend_from_slice(scratch.as_slice());
	}

	fn emit(&mut self) {
		let mut out = PacketBuffer::growable();
		out.w_16(self.local_tick).ok();

		match &mut self.state {
			Lifecycle::Connecting => {
				if self.connect_payload.is_empty() {
					self.rebuild_connect_payload(None);
				}

				out.w_bits(ClientControl::NoticeConnecting.bits(), 2).ok();
				out.w(&self.connect_payload).ok();
			}
			Lifecycle::Connected { awaiting_tick_reset } => {
				let control =
					if *awaiting_tick_reset { ClientControl::NoticeResetTickCount } else { ClientControl::None };
				out.w_bits(control.bits(), 2).ok();
				self.msg.encode(&mut out).ok();
				self.events.on_send_pkt(&mut out);
			}
			Lifecycle::Disconnecting { notices_sent } => {
				out.w_bits(ClientControl::NoticeDisconnect.bits(), 2).ok();
				*notices_sent += 1;
			}
			Lifecycle::Gone => unreachable!("process returns before emit once gone"),
		}

		match self.socket.send_to(out.as_slice(), self.server_addr) {
			Ok(_) => self.stats.record_sent(out.as_slice().len()),
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
				warn!("send to server would block, dropping this tick's datagram");
			}
			Err(e) => warn!("send to server failed: {e}"),
		}
	}
}
