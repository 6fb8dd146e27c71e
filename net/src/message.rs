//! The reliable-message subprotocol (§4.4): ordered delivery, explicit
//! acknowledgement, a bounded in-flight window with overflow queueing.

use std::collections::VecDeque;

use packet::PacketBuffer;

/// Maximum number of unacknowledged messages in flight at once.
pub const SEND_WINDOW: u8 = 128;

/// One assigned sequence slot. `packet` accumulates the `vlen29(len) ++
/// bytes` pairs of every sub-message fused into this slot this batch.
struct MessageRecord {
	id: u8,
	iid: u32,
	packet: PacketBuffer,
	submsg_count: u32,
}

impl MessageRecord {
	fn new() -> Self {
		Self { id: 0, iid: 0, packet: PacketBuffer::growable(), submsg_count: 0 }
	}
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CurrentLoc {
	Send,
	Queue,
}

/// Per-connection reliable-message state: three lists (in-flight, overflow
/// queue, retired-record pool) plus the outbound/inbound sequence counters.
pub struct MessageHandler {
	send: VecDeque<MessageRecord>,
	queue: VecDeque<MessageRecord>,
	pool: VecDeque<MessageRecord>,
	current: Option<CurrentLoc>,
	last_id: u8,
	last_iid: u32,
	last_ack: u8,
	send_count: u8,
	queue_count: u32,
}

impl Default for MessageHandler {
	fn default() -> Self {
		Self {
			send: VecDeque::new(),
			queue: VecDeque::new(),
			pool: VecDeque::new(),
			current: None,
			last_id: 0,
			last_iid: 0,
			last_ack: 0,
			send_count: 0,
			queue_count: 0,
		}
	}
}

impl MessageHandler {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn pool_count(&self) -> usize {
		self.pool.len()
	}

	pub fn queue_count(&self) -> u32 {
		self.queue_count
	}

	pub fn send_count(&self) -> u8 {
		self.send_count
	}

	pub fn last_ack(&self) -> u8 {
		self.last_ack
	}

	/// Queues `buf` as the next reliable sub-message, assigning a fresh
	/// sequence slot if none is open this tick. Returns the monotonic
	/// application-visible id, or `None` if the packet buffer backing the
	/// slot could not grow to hold it.
	pub fn message_send(&mut self, buf: &[u8]) -> Option<u32> {
		if self.current.is_none() {
			let mut rec = self.pool.pop_front().unwrap_or_else(MessageRecord::new);
			rec.packet.reset();

			self.last_id = self.last_id.wrapping_add(1);
			self.last_iid = self.last_iid.wrapping_add(1);
			rec.id = self.last_id;
			rec.iid = self.last_iid;
			rec.submsg_count = 0;

			if self.send_count < SEND_WINDOW {
				self.send.push_back(rec);
				self.send_count += 1;
				self.current = Some(CurrentLoc::Send);
			} else {
				self.queue.push_back(rec);
				self.queue_count += 1;
				self.current = Some(CurrentLoc::Queue);
			}
		}

		let rec = match self.current.expect("just ensured a current slot exists") {
			CurrentLoc::Send => self.send.back_mut().expect("current points at send"),
			CurrentLoc::Queue => self.queue.back_mut().expect("current points at queue"),
		};

		rec.packet.w_vlen29(buf.len() as u32).ok()?;
		rec.packet.w(buf).ok()?;
		rec.submsg_count += 1;

		Some(rec.iid)
	}

	/// Writes the 1-bit `has_msgblock` flag, the ack/send-count header and
	/// every in-flight record's accumulated sub-messages, then closes the
	/// current slot so the next `message_send` starts a fresh one.
	pub fn encode(&mut self, out: &mut PacketBuffer) -> packet::Result {
		out.w_bits(1, 1)?;
		out.w_8(self.last_ack)?;
		out.w_8(self.send_count)?;

		for rec in &self.send {
			out.w_8(rec.id)?;
			out.w_vlen29(rec.submsg_count)?;
			out.w(rec.packet.as_slice())?;
		}

		self.current = None;

		Ok(())
	}

	/// Writes `has_msgblock = 0`: nothing follows.
	pub fn encode_empty(out: &mut PacketBuffer) -> packet::Result {
		out.w_bits(0, 1)
	}

	/// Decodes an inbound msg block, retiring acknowledged in-flight
	/// records (firing `on_ack` with each one's `iid`) and delivering any
	/// in-order sub-messages (firing `on_msg` with each one's bytes).
	pub fn decode(
		&mut self,
		inp: &mut PacketBuffer,
		mut on_ack: impl FnMut(u32),
		mut on_msg: impl FnMut(&[u8]),
	) -> packet::Result {
		if inp.r_bits(1)? == 0 {
			return Ok(());
		}

		let ack = inp.r_8()?;
		let count = inp.r_8()?;

		// Retire every in-flight record the ack covers. Deliberately does
		// not assume `send` is ordered by id: each record is tested on its
		// own wrapping distance from `ack`.
		let mut i = 0;

		while i < self.send.len() {
			let diff = ack.wrapping_sub(self.send[i].id) as i8;

			if diff >= 0 {
				let rec = self.send.remove(i).expect("i < len");
				self.send_count -= 1;
				on_ack(rec.iid);
				self.pool.push_back(rec);
			} else {
				i += 1;
			}
		}

		while self.send_count < SEND_WINDOW {
			let Some(rec) = self.queue.pop_front() else { break };
			self.send.push_back(rec);
			self.send_count += 1;
			self.queue_count -= 1;
		}

		for _ in 0..count {
			let id = inp.r_8()?;
			let submsg_count = inp.r_vlen29()?;
			let deliver = id == self.last_ack.wrapping_add(1);

			for _ in 0..submsg_count {
				let len = inp.r_vlen29()? as usize;
				let bytes = inp.read_slice(len)?;

				if deliver {
					on_msg(bytes);
				}
			}

			if deliver {
				self.last_ack = self.last_ack.wrapping_add(1);
			}
		}

		Ok(())
	}
}
