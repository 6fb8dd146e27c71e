//! Application-facing callback surface (§6). Every method runs synchronously
//! on the caller's `process` call and must not re-enter `process` on the
//! same connection.

use packet::PacketBuffer;

pub use crate::control::ConnectResult;
use crate::control::KickReason;
use crate::server::ClientHandle;

/// Callbacks for a [`crate::client::Client`].
pub trait ClientEvents {
	/// Called once per tick while connecting, and again whenever the server
	/// re-sends its `PENDING_CONNECTION` payload. `inbound` carries that
	/// payload when this call was triggered by one, `None` on the very
	/// first tick before anything has arrived. Unlike the server side, the
	/// client never accepts or refuses a connection, so there is nothing to
	/// return: the transition to `CONNECTED` is driven entirely by the
	/// server's control field.
	fn on_connect(&mut self, inbound: Option<&mut PacketBuffer>, outbound: &mut PacketBuffer);

	/// Fired exactly once as the connection is torn down, regardless of
	/// cause (kick, timeout, or local disconnect completing).
	fn on_disconnect(&mut self, reason: KickReason);

	/// One reliable sub-message, in delivery order.
	fn on_receive_msg(&mut self, payload: &[u8]);

	/// The unreliable per-tick application payload from the peer.
	fn on_receive_pkt(&mut self, payload: &[u8]);

	/// Write this tick's unreliable application payload.
	fn on_send_pkt(&mut self, outbound: &mut PacketBuffer);

	/// A previously sent reliable message has been acknowledged.
	fn on_message_ack(&mut self, iid: u32);
}

/// Callbacks for a [`crate::server::Server`]. `C` is the per-client
/// `userdata` type the application carries alongside each record. Methods
/// take the whole [`ClientHandle`], not just its `userdata`, so a handler
/// can introspect the address or queue a reliable message in response.
pub trait ServerEvents<C> {
	fn on_connect(
		&mut self,
		client: &mut ClientHandle<C>,
		inbound: &mut PacketBuffer,
		outbound: &mut PacketBuffer,
	) -> ConnectResult;

	fn on_disconnect(&mut self, client: &mut ClientHandle<C>, reason: KickReason);

	fn on_receive_msg(&mut self, client: &mut ClientHandle<C>, payload: &[u8]);

	fn on_receive_pkt(&mut self, client: &mut ClientHandle<C>, payload: &[u8]);

	/// Fired once per tick before the per-client send phase, with no
	/// specific client in scope — a hook for batched bookkeeping.
	fn b_on_send_pkt(&mut self) {}

	fn on_send_pkt(&mut self, client: &mut ClientHandle<C>, outbound: &mut PacketBuffer);

	fn on_message_ack(&mut self, client: &mut ClientHandle<C>, iid: u32);

	/// Fired once, after `close()` has kicked every client and the table
	/// has emptied.
	fn on_srv_close(&mut self) {}
}

/// Cumulative byte counters (§1.1: includes one-shot kick replies and
/// kick-notice retransmissions, not just ordinary established traffic).
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
	pub total_sent_bytes: u64,
	pub total_received_bytes: u64,
}

impl Stats {
	pub(crate) fn record_sent(&mut self, bytes: usize) {
		self.total_sent_bytes += bytes as u64;
	}

	pub(crate) fn record_received(&mut self, bytes: usize) {
		self.total_received_bytes += bytes as u64;
	}
}
