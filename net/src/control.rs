//! The 2-bit control field carried in every datagram header, and the 3-bit
//! kick reason that follows a `NOTICE_KICK`/`NoticeKick`.

/// Client-outbound control state (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientControl {
	#[default]
	None = 0,
	NoticeConnecting = 1,
	NoticeDisconnect = 2,
	NoticeResetTickCount = 3,
}

impl ClientControl {
	pub fn from_bits(bits: u8) -> Self {
		match bits & 0b11 {
			0 => Self::None,
			1 => Self::NoticeConnecting,
			2 => Self::NoticeDisconnect,
			3 => Self::NoticeResetTickCount,
			_ => unreachable!("masked to 2 bits"),
		}
	}

	pub fn bits(self) -> u8 {
		self as u8
	}
}

/// Server-outbound control state (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerControl {
	#[default]
	None = 0,
	PendingConnection = 1,
	NoticeKick = 2,
	RequestResetTickCount = 3,
}

impl ServerControl {
	pub fn from_bits(bits: u8) -> Self {
		match bits & 0b11 {
			0 => Self::None,
			1 => Self::PendingConnection,
			2 => Self::NoticeKick,
			3 => Self::RequestResetTickCount,
			_ => unreachable!("masked to 2 bits"),
		}
	}

	pub fn bits(self) -> u8 {
		self as u8
	}
}

/// 3-bit reason attached to a `NOTICE_KICK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickReason {
	None = 0,
	Disconnect = 1,
	ServerClosing = 2,
	ConnectionTimeout = 3,
	ConnectionRefused = 4,
}

impl KickReason {
	pub fn from_bits(bits: u8) -> Self {
		match bits & 0b111 {
			0 => Self::None,
			1 => Self::Disconnect,
			2 => Self::ServerClosing,
			3 => Self::ConnectionTimeout,
			4 => Self::ConnectionRefused,
			other => {
				log::warn!("unrecognised kick reason bits {other}, treating as None");
				Self::None
			}
		}
	}

	pub fn bits(self) -> u8 {
		self as u8
	}
}

/// `on_connect`'s verdict, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
	Allow,
	Refuse,
	Again,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn client_control_roundtrips_through_bits() {
		for c in [
			ClientControl::None,
			ClientControl::NoticeConnecting,
			ClientControl::NoticeDisconnect,
			ClientControl::NoticeResetTickCount,
		] {
			assert_eq!(ClientControl::from_bits(c.bits()), c);
		}
	}

	#[test]
	fn server_control_roundtrips_through_bits() {
		for c in [
			ServerControl::None,
			ServerControl::PendingConnection,
			ServerControl::NoticeKick,
			ServerControl::RequestResetTickCount,
		] {
			assert_eq!(ServerControl::from_bits(c.bits()), c);
		}
	}

	#[test]
	fn kick_reason_roundtrips_through_bits() {
		for r in [
			KickReason::None,
			KickReason::Disconnect,
			KickReason::ServerClosing,
			KickReason::ConnectionTimeout,
			KickReason::ConnectionRefused,
		] {
			assert_eq!(KickReason::from_bits(r.bits()), r);
		}
	}
}
