/// Fields an engine consults every tick; immutable after construction.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Settings {
	/// Server-only: ticks a pending (unauthenticated) client may remain
	/// before it is kicked with `CONNECTION_TIMEOUT`.
	pub pending_conn_timeout_tick: u16,
	/// Ticks with no accepted inbound packet before the peer is declared lost.
	pub timeout_tick: u16,
	/// Outbound kick/disconnect notices sent before the connection is torn
	/// down and the record freed.
	pub kick_notice_tick: u16,
	/// Half-width of the tick-filter acceptance window.
	pub expected_tick_tolerance: u16,
}

/// Half of the 16-bit tick space; both `pending_conn_timeout_tick` and
/// `expected_tick_tolerance` must stay at or below this so a single
/// modular comparison cannot be ambiguous between "ahead" and "behind".
pub const MAX_MODULAR_FIELD: u16 = 16384;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
	#[error("pending_conn_timeout_tick must be <= {MAX_MODULAR_FIELD}")]
	PendingConnTimeoutTooLarge,
	#[error("expected_tick_tolerance must be <= {MAX_MODULAR_FIELD}")]
	ToleranceTooLarge,
}

impl Settings {
	pub fn new(
		pending_conn_timeout_tick: u16,
		timeout_tick: u16,
		kick_notice_tick: u16,
		expected_tick_tolerance: u16,
	) -> Result<Self, SettingsError> {
		if pending_conn_timeout_tick > MAX_MODULAR_FIELD {
			return Err(SettingsError::PendingConnTimeoutTooLarge);
		}

		if expected_tick_tolerance > MAX_MODULAR_FIELD {
			return Err(SettingsError::ToleranceTooLarge);
		}

		Ok(Self { pending_conn_timeout_tick, timeout_tick, kick_notice_tick, expected_tick_tolerance })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_out_of_range_fields() {
		assert_eq!(Settings::new(16385, 100, 10, 100), Err(SettingsError::PendingConnTimeoutTooLarge));
		assert_eq!(Settings::new(100, 100, 10, 16385), Err(SettingsError::ToleranceTooLarge));
	}

	#[test]
	fn accepts_boundary_values() {
		assert!(Settings::new(16384, 100, 10, 16384).is_ok());
	}
}
