/// Mirrors the C implementation's `enum packeterr` taxonomy.
///
/// `Null` is kept for parity with that taxonomy even though a `PacketBuffer`
/// is always a valid owned value in Rust — it is reserved for callers one
/// layer up that model "no packet available" as a distinct failure (e.g. a
/// client record with no pending outbound packet).
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum PacketError {
	#[error("no packet is available")]
	Null,
	#[error("operation would exceed the buffer's bounds")]
	OutOfBounds,
	#[error("allocation failed")]
	OutOfMemory,
}
