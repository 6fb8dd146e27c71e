//! A linear byte buffer with a byte cursor and a sub-byte "bit cursor"
//! overlay, used to build and parse Ufavonet datagrams.
//!
//! Two flavours exist, selected at construction:
//!
//! - [`PacketBuffer::growable`] may grow in 256-byte increments when a write
//!   would overflow.
//! - [`PacketBuffer::fixed`] is preallocated to a fixed capacity; a write
//!   that would overflow it fails with [`PacketError::OutOfBounds`] instead.

mod buffer;
mod error;

pub use buffer::PacketBuffer;
pub use error::PacketError;

pub type Result<T = ()> = core::result::Result<T, PacketError>;

/// Bytes added to `size` when a growable buffer reallocates, matching the
/// original implementation's allocation granularity.
pub const ALLOC_UNIT: usize = 256;

/// The largest value `w_vlen29`/`r_vlen29` can carry (2^29 - 1).
pub const VLEN29_MAX: u32 = (1 << 29) - 1;
