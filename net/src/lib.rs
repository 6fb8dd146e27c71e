//! Ufavonet: a tick-driven, connection-oriented messaging protocol over UDP.
//!
//! The crate is split into a client engine ([`Client`]) and a server engine
//! ([`Server`]), both single-threaded and synchronous: the owning
//! application drives them by calling `process()` once per tick and never
//! re-enters it from inside a callback.

mod client;
mod control;
mod conn;
mod events;
mod message;
mod server;
mod settings;
mod socket;
#[cfg(test)]
mod test_support;
mod tick;

pub use client::Client;
pub use control::{ClientControl, ConnectResult, KickReason, ServerControl};
pub use events::{ClientEvents, ServerEvents, Stats};
pub use server::{ClientHandle, Server};
pub use settings::{Settings, SettingsError};
pub use socket::Socket;

/// Maximum UDP datagram size the engines will read or write (§6).
pub const MAX_DATAGRAM: usize = 65535;
