//! Ambient logging setup shared by Ufavonet binaries. The protocol itself is
//! synchronous and single-threaded — there is no reactor here, just the
//! `log` sink.

mod logger;

use logger::Logger;

static LOGGER: Logger = Logger;

/// Installs [`Logger`] as the global `log` sink at the given level. Call
/// once, near the top of `main`.
pub fn init(level: log::LevelFilter) {
	log::set_logger(&LOGGER).expect("logger already installed");
	log::set_max_level(level);
}
