//! Wyoming protocol adapter
//!
//! Streaming and discovery transport used by home-automation controllers:
//! newline-delimited JSON event headers with optional binary payloads.

pub mod protocol;
pub mod server;

pub use protocol::{event_type, read_event, write_event, Event, PROTOCOL_VERSION};
pub use server::{handle_connection, info_event, synthesize_params, WyomingServer};
