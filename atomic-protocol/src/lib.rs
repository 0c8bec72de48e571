//! atomic-protocol: Transport metadata for the atomic session engine
//!
//! This crate defines the session/channel request payloads a remote-shell
//! transport delivers to a session, and the telnet framing used by the
//! bundled line transport.

pub mod requests;
pub mod telnet;

// Re-export main types at crate root
pub use requests::{ChannelRequest, RequestError};
pub use telnet::{negotiation_preamble, CodecError, Negotiation, TelnetCodec, TelnetEvent};

/// Hard cap on environment entries accepted per session
pub const DEFAULT_MAX_ENV_ENTRIES: usize = 1000;
