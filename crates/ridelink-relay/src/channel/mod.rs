//! Location channel: per-connection session logic and the long-poll transport.
//! The WebSocket transport lives in `server::ws`.

pub mod polling;
pub mod session;

pub use polling::{PollError, PollRegistry};
pub use session::ChannelSession;
