//! Push channel: connection lifecycle, transport and message envelope.

mod connection;
mod heartbeat;
pub mod messages;
mod reconnect_policy;
mod transport;

pub use connection::{ConnectionManager, ConnectionState};
pub use heartbeat::Heartbeat;
pub use messages::{decode_frame, ClientMessage, PushFrame, ServerMessage};
pub use reconnect_policy::ReconnectPolicy;
pub use transport::{PushStream, PushTransport, TransportError, WebSocketTransport};
