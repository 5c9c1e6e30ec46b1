//! Client side of the CareLink presence channel.
//!
//! [`PresenceChannel`] keeps one live connection per session to the
//! presence hub, tracks which users an administrator has blocked, hands
//! `force_leave` signals to a consumer callback and sends best-effort
//! `call_ended` notifications. Connections use WebSocket first and fall
//! back to HTTP long-polling, and are re-established with capped
//! exponential backoff when they drop.

pub mod block_status;
pub mod channel;
pub mod config;
pub mod events;
pub mod reconnect;
pub mod state;
pub mod transport;

mod driver;
mod processor;
mod router;

pub use block_status::BlockStatusMap;
pub use channel::{ForceLeaveHandler, PresenceChannel, PresenceChannelBuilder};
pub use config::{ConfigError, PresenceConfig};
pub use events::ChannelEvent;
pub use reconnect::ReconnectConfig;
pub use state::{ConnectionSnapshot, ConnectionState};
pub use transport::{Connector, Transport, TransportError, TransportKind};
