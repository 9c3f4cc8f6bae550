//! Signed websocket MQTT channel and device shadow client for AWS IoT Core.
//!
//! - `sigv4` presigns the `wss://{host}/mqtt` connection URL
//! - `MessageChannel` / `Transport` abstract the publish/subscribe transport
//! - `RumqttTransport` for production, `MockChannel` for tests
//! - `ConnectionManager` turns channel outcomes into `mq.*` events
//! - `ShadowClient` drives one shadow session and emits `thing.*` events

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod handler;
pub mod mock;
pub mod rumqtt;
pub mod shadows;
pub mod sigv4;

use std::sync::{Mutex, MutexGuard, PoisonError};

// Re-exports for convenience.
pub use channel::{
    AckResponse, ChannelDriver, ChannelEvent, ConnectOptions, InboundMessage, MessageChannel,
    ProtocolVersion, Transport,
};
pub use config::{Credentials, ShadowConfig};
pub use connection::{ConnectionEvent, ConnectionEventKind, ConnectionManager, ConnectionState};
pub use error::{MqttError, MqttResult};
pub use events::{Event, EventBus};
pub use handler::{IncomingMessage, classify};
pub use mock::MockChannel;
pub use rumqtt::RumqttTransport;
pub use shadows::{ShadowClient, ShadowDriver, ThingEvent, ThingEventKind};
pub use sigv4::{SignedRequest, sign};

/// Listener state is only touched from one task; a poisoned lock still
/// holds consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
