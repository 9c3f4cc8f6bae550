//! Message channel abstraction: the black-box publish/subscribe transport.
//!
//! A [`Transport`] opens one [`MessageChannel`] bound to one signed URL and
//! hands back a [`ChannelDriver`] alongside it. Channel calls return
//! immediately; their outcomes (connect ack, subscribe ack, inbound
//! publishes, connection loss) surface later as [`ChannelEvent`]s pulled
//! from the driver.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::MqttResult;

/// MQTT protocol revision requested on connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V3_1,
    V3_1_1,
}

/// Options passed to [`MessageChannel::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub use_ssl: bool,
    pub timeout: Duration,
    pub protocol: ProtocolVersion,
}

impl Default for ConnectOptions {
    /// TLS websocket, 3 s connect timeout, MQTT 3.1.1.
    fn default() -> Self {
        Self {
            use_ssl: true,
            timeout: Duration::from_secs(3),
            protocol: ProtocolVersion::V3_1_1,
        }
    }
}

/// Raw broker response attached to subscribe/unsubscribe outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckResponse {
    /// Granted QoS on success, `0x80` on a refused subscription.
    pub code: u8,
    pub detail: Option<String>,
}

impl AckResponse {
    pub const FAILURE: u8 = 0x80;

    pub fn granted(qos: u8) -> Self {
        Self {
            code: qos,
            detail: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            code: Self::FAILURE,
            detail: Some(detail.into()),
        }
    }
}

/// A publish delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Asynchronous completion reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    ConnectFailed { reason: String },
    ConnectionLost { reason: String },
    SubscribeAck { filter: String, response: AckResponse },
    SubscribeFailed { filter: String, response: AckResponse },
    UnsubscribeAck { filter: String, response: AckResponse },
    UnsubscribeFailed { filter: String, response: AckResponse },
    Message(InboundMessage),
}

/// Non-blocking handle on one underlying connection.
///
/// An `Err` from any method is the synchronous failure of that call; the
/// asynchronous outcome of a successful call arrives as a [`ChannelEvent`].
pub trait MessageChannel: Send {
    fn connect(&mut self, options: &ConnectOptions) -> MqttResult<()>;

    fn disconnect(&mut self) -> MqttResult<()>;

    fn is_connected(&self) -> bool;

    /// Publish a raw payload to a topic.
    fn send(&mut self, topic: &str, payload: &[u8]) -> MqttResult<()>;

    /// Subscribe to a topic filter.
    fn subscribe(&mut self, filter: &str) -> MqttResult<()>;

    fn unsubscribe(&mut self, filter: &str) -> MqttResult<()>;
}

/// Source of [`ChannelEvent`]s for one channel.
#[async_trait]
pub trait ChannelDriver: Send {
    /// Next completion, or `None` once the channel is closed for good.
    async fn next_event(&mut self) -> Option<ChannelEvent>;
}

/// Factory for channel/driver pairs.
pub trait Transport {
    type Channel: MessageChannel;
    type Driver: ChannelDriver;

    /// Bind a new channel to a presigned `url` under `client_id`.
    fn open(&self, url: &str, client_id: &str) -> MqttResult<(Self::Channel, Self::Driver)>;
}
