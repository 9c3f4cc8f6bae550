//! Connection manager: owns one [`MessageChannel`] and turns its raw
//! outcomes into named `mq.*` events.
//!
//! Synchronous channel errors are never returned to the caller. A failed
//! publish becomes `mq.publish.failed`, a failed subscribe becomes
//! `mq.subscribe.fail`, and so on. There is no reconnect: after
//! `mq.connection.fail` the manager stays disconnected.

use crate::channel::{AckResponse, ChannelEvent, ConnectOptions, InboundMessage, MessageChannel};
use crate::events::{Event, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEventKind {
    ConnectionSuccess,
    ConnectionFail,
    PublishFailed,
    SubscribeSuccess,
    SubscribeFail,
    UnsubscribeSuccess,
    UnsubscribeFail,
    MessageArrived,
}

impl ConnectionEventKind {
    pub const ALL: [Self; 8] = [
        Self::ConnectionSuccess,
        Self::ConnectionFail,
        Self::PublishFailed,
        Self::SubscribeSuccess,
        Self::SubscribeFail,
        Self::UnsubscribeSuccess,
        Self::UnsubscribeFail,
        Self::MessageArrived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionSuccess => "mq.connection.success",
            Self::ConnectionFail => "mq.connection.fail",
            Self::PublishFailed => "mq.publish.failed",
            Self::SubscribeSuccess => "mq.subscribe.success",
            Self::SubscribeFail => "mq.subscribe.fail",
            Self::UnsubscribeSuccess => "mq.unsubscribe.success",
            Self::UnsubscribeFail => "mq.unsubscribe.fail",
            Self::MessageArrived => "mq.message.arrived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectionSuccess,
    ConnectionFail { reason: String },
    PublishFailed { topic: String, error: String },
    SubscribeSuccess { topic: String, response: AckResponse },
    SubscribeFail { topic: String, response: AckResponse },
    UnsubscribeSuccess { topic: String, response: AckResponse },
    UnsubscribeFail { topic: String, response: AckResponse },
    MessageArrived(InboundMessage),
}

impl Event for ConnectionEvent {
    type Kind = ConnectionEventKind;

    fn kind(&self) -> ConnectionEventKind {
        match self {
            Self::ConnectionSuccess => ConnectionEventKind::ConnectionSuccess,
            Self::ConnectionFail { .. } => ConnectionEventKind::ConnectionFail,
            Self::PublishFailed { .. } => ConnectionEventKind::PublishFailed,
            Self::SubscribeSuccess { .. } => ConnectionEventKind::SubscribeSuccess,
            Self::SubscribeFail { .. } => ConnectionEventKind::SubscribeFail,
            Self::UnsubscribeSuccess { .. } => ConnectionEventKind::UnsubscribeSuccess,
            Self::UnsubscribeFail { .. } => ConnectionEventKind::UnsubscribeFail,
            Self::MessageArrived(_) => ConnectionEventKind::MessageArrived,
        }
    }
}

/// Wraps exactly one channel for its whole lifetime.
pub struct ConnectionManager<C: MessageChannel> {
    channel: C,
    client_id: String,
    options: ConnectOptions,
    state: ConnectionState,
    events: EventBus<ConnectionEvent>,
}

impl<C: MessageChannel> ConnectionManager<C> {
    pub fn new(channel: C, client_id: impl Into<String>) -> Self {
        Self {
            channel,
            client_id: client_id.into(),
            options: ConnectOptions::default(),
            state: ConnectionState::Disconnected,
            events: EventBus::new(),
        }
    }

    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn on<F>(&mut self, kind: ConnectionEventKind, handler: F)
    where
        F: FnMut(&ConnectionEvent) + Send + 'static,
    {
        self.events.on(kind, handler);
    }

    pub fn emit(&mut self, event: ConnectionEvent) -> usize {
        let kind = event.kind();
        let listeners = self.events.emit(&event);
        tracing::trace!(event = kind.as_str(), listeners, "connection event");
        listeners
    }

    /// Ask the channel to connect. Outcome arrives through [`Self::handle`].
    pub fn connect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            tracing::debug!(client_id = %self.client_id, state = ?self.state, "connect ignored");
            return;
        }

        tracing::info!(client_id = %self.client_id, "connecting");
        self.state = ConnectionState::Connecting;
        if let Err(e) = self.channel.connect(&self.options) {
            self.fail(e.to_string());
        }
    }

    /// Tear down the channel. No-op when already disconnected.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        self.state = ConnectionState::Disconnected;
        match self.channel.disconnect() {
            Ok(()) => tracing::info!(client_id = %self.client_id, "disconnected"),
            Err(e) => tracing::warn!(client_id = %self.client_id, error = %e, "disconnect failed"),
        }
    }

    pub fn publish(&mut self, destination: &str, payload: &[u8]) {
        match self.channel.send(destination, payload) {
            Ok(()) => tracing::debug!(topic = %destination, bytes = payload.len(), "published"),
            Err(e) => {
                tracing::warn!(topic = %destination, error = %e, "publish failed");
                self.emit(ConnectionEvent::PublishFailed {
                    topic: destination.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    pub fn subscribe(&mut self, topic: &str) {
        if let Err(e) = self.channel.subscribe(topic) {
            tracing::warn!(topic = %topic, error = %e, "subscribe failed");
            self.emit(ConnectionEvent::SubscribeFail {
                topic: topic.to_string(),
                response: AckResponse::failure(e.to_string()),
            });
        }
    }

    pub fn unsubscribe(&mut self, topic: &str) {
        if let Err(e) = self.channel.unsubscribe(topic) {
            tracing::warn!(topic = %topic, error = %e, "unsubscribe failed");
            self.emit(ConnectionEvent::UnsubscribeFail {
                topic: topic.to_string(),
                response: AckResponse::failure(e.to_string()),
            });
        }
    }

    /// Translate one channel completion into its `mq.*` event.
    pub fn handle(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                if self.state != ConnectionState::Connecting {
                    tracing::debug!(state = ?self.state, "unexpected connect ack ignored");
                    return;
                }
                self.state = ConnectionState::Connected;
                tracing::info!(client_id = %self.client_id, "connected");
                self.emit(ConnectionEvent::ConnectionSuccess);
            }
            ChannelEvent::ConnectFailed { reason } | ChannelEvent::ConnectionLost { reason } => {
                if self.state == ConnectionState::Disconnected {
                    tracing::debug!(reason = %reason, "connection loss after disconnect ignored");
                    return;
                }
                self.fail(reason);
            }
            ChannelEvent::SubscribeAck { filter, response } => {
                self.emit(ConnectionEvent::SubscribeSuccess {
                    topic: filter,
                    response,
                });
            }
            ChannelEvent::SubscribeFailed { filter, response } => {
                tracing::warn!(topic = %filter, code = response.code, "subscription refused");
                self.emit(ConnectionEvent::SubscribeFail {
                    topic: filter,
                    response,
                });
            }
            ChannelEvent::UnsubscribeAck { filter, response } => {
                self.emit(ConnectionEvent::UnsubscribeSuccess {
                    topic: filter,
                    response,
                });
            }
            ChannelEvent::UnsubscribeFailed { filter, response } => {
                tracing::warn!(topic = %filter, code = response.code, "unsubscribe refused");
                self.emit(ConnectionEvent::UnsubscribeFail {
                    topic: filter,
                    response,
                });
            }
            ChannelEvent::Message(message) => {
                tracing::debug!(topic = %message.topic, bytes = message.payload.len(), "message arrived");
                self.emit(ConnectionEvent::MessageArrived(message));
            }
        }
    }

    fn fail(&mut self, reason: String) {
        tracing::warn!(client_id = %self.client_id, reason = %reason, "connection failed");
        self.state = ConnectionState::Disconnected;
        self.emit(ConnectionEvent::ConnectionFail { reason });
    }
}
