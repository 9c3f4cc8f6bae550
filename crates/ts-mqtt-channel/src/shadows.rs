//! AWS IoT Device Shadow session for one named thing.
//!
//! [`ShadowClient`] signs a connection URL, opens a channel through its
//! [`Transport`], subscribes to the `get/+` and `update/+` response
//! wildcards once connected, and republishes everything as `thing.*`
//! events. Requests are fire-and-forget: `get`/`update` hand back the
//! `clientToken` they used and the caller matches it against the token in
//! later `thing.get.message.*` / `thing.update.message.*` payloads. No
//! timeout or retry is applied to outstanding requests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;

use ts_protocol::{ClientToken, ShadowEnvelope, ShadowResponse, topics};

use crate::channel::{AckResponse, ChannelDriver, ChannelEvent, Transport};
use crate::config::ShadowConfig;
use crate::connection::{ConnectionEvent, ConnectionEventKind, ConnectionManager};
use crate::error::{MqttError, MqttResult};
use crate::events::{Event, EventBus};
use crate::handler::{IncomingMessage, classify};
use crate::lock;
use crate::sigv4::SignedRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThingEventKind {
    ConnectionSuccess,
    ConnectionFail,
    SubscribeSuccess,
    SubscribeFail,
    UnsubscribeSuccess,
    UnsubscribeFail,
    PublishFailed,
    GetAccepted,
    GetRejected,
    UpdateAccepted,
    UpdateRejected,
    UpdateDocuments,
    UpdateDelta,
}

impl ThingEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionSuccess => "thing.connection.success",
            Self::ConnectionFail => "thing.connection.fail",
            Self::SubscribeSuccess => "thing.subscribe.success",
            Self::SubscribeFail => "thing.subscribe.fail",
            Self::UnsubscribeSuccess => "thing.unsubscribe.success",
            Self::UnsubscribeFail => "thing.unsubscribe.fail",
            Self::PublishFailed => "thing.publish.failed",
            Self::GetAccepted => "thing.get.message.accepted",
            Self::GetRejected => "thing.get.message.rejected",
            Self::UpdateAccepted => "thing.update.message.accepted",
            Self::UpdateRejected => "thing.update.message.rejected",
            Self::UpdateDocuments => "thing.update.message.documents",
            Self::UpdateDelta => "thing.update.message.delta",
        }
    }
}

impl From<ShadowResponse> for ThingEventKind {
    fn from(response: ShadowResponse) -> Self {
        match response {
            ShadowResponse::GetAccepted => Self::GetAccepted,
            ShadowResponse::GetRejected => Self::GetRejected,
            ShadowResponse::UpdateAccepted => Self::UpdateAccepted,
            ShadowResponse::UpdateRejected => Self::UpdateRejected,
            ShadowResponse::UpdateDocuments => Self::UpdateDocuments,
            ShadowResponse::UpdateDelta => Self::UpdateDelta,
        }
    }
}

/// Events observable by code embedding a [`ShadowClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum ThingEvent {
    ConnectionSuccess,
    ConnectionFail { reason: String },
    SubscribeSuccess { topic: String, response: AckResponse },
    SubscribeFail { topic: String, response: AckResponse },
    UnsubscribeSuccess { topic: String, response: AckResponse },
    UnsubscribeFail { topic: String, response: AckResponse },
    PublishFailed { topic: String, error: String },
    /// One of the six shadow responses, with its parsed JSON body.
    Message {
        response: ShadowResponse,
        payload: Value,
    },
}

impl ThingEvent {
    /// Parsed body of a shadow response event.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Message { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

impl Event for ThingEvent {
    type Kind = ThingEventKind;

    fn kind(&self) -> ThingEventKind {
        match self {
            Self::ConnectionSuccess => ThingEventKind::ConnectionSuccess,
            Self::ConnectionFail { .. } => ThingEventKind::ConnectionFail,
            Self::SubscribeSuccess { .. } => ThingEventKind::SubscribeSuccess,
            Self::SubscribeFail { .. } => ThingEventKind::SubscribeFail,
            Self::UnsubscribeSuccess { .. } => ThingEventKind::UnsubscribeSuccess,
            Self::UnsubscribeFail { .. } => ThingEventKind::UnsubscribeFail,
            Self::PublishFailed { .. } => ThingEventKind::PublishFailed,
            Self::Message { response, .. } => (*response).into(),
        }
    }
}

type Inbox = Arc<Mutex<VecDeque<ConnectionEvent>>>;

/// Driver for one registration, tagged with the registration it belongs to.
///
/// Events from a driver whose registration has since been replaced are
/// dropped by [`ShadowClient::drive`].
pub struct ShadowDriver<D> {
    generation: u64,
    inner: D,
}

impl<D> ShadowDriver<D> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

/// One shadow synchronization session.
pub struct ShadowClient<T: Transport> {
    config: ShadowConfig,
    client_id: String,
    transport: T,
    connection: Option<ConnectionManager<T::Channel>>,
    /// Bumped by every `register`.
    generation: u64,
    /// `mq.*` events queued by the connection's listeners, drained after
    /// every call into the connection.
    inbox: Inbox,
    events: EventBus<ThingEvent>,
}

impl<T: Transport> ShadowClient<T> {
    /// The client ID is resolved here, once, and reused by every `register`.
    pub fn new(config: ShadowConfig, transport: T) -> Self {
        let client_id = config.resolve_client_id();
        Self {
            config,
            client_id,
            transport,
            connection: None,
            generation: 0,
            inbox: Arc::new(Mutex::new(VecDeque::new())),
            events: EventBus::new(),
        }
    }

    pub fn thing_name(&self) -> &str {
        &self.config.thing_name
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(ConnectionManager::is_connected)
    }

    /// Registration the current connection belongs to (0 before the first).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn connection(&self) -> Option<&ConnectionManager<T::Channel>> {
        self.connection.as_ref()
    }

    /// Mutable access to the current connection, e.g. to listen on `mq.*`.
    pub fn connection_mut(&mut self) -> Option<&mut ConnectionManager<T::Channel>> {
        self.connection.as_mut()
    }

    pub fn on<F>(&mut self, kind: ThingEventKind, handler: F)
    where
        F: FnMut(&ThingEvent) + Send + 'static,
    {
        self.events.on(kind, handler);
    }

    /// Sign a URL for the current time and start connecting.
    pub fn register(&mut self) -> MqttResult<ShadowDriver<T::Driver>> {
        self.register_at(Utc::now())
    }

    /// [`Self::register`] with an explicit signing time.
    ///
    /// Every call opens a fresh channel; a previous connection is
    /// disconnected and replaced.
    pub fn register_at(&mut self, now: DateTime<Utc>) -> MqttResult<ShadowDriver<T::Driver>> {
        if let Some(mut previous) = self.connection.take() {
            previous.disconnect();
        }

        let signed = SignedRequest::build(&self.config.credentials, &self.config.endpoint, now);
        let (channel, driver) = self.transport.open(&signed.url, &self.client_id)?;
        self.generation += 1;

        let mut connection = ConnectionManager::new(channel, self.client_id.clone());
        for kind in ConnectionEventKind::ALL {
            let inbox = self.inbox.clone();
            connection.on(kind, move |event| lock(&inbox).push_back(event.clone()));
        }

        tracing::info!(
            thing_name = %self.config.thing_name,
            client_id = %self.client_id,
            endpoint = %self.config.endpoint,
            amz_date = %signed.amz_date,
            generation = self.generation,
            "registering shadow client"
        );

        connection.connect();
        self.connection = Some(connection);
        self.pump();
        Ok(ShadowDriver {
            generation: self.generation,
            inner: driver,
        })
    }

    /// Unsubscribe both response wildcards, then disconnect. Acks for the
    /// unsubscribes are not awaited.
    pub fn unregister(&mut self) -> MqttResult<()> {
        let get_responses = topics::get_responses(&self.config.thing_name);
        let update_responses = topics::update_responses(&self.config.thing_name);

        let connection = self.connection.as_mut().ok_or(MqttError::NotRegistered)?;
        connection.unsubscribe(&get_responses);
        connection.unsubscribe(&update_responses);
        connection.disconnect();
        self.pump();

        tracing::info!(thing_name = %self.config.thing_name, "shadow client unregistered");
        Ok(())
    }

    /// Request the current shadow document.
    ///
    /// Returns the token the response will echo, without waiting for it.
    pub fn get(&mut self, client_token: Option<ClientToken>) -> MqttResult<ClientToken> {
        let token = client_token.unwrap_or_else(ClientToken::generate);
        let topic = topics::get(&self.config.thing_name);
        self.publish(&topic, &ShadowEnvelope::get(token.clone()))?;
        Ok(token)
    }

    /// Publish `state` (e.g. `{"state": {"reported": {...}}}`) with a
    /// `clientToken` stamped onto it.
    ///
    /// `None` or JSON `null` publishes nothing and returns `Ok(None)`.
    pub fn update(
        &mut self,
        state: Option<Value>,
        client_token: Option<ClientToken>,
    ) -> MqttResult<Option<ClientToken>> {
        let state = match state {
            None | Some(Value::Null) => {
                tracing::debug!(thing_name = %self.config.thing_name, "update without state ignored");
                return Ok(None);
            }
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(MqttError::InvalidState(format!(
                    "expected a JSON object, got {other}"
                )));
            }
        };

        let token = client_token.unwrap_or_else(ClientToken::generate);
        let topic = topics::update(&self.config.thing_name);
        self.publish(&topic, &ShadowEnvelope::update(state, token.clone()))?;
        Ok(Some(token))
    }

    /// Feed one completion of the current channel through the connection
    /// and dispatch the resulting events, end to end, before returning.
    pub fn handle(&mut self, event: ChannelEvent) {
        let Some(connection) = self.connection.as_mut() else {
            tracing::debug!(?event, "channel event dropped, client not registered");
            return;
        };
        connection.handle(event);
        self.pump();
    }

    /// [`Self::handle`] for an event read from the driver of registration
    /// `generation`. Events from a replaced registration are dropped.
    pub fn handle_from(&mut self, generation: u64, event: ChannelEvent) {
        if generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                ?event,
                "event from replaced channel dropped"
            );
            return;
        }
        self.handle(event);
    }

    /// Process the next event from `driver`. Returns `false` once the
    /// driver is closed.
    pub async fn drive(&mut self, driver: &mut ShadowDriver<T::Driver>) -> bool {
        match driver.inner.next_event().await {
            Some(event) => {
                self.handle_from(driver.generation, event);
                true
            }
            None => false,
        }
    }

    fn publish(&mut self, topic: &str, envelope: &ShadowEnvelope) -> MqttResult<()> {
        let payload =
            serde_json::to_vec(envelope).map_err(|e| MqttError::Serialization(e.to_string()))?;
        let connection = self.connection.as_mut().ok_or(MqttError::NotRegistered)?;
        connection.publish(topic, &payload);
        self.pump();
        Ok(())
    }

    fn pump(&mut self) {
        loop {
            let next = lock(&self.inbox).pop_front();
            let Some(event) = next else {
                break;
            };
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::ConnectionSuccess => {
                self.subscribe_responses();
                self.emit(ThingEvent::ConnectionSuccess);
            }
            ConnectionEvent::ConnectionFail { reason } => {
                self.emit(ThingEvent::ConnectionFail { reason });
            }
            ConnectionEvent::PublishFailed { topic, error } => {
                self.emit(ThingEvent::PublishFailed { topic, error });
            }
            ConnectionEvent::SubscribeSuccess { topic, response } => {
                self.emit(ThingEvent::SubscribeSuccess { topic, response });
            }
            ConnectionEvent::SubscribeFail { topic, response } => {
                self.emit(ThingEvent::SubscribeFail { topic, response });
            }
            ConnectionEvent::UnsubscribeSuccess { topic, response } => {
                self.emit(ThingEvent::UnsubscribeSuccess { topic, response });
            }
            ConnectionEvent::UnsubscribeFail { topic, response } => {
                self.emit(ThingEvent::UnsubscribeFail { topic, response });
            }
            ConnectionEvent::MessageArrived(message) => match classify(&message) {
                IncomingMessage::Shadow {
                    response, payload, ..
                } => {
                    self.emit(ThingEvent::Message { response, payload });
                }
                IncomingMessage::Malformed {
                    response,
                    topic,
                    error,
                } => {
                    tracing::warn!(topic = %topic, response = %response, error = %error, "dropping unparsable shadow payload");
                }
                IncomingMessage::Unknown { topic } => {
                    tracing::debug!(topic = %topic, "ignoring unrecognized message");
                }
            },
        }
    }

    fn subscribe_responses(&mut self) {
        let get_responses = topics::get_responses(&self.config.thing_name);
        let update_responses = topics::update_responses(&self.config.thing_name);
        if let Some(connection) = self.connection.as_mut() {
            connection.subscribe(&get_responses);
            connection.subscribe(&update_responses);
        }
    }

    fn emit(&mut self, event: ThingEvent) {
        let kind = event.kind();
        let listeners = self.events.emit(&event);
        tracing::debug!(event = kind.as_str(), listeners, "thing event");
    }
}
