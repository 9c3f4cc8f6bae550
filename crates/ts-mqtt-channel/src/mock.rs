//! Mock transport for testing without a real broker.
//!
//! Records every channel call (opened URLs, connects, publishes,
//! subscriptions) in shared state, so a test can keep a [`MockChannel`]
//! handle after the shadow client has taken ownership of its clone.
//! Completions are injected by hand, either straight into
//! `ShadowClient::handle` or through [`MockChannel::inject`] and the
//! [`MockDriver`].

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::channel::{ChannelDriver, ChannelEvent, ConnectOptions, MessageChannel, Transport};
use crate::error::{MqttError, MqttResult};

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Payload decoded as JSON (`Value::Null` if it is not JSON).
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or_default()
    }
}

#[derive(Default)]
struct MockState {
    opened: Vec<(String, String)>,
    connects: Vec<ConnectOptions>,
    disconnects: usize,
    open: bool,
    published: Vec<PublishedMessage>,
    subscriptions: Vec<String>,
    unsubscriptions: Vec<String>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
    fail_next_subscribe: Option<String>,
    fail_next_unsubscribe: Option<String>,
    /// One slot per `open`, in order; `None` once closed.
    injectors: Vec<Option<mpsc::UnboundedSender<ChannelEvent>>>,
}

/// Mock implementation of both [`MessageChannel`] and [`Transport`].
///
/// Clones share state. `send` succeeds between `connect` and `disconnect`
/// without waiting for a connect ack; `disconnect` on a channel that is not
/// open fails, like a real client would.
#[derive(Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        crate::lock(&self.state)
    }

    /// `(url, client_id)` of every `Transport::open` call.
    pub fn opened(&self) -> Vec<(String, String)> {
        self.state().opened.clone()
    }

    /// URL of the most recent `Transport::open` call.
    pub fn last_url(&self) -> Option<String> {
        self.state().opened.last().map(|(url, _)| url.clone())
    }

    pub fn connects(&self) -> Vec<ConnectOptions> {
        self.state().connects.clone()
    }

    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.state().published.last().cloned()
    }

    /// Get published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Get all subscription filters, in request order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.state().subscriptions.clone()
    }

    pub fn unsubscriptions(&self) -> Vec<String> {
        self.state().unsubscriptions.clone()
    }

    /// Check whether a subscription was made to the given filter.
    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.state().subscriptions.iter().any(|f| f == filter)
    }

    pub fn fail_next_connect(&self, error: impl Into<String>) {
        self.state().fail_next_connect = Some(error.into());
    }

    pub fn fail_next_send(&self, error: impl Into<String>) {
        self.state().fail_next_send = Some(error.into());
    }

    pub fn fail_next_subscribe(&self, error: impl Into<String>) {
        self.state().fail_next_subscribe = Some(error.into());
    }

    pub fn fail_next_unsubscribe(&self, error: impl Into<String>) {
        self.state().fail_next_unsubscribe = Some(error.into());
    }

    /// Queue an event for the driver handed out by the latest `open`.
    pub fn inject(&self, event: ChannelEvent) -> bool {
        let latest = self.state().injectors.len().checked_sub(1);
        latest.is_some_and(|index| self.inject_into(index, event))
    }

    /// Queue an event for the driver handed out by the `index`-th `open`
    /// (0-based), e.g. a late completion from a replaced channel.
    pub fn inject_into(&self, index: usize, event: ChannelEvent) -> bool {
        match self.state().injectors.get(index) {
            Some(Some(tx)) => tx.send(event).is_ok(),
            _ => false,
        }
    }

    /// Drop the latest injector so its driver reports the channel closed.
    pub fn close_driver(&self) {
        if let Some(slot) = self.state().injectors.last_mut() {
            *slot = None;
        }
    }

    /// Clear recorded calls (failure switches and the injector are kept).
    pub fn reset(&self) {
        let mut state = self.state();
        state.published.clear();
        state.subscriptions.clear();
        state.unsubscriptions.clear();
        state.connects.clear();
        state.disconnects = 0;
    }
}

impl MessageChannel for MockChannel {
    fn connect(&mut self, options: &ConnectOptions) -> MqttResult<()> {
        let mut state = self.state();
        state.connects.push(options.clone());
        if let Some(error) = state.fail_next_connect.take() {
            return Err(MqttError::Connection(error));
        }
        state.open = true;
        Ok(())
    }

    fn disconnect(&mut self) -> MqttResult<()> {
        let mut state = self.state();
        if !state.open {
            return Err(MqttError::Connection("not connected".into()));
        }
        state.open = false;
        state.disconnects += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state().open
    }

    fn send(&mut self, topic: &str, payload: &[u8]) -> MqttResult<()> {
        let mut state = self.state();
        if let Some(error) = state.fail_next_send.take() {
            return Err(MqttError::Publish(error));
        }
        if !state.open {
            return Err(MqttError::Publish("not connected".into()));
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn subscribe(&mut self, filter: &str) -> MqttResult<()> {
        let mut state = self.state();
        if let Some(error) = state.fail_next_subscribe.take() {
            return Err(MqttError::Subscribe(error));
        }
        state.subscriptions.push(filter.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, filter: &str) -> MqttResult<()> {
        let mut state = self.state();
        if let Some(error) = state.fail_next_unsubscribe.take() {
            return Err(MqttError::Subscribe(error));
        }
        state.unsubscriptions.push(filter.to_string());
        Ok(())
    }
}

/// Driver fed by [`MockChannel::inject`].
pub struct MockDriver {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

#[async_trait]
impl ChannelDriver for MockDriver {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }
}

impl Transport for MockChannel {
    type Channel = MockChannel;
    type Driver = MockDriver;

    fn open(&self, url: &str, client_id: &str) -> MqttResult<(MockChannel, MockDriver)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        state.opened.push((url.to_string(), client_id.to_string()));
        state.injectors.push(Some(tx));
        Ok((self.clone(), MockDriver { rx }))
    }
}
