//! `rumqttc` websocket transport for AWS IoT Core.
//!
//! The presigned `wss://` URL is handed to rumqttc as the broker address,
//! so authentication rides on the query string instead of client
//! certificates. The event loop lives in [`RumqttDriver`]; it is not polled
//! until [`MessageChannel::connect`] is called and it stops for good after
//! the first error, which keeps rumqttc from reconnecting on its own.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use tokio::sync::Notify;

use crate::channel::{
    AckResponse, ChannelDriver, ChannelEvent, ConnectOptions, InboundMessage, MessageChannel,
    ProtocolVersion, Transport,
};
use crate::error::{MqttError, MqttResult};
use crate::lock;

/// Bounded capacity of the rumqttc request queue.
const REQUEST_CAPACITY: usize = 64;
const WSS_PORT: u16 = 443;
const QOS: QoS = QoS::AtMostOnce;

/// State shared between a channel and its driver.
#[derive(Debug, Default)]
struct Shared {
    /// Set by `connect()`; taken by the driver before its first poll.
    requested: Option<ConnectOptions>,
    connected: bool,
    closing: bool,
    /// The disconnect request could not be queued; the driver stops polling
    /// instead of waiting for it to go out.
    abandoned: bool,
    /// Filters in request order, waiting for their outgoing packet id.
    pending_subscribes: VecDeque<String>,
    pending_unsubscribes: VecDeque<String>,
}

/// Opens rumqttc clients over TLS websockets.
#[derive(Debug, Clone)]
pub struct RumqttTransport {
    keep_alive: Duration,
}

impl RumqttTransport {
    pub fn new(keep_alive: Duration) -> Self {
        Self { keep_alive }
    }
}

impl Default for RumqttTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl Transport for RumqttTransport {
    type Channel = RumqttChannel;
    type Driver = RumqttDriver;

    fn open(&self, url: &str, client_id: &str) -> MqttResult<(RumqttChannel, RumqttDriver)> {
        if !url.starts_with("wss://") && !url.starts_with("ws://") {
            return Err(MqttError::Connection(format!(
                "expected a websocket url, got scheme of '{}'",
                url.split(':').next().unwrap_or_default()
            )));
        }

        let mut options = MqttOptions::new(client_id, url, WSS_PORT);
        options.set_keep_alive(self.keep_alive);
        options.set_transport(rumqttc::Transport::wss_with_default_config());

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let shared = Arc::new(Mutex::new(Shared::default()));
        let wake = Arc::new(Notify::new());

        Ok((
            RumqttChannel {
                client,
                shared: shared.clone(),
                wake: wake.clone(),
            },
            RumqttDriver {
                eventloop,
                shared,
                wake,
                subscribes_in_flight: HashMap::new(),
                unsubscribes_in_flight: HashMap::new(),
                started: false,
                closed: false,
            },
        ))
    }
}

// ── RumqttChannel ─────────────────────────────────────────────

pub struct RumqttChannel {
    client: AsyncClient,
    shared: Arc<Mutex<Shared>>,
    wake: Arc<Notify>,
}

impl MessageChannel for RumqttChannel {
    fn connect(&mut self, options: &ConnectOptions) -> MqttResult<()> {
        if options.protocol != ProtocolVersion::V3_1_1 {
            return Err(MqttError::Connection(format!(
                "unsupported protocol {:?}, only MQTT 3.1.1 is available",
                options.protocol
            )));
        }
        lock(&self.shared).requested = Some(options.clone());
        self.wake.notify_one();
        Ok(())
    }

    fn disconnect(&mut self) -> MqttResult<()> {
        lock(&self.shared).closing = true;
        self.wake.notify_one();
        self.client.try_disconnect().map_err(|e| {
            let mut shared = lock(&self.shared);
            shared.abandoned = true;
            shared.connected = false;
            MqttError::Connection(e.to_string())
        })
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    fn send(&mut self, topic: &str, payload: &[u8]) -> MqttResult<()> {
        if !self.is_connected() {
            return Err(MqttError::Publish("not connected".into()));
        }
        self.client
            .try_publish(topic, QOS, false, payload.to_vec())
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    fn subscribe(&mut self, filter: &str) -> MqttResult<()> {
        // Held across the request so the driver sees filters in packet order.
        let mut shared = lock(&self.shared);
        self.client
            .try_subscribe(filter, QOS)
            .map_err(|e| MqttError::Subscribe(e.to_string()))?;
        shared.pending_subscribes.push_back(filter.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, filter: &str) -> MqttResult<()> {
        let mut shared = lock(&self.shared);
        self.client
            .try_unsubscribe(filter)
            .map_err(|e| MqttError::Subscribe(e.to_string()))?;
        shared.pending_unsubscribes.push_back(filter.to_string());
        Ok(())
    }
}

// ── RumqttDriver ──────────────────────────────────────────────

/// Polls the rumqttc event loop and translates packets into [`ChannelEvent`]s.
pub struct RumqttDriver {
    eventloop: EventLoop,
    shared: Arc<Mutex<Shared>>,
    wake: Arc<Notify>,
    subscribes_in_flight: HashMap<u16, String>,
    unsubscribes_in_flight: HashMap<u16, String>,
    started: bool,
    closed: bool,
}

impl RumqttDriver {
    /// Wait until `connect()` was requested. `false` if the channel was
    /// closed first.
    async fn wait_for_connect(&mut self) -> bool {
        while !self.started {
            let requested = {
                let mut shared = lock(&self.shared);
                if shared.closing {
                    return false;
                }
                shared.requested.take()
            };
            match requested {
                Some(options) => {
                    self.apply(&options);
                    self.started = true;
                }
                None => self.wake.notified().await,
            }
        }
        true
    }

    fn apply(&mut self, options: &ConnectOptions) {
        let mut network = self.eventloop.network_options();
        network.set_connection_timeout(options.timeout.as_secs().max(1));
        self.eventloop.set_network_options(network);
        if !options.use_ssl {
            self.eventloop
                .mqtt_options
                .set_transport(rumqttc::Transport::Ws);
        }
        tracing::debug!(
            timeout_secs = options.timeout.as_secs(),
            use_ssl = options.use_ssl,
            "rumqttc event loop starting"
        );
    }

    fn translate(&mut self, event: Event) -> Option<ChannelEvent> {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    lock(&self.shared).connected = true;
                    Some(ChannelEvent::Connected)
                } else {
                    self.closed = true;
                    Some(ChannelEvent::ConnectFailed {
                        reason: format!("broker refused connection: {:?}", ack.code),
                    })
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                Some(ChannelEvent::Message(InboundMessage::new(
                    publish.topic,
                    publish.payload.to_vec(),
                )))
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                let filter = self.subscribes_in_flight.remove(&ack.pkid)?;
                match ack.return_codes.first() {
                    Some(SubscribeReasonCode::Success(qos)) => Some(ChannelEvent::SubscribeAck {
                        filter,
                        response: AckResponse::granted(*qos as u8),
                    }),
                    _ => Some(ChannelEvent::SubscribeFailed {
                        filter,
                        response: AckResponse::failure("subscription refused by broker"),
                    }),
                }
            }
            Event::Incoming(Packet::UnsubAck(ack)) => {
                let filter = self.unsubscribes_in_flight.remove(&ack.pkid)?;
                Some(ChannelEvent::UnsubscribeAck {
                    filter,
                    response: AckResponse::granted(0),
                })
            }
            Event::Outgoing(Outgoing::Subscribe(pkid)) => {
                if let Some(filter) = lock(&self.shared).pending_subscribes.pop_front() {
                    self.subscribes_in_flight.insert(pkid, filter);
                }
                None
            }
            Event::Outgoing(Outgoing::Unsubscribe(pkid)) => {
                if let Some(filter) = lock(&self.shared).pending_unsubscribes.pop_front() {
                    self.unsubscribes_in_flight.insert(pkid, filter);
                }
                None
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                self.closed = true;
                lock(&self.shared).connected = false;
                Some(ChannelEvent::ConnectionLost {
                    reason: "disconnected by client".into(),
                })
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ChannelDriver for RumqttDriver {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.closed || !self.wait_for_connect().await {
            return None;
        }

        while !self.closed {
            if lock(&self.shared).abandoned {
                tracing::debug!("disconnect could not be queued, event loop stopped");
                self.closed = true;
                break;
            }
            match self.eventloop.poll().await {
                Ok(event) => {
                    if let Some(translated) = self.translate(event) {
                        return Some(translated);
                    }
                }
                Err(e) => {
                    self.closed = true;
                    let was_connected = std::mem::take(&mut lock(&self.shared).connected);
                    let reason = e.to_string();
                    tracing::warn!(error = %reason, was_connected, "MQTT event loop error");
                    return Some(if was_connected {
                        ChannelEvent::ConnectionLost { reason }
                    } else {
                        ChannelEvent::ConnectFailed { reason }
                    });
                }
            }
        }
        None
    }
}
