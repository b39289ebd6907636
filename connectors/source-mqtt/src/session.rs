//! Broker session abstraction and its rumqttc implementation.
//!
//! The connection worker only talks to a [`BrokerSession`]: it polls for
//! [`BrokerEvent`]s, queues subscriptions and disconnects. Reconnecting is
//! implicit: polling again after a failure starts a new connection attempt.

use crate::config::QoS;
use async_trait::async_trait;
use gateway_connect_core::{ConnectorError, ConnectorResult, Message};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, SubscribeReasonCode,
};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// Granted QoS value signalling a rejected subscription
pub const SUBSCRIPTION_FAILURE: u8 = 0x80;

/// Minimum capacity of the request channel between client handle and event loop
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Room left in the request channel for DISCONNECT and acknowledgements
const REQUEST_CHANNEL_HEADROOM: usize = 16;

/// Upper bound for flushing the DISCONNECT packet on shutdown
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Something the broker connection reported
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// CONNACK with its return code (0 = accepted)
    ConnAck { code: u8 },
    /// SUBACK with the granted QoS per requested filter
    SubAck { granted: Vec<u8> },
    /// Application message
    Publish(Message),
    /// Broker closed the session
    Disconnected,
    /// Keepalive and acknowledgement traffic
    Idle,
}

/// Reason for a refused connection, `None` for codes outside the table
pub fn connack_reason(code: u8) -> Option<&'static str> {
    match code {
        1 => Some("incorrect protocol version"),
        2 => Some("invalid client identifier"),
        3 => Some("server unavailable"),
        4 => Some("bad username or password"),
        5 => Some("not authorised"),
        _ => None,
    }
}

/// Refusals that will not clear up by retrying with the same configuration
pub fn is_permanent_refusal(code: u8) -> bool {
    matches!(code, 1 | 2 | 4 | 5)
}

/// Connection to a single broker
#[async_trait]
pub trait BrokerSession: Send + 'static {
    /// Drive the network loop until the next event
    ///
    /// An error means the connection is down; calling `poll` again starts a
    /// new connection attempt.
    async fn poll(&mut self) -> ConnectorResult<BrokerEvent>;

    /// Queue a subscription; the outcome arrives as [`BrokerEvent::SubAck`]
    fn subscribe(&mut self, filter: &str, qos: QoS) -> ConnectorResult<()>;

    /// Send DISCONNECT and close the connection
    async fn disconnect(&mut self) -> ConnectorResult<()>;
}

/// [`BrokerSession`] over a rumqttc client and event loop
///
/// Subscriptions that do not fit in the request channel wait in `pending` and
/// are handed over on later polls, once the event loop has drained room.
pub struct RumqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    pending: VecDeque<(String, QoS)>,
}

impl RumqttSession {
    /// Create the session for `filters` distinct subscriptions
    ///
    /// No network traffic happens until the first poll.
    pub fn new(options: MqttOptions, filters: usize) -> Self {
        let (client, eventloop) = AsyncClient::new(options, request_capacity(filters));
        Self {
            client,
            eventloop,
            pending: VecDeque::new(),
        }
    }

    /// Subscriptions waiting for room in the request channel
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn flush_pending(&mut self) {
        while let Some((filter, qos)) = self.pending.pop_front() {
            if self.client.try_subscribe(filter.as_str(), qos.into()).is_err() {
                self.pending.push_front((filter, qos));
                break;
            }
        }
    }
}

/// Request channel size fitting one SUBSCRIBE per filter
fn request_capacity(filters: usize) -> usize {
    REQUEST_CHANNEL_CAPACITY.max(filters + REQUEST_CHANNEL_HEADROOM)
}

fn return_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

fn granted_qos(code: &SubscribeReasonCode) -> u8 {
    match code {
        SubscribeReasonCode::Success(qos) => *qos as u8,
        SubscribeReasonCode::Failure => SUBSCRIPTION_FAILURE,
    }
}

#[async_trait]
impl BrokerSession for RumqttSession {
    async fn poll(&mut self) -> ConnectorResult<BrokerEvent> {
        self.flush_pending();

        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                // A new session gets its subscriptions queued afresh
                self.pending.clear();
                Ok(BrokerEvent::ConnAck {
                    code: return_code(ack.code),
                })
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => Ok(BrokerEvent::SubAck {
                granted: ack.return_codes.iter().map(granted_qos).collect(),
            }),
            Ok(Event::Incoming(Packet::Publish(publish))) => Ok(BrokerEvent::Publish(
                Message::new(publish.topic, publish.payload.to_vec()),
            )),
            Ok(Event::Incoming(Packet::Disconnect)) => Ok(BrokerEvent::Disconnected),
            Ok(_) => Ok(BrokerEvent::Idle),
            // rumqttc reports a refused CONNACK as an error
            Err(ConnectionError::ConnectionRefused(code)) => Ok(BrokerEvent::ConnAck {
                code: return_code(code),
            }),
            Err(e) => Err(ConnectorError::connect_with_source(
                "MQTT connection error",
                e,
            )),
        }
    }

    fn subscribe(&mut self, filter: &str, qos: QoS) -> ConnectorResult<()> {
        // try_subscribe: this runs on the task that drives the event loop
        self.flush_pending();
        if self.pending.is_empty() && self.client.try_subscribe(filter, qos.into()).is_ok() {
            return Ok(());
        }

        debug!("Request channel full, holding subscription to {}", filter);
        self.pending.push_back((filter.to_string(), qos));
        Ok(())
    }

    async fn disconnect(&mut self) -> ConnectorResult<()> {
        self.client.try_disconnect().map_err(|e| {
            ConnectorError::connect_with_source("Failed to queue DISCONNECT", e)
        })?;

        let eventloop = &mut self.eventloop;
        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        };

        if tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush)
            .await
            .is_err()
        {
            warn!("Timed out flushing DISCONNECT to the broker");
        }

        Ok(())
    }
}
