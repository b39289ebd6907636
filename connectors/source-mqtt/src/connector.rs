//! MQTT Source Connector implementation
//!
//! The connector owns one broker session, driven by a background worker task.
//! The worker reacts to connection acknowledgements by (re)building the
//! subscription table and subscribing every filter, dispatches publishes to
//! the router, and retries failed connections after a fixed backoff until the
//! connector is closed.

use crate::config::{MqttConnectorConfig, QoS, TopicMapping};
use crate::converter::{ConverterFactory, ConverterRegistry};
use crate::forwarder::Forwarder;
use crate::router::{SubscriptionTable, TopicRouter};
use crate::session::{
    connack_reason, is_permanent_refusal, BrokerEvent, BrokerSession, RumqttSession,
    SUBSCRIPTION_FAILURE,
};
use async_trait::async_trait;
use gateway_connect_core::{
    CancellationToken, Connector, ConnectorMetrics, ConnectorResult, Message, ReconnectPolicy,
    StorageSink,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Connection lifecycle of a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// MQTT Source Connector
///
/// Subscribes to the configured topic filters and forwards converted records
/// to the gateway's storage sink.
pub struct MqttConnector<S: BrokerSession = RumqttSession> {
    name: String,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown: CancellationToken,
    worker: Option<Worker<S>>,
    handle: Option<JoinHandle<()>>,
}

impl MqttConnector<RumqttSession> {
    /// Create a connector talking to the configured broker
    pub fn new(
        config: MqttConnectorConfig,
        registry: &ConverterRegistry,
        sink: Arc<dyn StorageSink>,
    ) -> ConnectorResult<Self> {
        config.validate()?;
        let filters: HashSet<&str> = config
            .mapping
            .iter()
            .map(|mapping| mapping.topic_filter.as_str())
            .collect();
        let client_id = config.broker.session_client_id();
        let session = RumqttSession::new(config.broker.mqtt_options(&client_id), filters.len());
        Self::with_session(config, registry, sink, session)
    }
}

impl<S: BrokerSession> MqttConnector<S> {
    /// Create a connector over an existing broker session
    ///
    /// Every mapping's converter is resolved here, so an unknown custom
    /// extension fails construction instead of failing at runtime.
    pub fn with_session(
        config: MqttConnectorConfig,
        registry: &ConverterRegistry,
        sink: Arc<dyn StorageSink>,
        session: S,
    ) -> ConnectorResult<Self> {
        config.validate()?;

        let mappings = config
            .mapping
            .iter()
            .map(|mapping| {
                registry
                    .resolve(mapping)
                    .map(|factory| (mapping.clone(), factory))
            })
            .collect::<ConnectorResult<Vec<_>>>()?;

        let name = config.broker.display_name();
        let state = Arc::new(watch::Sender::new(ConnectionState::Disconnected));
        let shutdown = CancellationToken::new();

        let worker = Worker {
            name: name.clone(),
            address: config.broker.address(),
            session,
            mappings,
            default_qos: config.broker.qos,
            router: TopicRouter::new(config.core.include_metadata),
            forwarder: Forwarder::new(name.clone(), sink),
            metrics: ConnectorMetrics::new(&name),
            reconnect: ReconnectPolicy::new(config.core.reconnect_interval()),
            state: state.clone(),
            shutdown: shutdown.clone(),
        };

        Ok(Self {
            name,
            state,
            shutdown,
            worker: Some(worker),
            handle: None,
        })
    }

    /// Display name used for logging and for tagging records
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the broker session is up
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver observing every state transition
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Start the background worker and wait for the first connection
    ///
    /// Returns once connected, or once the connector is closed while still
    /// trying to connect.
    pub async fn open(&mut self) {
        let Some(worker) = self.worker.take() else {
            warn!("{} is already open or has been stopped", self.name);
            return;
        };

        info!("{} connecting to {}", self.name, worker.address);
        self.handle = Some(tokio::spawn(worker.run()));

        let mut changes = self.state.subscribe();
        let reached = changes
            .wait_for(|state| {
                matches!(state, ConnectionState::Connected | ConnectionState::Stopped)
            })
            .await
            .is_ok();

        if !reached {
            warn!("{} state channel closed before connecting", self.name);
        }
    }

    /// Stop the worker, disconnect from the broker and mark the connector stopped
    ///
    /// Calling it again is a no-op apart from the completion log.
    pub async fn close(&mut self) {
        self.shutdown.cancel();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!("{} worker terminated abnormally: {}", self.name, e);
            }
        }

        // Never opened: the worker still owns the untouched session
        self.worker = None;
        self.state.send_replace(ConnectionState::Stopped);

        info!("{} has been stopped.", self.name);
    }
}

#[async_trait]
impl<S: BrokerSession> Connector for MqttConnector<S> {
    fn name(&self) -> &str {
        MqttConnector::name(self)
    }

    async fn open(&mut self) {
        MqttConnector::open(self).await
    }

    async fn close(&mut self) {
        MqttConnector::close(self).await
    }

    fn is_connected(&self) -> bool {
        MqttConnector::is_connected(self)
    }
}

/// What the worker does after handling an event
enum Flow {
    Continue,
    Backoff,
}

/// Background task owning the broker session
struct Worker<S> {
    name: String,
    address: String,
    session: S,
    mappings: Vec<(TopicMapping, ConverterFactory)>,
    default_qos: QoS,
    router: TopicRouter,
    forwarder: Forwarder,
    metrics: ConnectorMetrics,
    reconnect: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    shutdown: CancellationToken,
}

impl<S: BrokerSession> Worker<S> {
    async fn run(mut self) {
        debug!("{} connection worker started", self.name);

        loop {
            if self.current_state() == ConnectionState::Disconnected {
                self.set_state(ConnectionState::Connecting);
            }

            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                event = self.session.poll() => event,
            };

            let flow = match event {
                Ok(BrokerEvent::ConnAck { code }) => self.on_connect(code),
                Ok(BrokerEvent::SubAck { granted }) => self.on_subscribe(&granted),
                Ok(BrokerEvent::Publish(message)) => self.on_message(message).await,
                Ok(BrokerEvent::Disconnected) => self.on_disconnect(),
                Ok(BrokerEvent::Idle) => Flow::Continue,
                Err(e) => {
                    error!("{} connection error: {}", self.name, e);
                    self.metrics.record_error(e.kind());
                    self.set_state(ConnectionState::Disconnected);
                    Flow::Backoff
                }
            };

            if let Flow::Backoff = flow {
                self.metrics.record_reconnect();
                debug!(
                    "{} reconnecting in {:?}",
                    self.name,
                    self.reconnect.interval()
                );
                if !self.reconnect.wait(&self.shutdown).await {
                    break;
                }
            }
        }

        self.stop().await;
    }

    fn on_connect(&mut self, code: u8) -> Flow {
        if code != 0 {
            match connack_reason(code) {
                Some(reason) => error!(
                    "{} connection FAIL with error {} {}!",
                    self.name, code, reason
                ),
                None => error!("{} connection FAIL with unknown error!", self.name),
            }
            if is_permanent_refusal(code) {
                // TODO: stop retrying on refusals that cannot succeed without a config change
                warn!(
                    "{} refusal code {} is unlikely to clear up, retrying anyway",
                    self.name, code
                );
            }
            self.metrics.record_error("connect");
            self.set_state(ConnectionState::Disconnected);
            return Flow::Backoff;
        }

        self.set_state(ConnectionState::Connected);
        info!(
            "{} connected to {} - successfully.",
            self.name, self.address
        );

        self.subscribe_all();
        Flow::Continue
    }

    /// Rebuild the subscription table and subscribe each distinct filter once
    fn subscribe_all(&mut self) {
        let mut table = SubscriptionTable::default();
        let mut qos_by_filter: HashMap<String, QoS> = HashMap::new();

        for (mapping, factory) in &self.mappings {
            debug!("{} registering mapping {:?}", self.name, mapping);
            match factory(mapping) {
                Ok(converter) => {
                    table.register(mapping.topic_filter.clone(), converter);
                    if let Some(qos) = mapping.qos {
                        qos_by_filter
                            .entry(mapping.topic_filter.clone())
                            .or_insert(qos);
                    }
                }
                Err(e) => {
                    warn!(
                        "{} skipping mapping for {}: {}",
                        self.name, mapping.topic_filter, e
                    );
                    self.metrics.record_error("config");
                }
            }
        }

        for filter in table.filters() {
            let qos = qos_by_filter
                .get(&filter)
                .copied()
                .unwrap_or(self.default_qos);

            match self.session.subscribe(&filter, qos) {
                Ok(()) => info!("Subscribe to {}", filter),
                Err(e) => {
                    error!("{} failed to subscribe to {}: {}", self.name, filter, e);
                    table.remove(&filter);
                }
            }
        }

        if table.is_empty() {
            warn!("{} has no active subscriptions", self.name);
        } else {
            debug!(
                "{} subscribed {} filters: {:?}",
                self.name,
                table.len(),
                table.filters()
            );
        }
        self.router.replace_table(table);
    }

    fn on_subscribe(&self, granted: &[u8]) -> Flow {
        if granted.iter().any(|qos| *qos == SUBSCRIPTION_FAILURE) {
            error!("Subscription failed, check your configs.");
            self.metrics.record_error("config");
        } else {
            debug!("{} subscription granted: {:?}", self.name, granted);
        }
        Flow::Continue
    }

    async fn on_message(&mut self, message: Message) -> Flow {
        debug!(
            "{} received {} bytes on {}",
            self.name,
            message.payload_size(),
            message.topic
        );
        self.metrics.record_received();
        self.router.dispatch(&message, &self.forwarder).await;
        Flow::Continue
    }

    fn on_disconnect(&mut self) -> Flow {
        info!("{} was disconnected.", self.name);
        self.set_state(ConnectionState::Disconnected);
        Flow::Backoff
    }

    async fn stop(&mut self) {
        if self.current_state() == ConnectionState::Connected {
            if let Err(e) = self.session.disconnect().await {
                error!("{} failed to disconnect cleanly: {}", self.name, e);
            }
        }
        self.set_state(ConnectionState::Stopped);
        debug!("{} connection worker stopped", self.name);
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("{} state {} -> {}", self.name, previous, state);
            self.metrics
                .set_connected(state == ConnectionState::Connected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerConfig, ConverterSpec, Credentials};
    use gateway_connect_core::{ChannelSink, ConnectorConfig, ConnectorError, Record};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::Instant;

    /// Observations shared between a test and its scripted session
    #[derive(Clone, Default)]
    struct SessionLog {
        polls: Arc<Mutex<Vec<Instant>>>,
        subscribes: Arc<Mutex<Vec<(String, QoS)>>>,
        disconnects: Arc<AtomicUsize>,
    }

    impl SessionLog {
        fn poll_count(&self) -> usize {
            self.polls.lock().unwrap().len()
        }

        fn subscribed_filters(&self) -> Vec<String> {
            self.subscribes
                .lock()
                .unwrap()
                .iter()
                .map(|(filter, _)| filter.clone())
                .collect()
        }
    }

    /// Replays a fixed event script, then stays silent
    struct ScriptedSession {
        script: VecDeque<ConnectorResult<BrokerEvent>>,
        log: SessionLog,
    }

    impl ScriptedSession {
        fn new(script: Vec<ConnectorResult<BrokerEvent>>) -> (Self, SessionLog) {
            let log = SessionLog::default();
            let session = Self {
                script: script.into(),
                log: log.clone(),
            };
            (session, log)
        }
    }

    #[async_trait]
    impl BrokerSession for ScriptedSession {
        async fn poll(&mut self) -> ConnectorResult<BrokerEvent> {
            self.log.polls.lock().unwrap().push(Instant::now());
            match self.script.pop_front() {
                Some(event) => event,
                None => std::future::pending().await,
            }
        }

        fn subscribe(&mut self, filter: &str, qos: QoS) -> ConnectorResult<()> {
            self.log
                .subscribes
                .lock()
                .unwrap()
                .push((filter.to_string(), qos));
            Ok(())
        }

        async fn disconnect(&mut self) -> ConnectorResult<()> {
            self.log.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn connack(code: u8) -> ConnectorResult<BrokerEvent> {
        Ok(BrokerEvent::ConnAck { code })
    }

    fn publish(topic: &str, payload: &str) -> ConnectorResult<BrokerEvent> {
        Ok(BrokerEvent::Publish(Message::new(
            topic,
            payload.as_bytes().to_vec(),
        )))
    }

    fn network_error() -> ConnectorResult<BrokerEvent> {
        Err(ConnectorError::connect("connection refused (os error 111)"))
    }

    fn config(mappings: Vec<TopicMapping>) -> MqttConnectorConfig {
        MqttConnectorConfig {
            core: ConnectorConfig::default(),
            broker: BrokerConfig {
                host: "x".to_string(),
                port: 1883,
                credentials: Credentials::Basic {
                    username: "u".to_string(),
                    password: "p".to_string(),
                },
                name: Some("Site A".to_string()),
                client_id: None,
                keep_alive_secs: 60,
                clean_session: true,
                max_packet_size: 1024 * 1024,
                qos: QoS::AtMostOnce,
            },
            mapping: mappings,
        }
    }

    fn connector(
        config: MqttConnectorConfig,
        registry: &ConverterRegistry,
        script: Vec<ConnectorResult<BrokerEvent>>,
    ) -> (
        MqttConnector<ScriptedSession>,
        SessionLog,
        UnboundedReceiver<(String, Record)>,
    ) {
        let (session, log) = ScriptedSession::new(script);
        let (sink, records) = ChannelSink::new();
        let connector =
            MqttConnector::with_session(config, registry, Arc::new(sink), session).unwrap();
        (connector, log, records)
    }

    fn custom(filter: &str, extension: &str) -> TopicMapping {
        TopicMapping {
            topic_filter: filter.to_string(),
            converter: ConverterSpec::Custom {
                extension: Some(extension.to_string()),
            },
            qos: None,
        }
    }

    #[tokio::test]
    async fn test_scenario_json_mapping_forwards_record() {
        let config = MqttConnectorConfig::from_json_str(
            r#"{
                "broker": {"host": "x", "port": 1883,
                           "credentials": {"type": "basic", "username": "u", "password": "p"}},
                "mapping": [{"topicFilter": "data/#", "converter": {"type": "json"}}]
            }"#,
        )
        .unwrap();
        let (mut connector, log, mut records) = connector(
            config,
            &ConverterRegistry::new(),
            vec![connack(0), publish("data/123", r#"{"v":1}"#)],
        );

        connector.open().await;
        assert!(connector.is_connected());
        assert_eq!(connector.state(), ConnectionState::Connected);

        let (name, record) = records.recv().await.unwrap();
        assert_eq!(name, connector.name());
        assert!(name.starts_with("Mqtt Broker "));
        assert_eq!(record.to_value(), json!({"v": 1}));
        assert_eq!(record.get_attribute("mqtt_topic"), Some("data/123"));

        assert_eq!(log.subscribed_filters(), vec!["data/#".to_string()]);

        connector.close().await;
        assert!(records.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_one_subscription_per_distinct_filter() {
        let mut registry = ConverterRegistry::new();
        registry.register("tagged", |_: &TopicMapping| {
            Ok(Box::new(|body: &Value| -> ConnectorResult<Option<Record>> {
                Ok(Some(Record::from_json(&json!({"tagged": body}))?))
            }) as Box<dyn gateway_connect_core::Converter>)
        });

        let mut mappings = vec![
            TopicMapping::json("sensors/+/temp"),
            TopicMapping::json("alarms/#"),
            custom("sensors/+/temp", "tagged"),
        ];
        mappings[1].qos = Some(QoS::AtLeastOnce);

        let (mut connector, log, mut records) = connector(
            config(mappings),
            &registry,
            vec![
                connack(0),
                Ok(BrokerEvent::SubAck {
                    granted: vec![0, 1],
                }),
                publish("sensors/room1/temp", r#"{"c":21}"#),
            ],
        );

        connector.open().await;

        assert_eq!(
            log.subscribes.lock().unwrap().clone(),
            vec![
                ("sensors/+/temp".to_string(), QoS::AtMostOnce),
                ("alarms/#".to_string(), QoS::AtLeastOnce),
            ]
        );

        // Both converters of the wildcard filter run, in registration order
        let (_, first) = records.recv().await.unwrap();
        let (_, second) = records.recv().await.unwrap();
        assert_eq!(first.to_value(), json!({"c": 21}));
        assert_eq!(second.to_value(), json!({"tagged": {"c": 21}}));
        assert_eq!(first.get_attribute("mqtt_topic_filter"), Some("sensors/+/temp"));

        connector.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_retries_every_interval_until_connected() {
        let (mut connector, log, _records) = connector(
            config(vec![TopicMapping::json("data/#")]),
            &ConverterRegistry::new(),
            vec![network_error(), network_error(), connack(0)],
        );

        let start = Instant::now();
        connector.open().await;

        assert!(connector.is_connected());
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));

        let polls = log.polls.lock().unwrap().clone();
        assert_eq!(polls.len(), 3);
        for pair in polls.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_secs(1) && gap < Duration::from_millis(1100));
        }

        connector.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_authorised_stays_disconnected_and_keeps_retrying() {
        let (mut connector, log, _records) = connector(
            config(vec![TopicMapping::json("data/#")]),
            &ConverterRegistry::new(),
            vec![connack(5), connack(5), connack(5)],
        );

        let opened = tokio::time::timeout(Duration::from_millis(500), connector.open()).await;
        assert!(opened.is_err(), "open must not return while refused");
        assert_eq!(connector.state(), ConnectionState::Disconnected);
        assert!(log.subscribed_filters().is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(log.poll_count(), 4);
        assert!(!connector.is_connected());

        connector.close().await;
        assert_eq!(connector.state(), ConnectionState::Stopped);
        assert_eq!(log.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_triggers_reconnect_and_resubscribe() {
        let (mut connector, log, mut records) = connector(
            config(vec![TopicMapping::json("data/#")]),
            &ConverterRegistry::new(),
            vec![
                connack(0),
                Ok(BrokerEvent::Disconnected),
                connack(0),
                publish("data/1", r#"{"n":1}"#),
            ],
        );
        let mut changes = connector.state_changes();

        connector.open().await;

        let (_, record) = records.recv().await.unwrap();
        assert_eq!(record.to_value(), json!({"n": 1}));
        assert!(connector.is_connected());
        assert_eq!(
            log.subscribed_filters(),
            vec!["data/#".to_string(), "data/#".to_string()]
        );
        assert!(changes.has_changed().unwrap());

        // A reconnect rebuilds the table, so the message is forwarded once
        assert!(records.try_recv().is_err());

        connector.close().await;
    }

    #[tokio::test]
    async fn test_close_twice_disconnects_once() {
        let (mut connector, log, _records) = connector(
            config(vec![TopicMapping::json("data/#")]),
            &ConverterRegistry::new(),
            vec![connack(0)],
        );

        connector.open().await;
        connector.close().await;
        connector.close().await;

        assert_eq!(log.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(connector.state(), ConnectionState::Stopped);
        assert!(!connector.is_connected());
    }

    #[tokio::test]
    async fn test_close_before_open() {
        let (mut connector, log, _records) = connector(
            config(vec![TopicMapping::json("data/#")]),
            &ConverterRegistry::new(),
            vec![connack(0)],
        );

        connector.close().await;
        assert_eq!(connector.state(), ConnectionState::Stopped);

        // A stopped connector cannot be reopened
        connector.open().await;
        assert_eq!(log.poll_count(), 0);
        assert_eq!(log.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_connecting_releases_open() {
        let (mut connector, log, _records) = connector(
            config(vec![TopicMapping::json("data/#")]),
            &ConverterRegistry::new(),
            vec![network_error()],
        );
        let shutdown = connector.shutdown.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            shutdown.cancel();
        });

        connector.open().await;
        assert_eq!(connector.state(), ConnectionState::Stopped);
        assert_eq!(log.poll_count(), 2);

        connector.close().await;
        assert_eq!(log.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_converter_factory_skips_only_its_mapping() {
        let mut registry = ConverterRegistry::new();
        registry.register("broken", |_: &TopicMapping| {
            Err(ConnectorError::config("missing calibration table"))
        });

        let (mut connector, log, mut records) = connector(
            config(vec![
                custom("broken/#", "broken"),
                TopicMapping::json("data/#"),
            ]),
            &registry,
            vec![
                connack(0),
                publish("broken/1", r#"{"v":0}"#),
                publish("data/1", r#"{"v":1}"#),
            ],
        );

        connector.open().await;
        assert_eq!(log.subscribed_filters(), vec!["data/#".to_string()]);

        let (_, record) = records.recv().await.unwrap();
        assert_eq!(record.to_value(), json!({"v": 1}));

        connector.close().await;
    }

    #[tokio::test]
    async fn test_bad_messages_do_not_stop_the_worker() {
        let (mut connector, _log, mut records) = connector(
            config(vec![TopicMapping::json("data/#")]),
            &ConverterRegistry::new(),
            vec![
                connack(0),
                Ok(BrokerEvent::SubAck {
                    granted: vec![SUBSCRIPTION_FAILURE],
                }),
                publish("data/1", "not json"),
                publish("data/2", "[1,2]"),
                publish("elsewhere", r#"{"v":0}"#),
                publish("data/3", r#"{"v":3}"#),
            ],
        );

        connector.open().await;

        let (_, record) = records.recv().await.unwrap();
        assert_eq!(record.to_value(), json!({"v": 3}));
        assert!(connector.is_connected());

        connector.close().await;
    }

    #[tokio::test]
    async fn test_filter_qos_taken_from_first_mapping_that_sets_it() {
        let mut explicit = TopicMapping::json("a/#");
        explicit.qos = Some(QoS::AtLeastOnce);

        let (mut connector, log, _records) = connector(
            config(vec![TopicMapping::json("a/#"), explicit, TopicMapping::json("b/#")]),
            &ConverterRegistry::new(),
            vec![connack(0)],
        );

        connector.open().await;
        assert_eq!(
            log.subscribes.lock().unwrap().clone(),
            vec![
                ("a/#".to_string(), QoS::AtLeastOnce),
                ("b/#".to_string(), QoS::AtMostOnce),
            ]
        );

        connector.close().await;
    }

    #[tokio::test]
    async fn test_every_filter_subscribed_beyond_default_channel_size() {
        let mappings: Vec<TopicMapping> = (0..80)
            .map(|i| TopicMapping::json(format!("t/{i}")))
            .collect();
        let (mut connector, log, mut records) = connector(
            config(mappings),
            &ConverterRegistry::new(),
            vec![connack(0), publish("t/79", r#"{"last":true}"#)],
        );

        connector.open().await;

        let subscribed = log.subscribed_filters();
        assert_eq!(subscribed.len(), 80);
        assert_eq!(subscribed[79], "t/79");

        let (_, record) = records.recv().await.unwrap();
        assert_eq!(record.to_value(), json!({"last": true}));

        connector.close().await;
    }

    #[tokio::test]
    async fn test_panicking_converter_keeps_connection_alive() {
        let mut registry = ConverterRegistry::new();
        registry.register("first-item", |_: &TopicMapping| {
            Ok(Box::new(|body: &Value| -> ConnectorResult<Option<Record>> {
                let items = body["items"].as_array().cloned().unwrap_or_default();
                Ok(Some(Record::from_json(&json!({"first": &items[0]}))?))
            }) as Box<dyn gateway_connect_core::Converter>)
        });

        let (mut connector, _log, mut records) = connector(
            config(vec![custom("d/#", "first-item")]),
            &registry,
            vec![
                connack(0),
                publish("d/1", r#"{"items":[]}"#),
                publish("d/2", r#"{"items":[5]}"#),
            ],
        );

        connector.open().await;

        let (_, record) = records.recv().await.unwrap();
        assert_eq!(record.to_value(), json!({"first": 5}));
        assert!(connector.is_connected());
        assert_eq!(connector.state(), ConnectionState::Connected);

        connector.close().await;
    }

    #[tokio::test]
    async fn test_overlapping_filters_each_run_their_converters() {
        let mut registry = ConverterRegistry::new();
        registry.register("tag-b", |_: &TopicMapping| {
            Ok(Box::new(|body: &Value| -> ConnectorResult<Option<Record>> {
                Ok(Some(Record::from_json(&json!({"b": body}))?))
            }) as Box<dyn gateway_connect_core::Converter>)
        });

        let (mut connector, _log, mut records) = connector(
            config(vec![
                TopicMapping::json("sensors/+/temp"),
                custom("sensors/#", "tag-b"),
            ]),
            &registry,
            vec![connack(0), publish("sensors/r1/temp", r#"{"v":1}"#)],
        );

        connector.open().await;

        let (_, first) = records.recv().await.unwrap();
        let (_, second) = records.recv().await.unwrap();
        assert_eq!(first.to_value(), json!({"v": 1}));
        assert_eq!(second.to_value(), json!({"b": {"v": 1}}));
        assert_eq!(second.get_attribute("mqtt_topic_filter"), Some("sensors/#"));

        connector.close().await;
    }

    #[test]
    fn test_unregistered_custom_extension_fails_construction() {
        let (session, _log) = ScriptedSession::new(vec![]);
        let (sink, _records) = ChannelSink::new();

        let result = MqttConnector::with_session(
            config(vec![custom("data/#", "not-installed")]),
            &ConverterRegistry::new(),
            Arc::new(sink),
            session,
        );

        assert!(matches!(result, Err(ConnectorError::Config(_))));
    }
}
