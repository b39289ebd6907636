//! Topic filter to converter dispatch.

use crate::decoder;
use crate::forwarder::Forwarder;
use gateway_connect_core::{ConnectorError, ConnectorResult, Converter, Message, Record};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

/// Attribute carrying the concrete topic a record came from
pub const ATTR_TOPIC: &str = "mqtt_topic";
/// Attribute carrying the subscription filter that matched
pub const ATTR_TOPIC_FILTER: &str = "mqtt_topic_filter";

/// Check MQTT topic filter syntax
///
/// `#` must be a whole level and the last one, `+` must be a whole level.
pub fn validate_topic_filter(filter: &str) -> ConnectorResult<()> {
    if filter.is_empty() {
        return Err(ConnectorError::config("topicFilter cannot be empty"));
    }

    if filter.contains('\0') {
        return Err(ConnectorError::config(format!(
            "topicFilter {:?} contains a NUL character",
            filter
        )));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (idx, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || idx != levels.len() - 1) {
            return Err(ConnectorError::config(format!(
                "topicFilter {:?}: '#' must be the last level on its own",
                filter
            )));
        }
        if level.contains('+') && *level != "+" {
            return Err(ConnectorError::config(format!(
                "topicFilter {:?}: '+' must occupy a whole level",
                filter
            )));
        }
    }

    Ok(())
}

/// MQTT wildcard match of a concrete topic against a filter
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    // Wildcards in the first level never match $SYS-style topics
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Converters registered under one topic filter
pub struct Subscription {
    filter: String,
    converters: Vec<Box<dyn Converter>>,
}

impl Subscription {
    /// The filter string as subscribed at the broker
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

/// Topic filter → ordered converters
///
/// Filters keep the order in which they were first registered.
#[derive(Default)]
pub struct SubscriptionTable {
    entries: Vec<Subscription>,
}

impl SubscriptionTable {
    /// Append a converter to the list of `filter`, creating the entry if absent
    pub fn register(&mut self, filter: impl Into<String>, converter: Box<dyn Converter>) {
        let filter = filter.into();
        match self.entries.iter_mut().find(|entry| entry.filter == filter) {
            Some(entry) => entry.converters.push(converter),
            None => self.entries.push(Subscription {
                filter,
                converters: vec![converter],
            }),
        }
    }

    /// Drop the entry of `filter`
    pub fn remove(&mut self, filter: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.filter != filter);
        self.entries.len() != before
    }

    /// Registered filters in registration order
    pub fn filters(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.filter.clone()).collect()
    }

    /// Every entry whose filter matches a delivered topic, in registration order
    ///
    /// Overlapping filters (`sensors/+/temp` and `sensors/#`) all match, each
    /// entry at most once per delivery.
    pub fn matching<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a Subscription> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.filter == topic || topic_matches(&entry.filter, topic))
    }

    /// Number of distinct filters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no filter is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Routes delivered messages to the converters of their subscriptions
pub struct TopicRouter {
    table: SubscriptionTable,
    include_metadata: bool,
}

impl TopicRouter {
    /// Create a router with an empty table
    pub fn new(include_metadata: bool) -> Self {
        Self {
            table: SubscriptionTable::default(),
            include_metadata,
        }
    }

    /// Install a freshly built table, dropping the previous one
    pub fn replace_table(&mut self, table: SubscriptionTable) {
        self.table = table;
    }

    /// Decode a message and run the converters of every matching subscription
    ///
    /// Failures are logged and contained: an unroutable or undecodable message
    /// is dropped, a failing or panicking converter only loses its own output.
    ///
    /// Brokers that deliver one copy per overlapping subscription run the
    /// matching converters once per copy.
    pub async fn dispatch(&self, message: &Message, forwarder: &Forwarder) {
        let subscriptions: Vec<&Subscription> = self.table.matching(&message.topic).collect();
        if subscriptions.is_empty() {
            error!("Cannot find converter for topic: {:?}!", message.topic);
            forwarder.metrics().record_error("routing");
            return;
        }

        let body = match decoder::decode(message) {
            Ok(body) => body,
            Err(e) => {
                error!("Dropping message on {}: {}", message.topic, e);
                forwarder.metrics().record_error(e.kind());
                return;
            }
        };

        for subscription in subscriptions {
            for (idx, converter) in subscription.converters.iter().enumerate() {
                match convert_isolated(converter.as_ref(), &body) {
                    Ok(Some(mut record)) => {
                        if self.include_metadata {
                            record = record
                                .with_attribute(ATTR_TOPIC, message.topic.as_str())
                                .with_attribute(ATTR_TOPIC_FILTER, subscription.filter());
                        }
                        forwarder.forward(record).await;
                    }
                    Ok(None) => {
                        debug!(
                            "Converter #{} for {} produced no record",
                            idx,
                            subscription.filter()
                        );
                        forwarder.metrics().record_skipped();
                    }
                    Err(e) => {
                        error!(
                            "Converter #{} for {} failed on topic {}: {}",
                            idx,
                            subscription.filter(),
                            message.topic,
                            e
                        );
                        forwarder.metrics().record_error(e.kind());
                    }
                }
            }
        }
    }
}

/// Run a converter, turning a panic into a converter error
fn convert_isolated(converter: &dyn Converter, body: &Value) -> ConnectorResult<Option<Record>> {
    panic::catch_unwind(AssertUnwindSafe(|| converter.convert(body))).unwrap_or_else(|cause| {
        let reason = cause
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| cause.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown cause".to_string());
        Err(ConnectorError::converter(format!("converter panicked: {}", reason)))
    })
}
