//! Broker consumer: reads order events from a Redis stream consumer group and
//! hands each one to the dispatch engine.
//!
//! Every entry ends in exactly one [`AckDecision`]. Acked and discarded
//! entries are removed from the group's pending list; requeued entries stay
//! pending and are read again after `requeue_delay_ms`.

mod status;
mod stream;

use async_trait::async_trait;

use crate::dispatch::DispatchEngine;
use crate::notification::OrderEvent;

pub use status::{ConsumerStatus, ConsumerStatusSnapshot};
pub use stream::StreamConsumer;

/// Entry field holding the JSON event
pub const PAYLOAD_FIELD: &str = "payload";
/// Optional entry field matched against the configured routing pattern
pub const ROUTING_KEY_FIELD: &str = "routing_key";

/// What the consumer does with an entry once it has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Processed; remove from the pending list
    Ack,
    /// Unprocessable; remove from the pending list without retrying
    Discard,
    /// Transient failure; leave pending for redelivery
    Requeue,
}

impl AckDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckDecision::Ack => "ack",
            AckDecision::Discard => "discard",
            AckDecision::Requeue => "requeue",
        }
    }

    /// Whether the entry is acknowledged to the broker
    pub fn acknowledges(&self) -> bool {
        !matches!(self, AckDecision::Requeue)
    }
}

/// Handles one raw event payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, payload: &str) -> AckDecision;
}

#[async_trait]
impl EventHandler for DispatchEngine {
    async fn handle(&self, payload: &str) -> AckDecision {
        let event = match OrderEvent::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unparseable event");
                return AckDecision::Discard;
            }
        };

        match self.process_event(event).await {
            Ok(record) => {
                tracing::debug!(
                    notification_id = %record.id,
                    status = %record.status,
                    "Event handled"
                );
                AckDecision::Ack
            }
            Err(e) if e.is_retryable() => {
                tracing::error!(error = %e, "Event processing failed, requeueing");
                AckDecision::Requeue
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding invalid event");
                AckDecision::Discard
            }
        }
    }
}

/// Topic match in the AMQP style: words are separated by `.`, `*` matches
/// exactly one word and `#` matches zero or more words.
pub fn topic_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&first, key_rest)) => (word == "*" || word == first) && match_words(rest, key_rest),
            None => false,
        },
    }
}

/// Decide what to do with one stream entry.
///
/// Entries routed under a key that does not match `pattern` are acked without
/// being processed; entries without a routing key are always accepted.
pub async fn handle_entry(
    handler: &dyn EventHandler,
    pattern: &str,
    routing_key: Option<&str>,
    payload: Option<&str>,
) -> AckDecision {
    if let Some(key) = routing_key {
        if !topic_matches(pattern, key) {
            tracing::debug!(routing_key = %key, pattern = %pattern, "Skipping entry with foreign routing key");
            return AckDecision::Ack;
        }
    }

    match payload {
        Some(payload) => handler.handle(payload).await,
        None => {
            tracing::warn!("Discarding entry without payload");
            AckDecision::Discard
        }
    }
}
