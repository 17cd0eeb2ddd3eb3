// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Real-time change stream.
//!
//! The engine consumes changes through [`RealtimeSource`]: subscribe to a
//! channel (keyed by table name) and receive [`RawChange`] messages on a
//! [`Subscription`]. Dropping the subscription unsubscribes.
//!
//! The transport itself lives outside this crate. [`LocalChannelHub`] is an
//! in-process publish/subscribe implementation for embedding the engine next
//! to whatever already receives change messages, and for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::notification::RawChange;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("realtime channel '{channel}' unavailable: {reason}")]
    Unavailable { channel: String, reason: String },
}

/// Receiving end of one channel subscription.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    rx: mpsc::UnboundedReceiver<RawChange>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, rx: mpsc::UnboundedReceiver<RawChange>) -> Self {
        Self {
            channel: channel.into(),
            rx,
        }
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next change, or `None` once the transport closed the stream.
    pub async fn recv(&mut self) -> Option<RawChange> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait RealtimeSource: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, RealtimeError>;
}

/// In-process channel hub.
///
/// Each published change is delivered to every live subscriber of that
/// channel, in publish order. Subscribers that went away are pruned on the
/// next publish.
#[derive(Default)]
pub struct LocalChannelHub {
    channels: RwLock<HashMap<String, Vec<mpsc::UnboundedSender<RawChange>>>>,
}

impl LocalChannelHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `change` on `channel`. Returns how many subscribers got it.
    pub fn publish(&self, channel: &str, change: RawChange) -> usize {
        let mut channels = self.channels.write();
        let Some(senders) = channels.get_mut(channel) else {
            return 0;
        };
        senders.retain(|tx| tx.send(change.clone()).is_ok());
        let delivered = senders.len();
        if senders.is_empty() {
            channels.remove(channel);
        }
        delivered
    }

    /// Live subscribers on `channel`.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .get(channel)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Close every subscription on `channel`, as a transport disconnect would.
    pub fn close(&self, channel: &str) {
        self.channels.write().remove(channel);
    }
}

#[async_trait]
impl RealtimeSource for LocalChannelHub {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, RealtimeError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels
            .write()
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        debug!(channel, "Realtime subscriber added");
        Ok(Subscription::new(channel, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let hub = LocalChannelHub::new();
        let mut sub = hub.subscribe("events").await.unwrap();

        assert_eq!(hub.publish("events", RawChange::delete("a")), 1);

        let change = sub.recv().await.unwrap();
        assert_eq!(change.event_type, "DELETE");
        assert_eq!(sub.channel(), "events");
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let hub = LocalChannelHub::new();
        let _events = hub.subscribe("events").await.unwrap();

        assert_eq!(hub.publish("quotes", RawChange::delete("a")), 0);
        assert_eq!(hub.subscriber_count("events"), 1);
        assert_eq!(hub.subscriber_count("quotes"), 0);
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let hub = LocalChannelHub::new();
        let mut sub = hub.subscribe("events").await.unwrap();

        hub.publish("events", RawChange::insert(json!({"id": "a"})));
        hub.publish("events", RawChange::update(json!({"id": "a", "v": 2})));
        hub.publish("events", RawChange::delete("a"));

        let kinds: Vec<String> = vec![
            sub.recv().await.unwrap().event_type,
            sub.recv().await.unwrap().event_type,
            sub.recv().await.unwrap().event_type,
        ];
        assert_eq!(kinds, vec!["INSERT", "UPDATE", "DELETE"]);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_pruned() {
        let hub = LocalChannelHub::new();
        let sub = hub.subscribe("events").await.unwrap();
        drop(sub);

        assert_eq!(hub.subscriber_count("events"), 0);
        assert_eq!(hub.publish("events", RawChange::delete("a")), 0);
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let hub = LocalChannelHub::new();
        let mut sub = hub.subscribe("events").await.unwrap();

        hub.close("events");

        assert!(sub.recv().await.is_none());
    }
}
