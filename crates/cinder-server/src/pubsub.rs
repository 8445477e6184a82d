//! Pub/sub broker: channel and glob-pattern fan-out.
//!
//! State is two concurrent maps — channel → subscribers and pattern →
//! subscribers — plus, per connection, the reverse sets kept in its
//! [`Session`](crate::session::Session). Each subscriber is the
//! connection's outbound delivery queue; `publish` renders the message
//! frame once per channel or pattern and pushes the bytes to every
//! matched queue.
//!
//! `DashMap` keeps every operation independent and lock-free from the
//! callers' point of view, which is all pub/sub needs: each mutation
//! stands alone and visibility is monotone.

use std::collections::HashMap;

use bytes::Bytes;
use cinder_core::glob::glob_match;
use cinder_protocol::Frame;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// A subscriber's outbound queue. Unbounded: the session writes
/// deliveries to the socket as fast as it can, and a torn-down session
/// drops the receiver, which `publish` observes as a failed send.
pub type DeliveryTx = mpsc::UnboundedSender<Bytes>;

/// Maximum byte length for a subscription pattern. Longer patterns
/// only force pathological glob work on every PUBLISH.
const MAX_PATTERN_LEN: usize = 512;

/// Broker shared by every connection through the server context.
#[derive(Default)]
pub struct PubSubManager {
    channels: DashMap<String, HashMap<u64, DeliveryTx>>,
    patterns: DashMap<String, HashMap<u64, DeliveryTx>>,
}

impl PubSubManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection on an exact channel.
    pub fn subscribe(&self, channel: &str, conn_id: u64, tx: DeliveryTx) {
        self.channels
            .entry(channel.to_owned())
            .or_default()
            .insert(conn_id, tx);
    }

    /// Removes a connection from an exact channel.
    pub fn unsubscribe(&self, channel: &str, conn_id: u64) {
        if let Some(mut subs) = self.channels.get_mut(channel) {
            subs.remove(&conn_id);
            let empty = subs.is_empty();
            drop(subs);
            if empty {
                self.channels.remove_if(channel, |_, subs| subs.is_empty());
            }
        }
    }

    /// Registers a connection on a glob pattern. Returns `false` if
    /// the pattern is oversized.
    pub fn psubscribe(&self, pattern: &str, conn_id: u64, tx: DeliveryTx) -> bool {
        if pattern.len() > MAX_PATTERN_LEN {
            return false;
        }
        self.patterns
            .entry(pattern.to_owned())
            .or_default()
            .insert(conn_id, tx);
        true
    }

    /// Removes a connection from a pattern.
    pub fn punsubscribe(&self, pattern: &str, conn_id: u64) {
        if let Some(mut subs) = self.patterns.get_mut(pattern) {
            subs.remove(&conn_id);
            let empty = subs.is_empty();
            drop(subs);
            if empty {
                self.patterns.remove_if(pattern, |_, subs| subs.is_empty());
            }
        }
    }

    /// Tears down everything a closing connection held.
    pub fn remove_connection<'a>(
        &self,
        conn_id: u64,
        channels: impl IntoIterator<Item = &'a String>,
        patterns: impl IntoIterator<Item = &'a String>,
    ) {
        for channel in channels {
            self.unsubscribe(channel, conn_id);
        }
        for pattern in patterns {
            self.punsubscribe(pattern, conn_id);
        }
    }

    /// Delivers a message to every direct subscriber of `channel` and
    /// every subscriber of a pattern matching it. Returns the delivery
    /// count — a connection matched through two patterns counts twice.
    pub fn publish(&self, channel: &str, payload: &Bytes) -> usize {
        let mut delivered = 0;

        if let Some(subs) = self.channels.get(channel) {
            let bytes = message_bytes(channel, payload);
            for tx in subs.values() {
                if tx.send(bytes.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }

        for entry in self.patterns.iter() {
            let pattern = entry.key();
            if glob_match(pattern, channel) {
                let bytes = pmessage_bytes(pattern, channel, payload);
                for tx in entry.value().values() {
                    if tx.send(bytes.clone()).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }

        delivered
    }
}

/// Renders the `["message", channel, payload]` push frame.
fn message_bytes(channel: &str, payload: &Bytes) -> Bytes {
    Frame::Array(vec![
        Frame::Bulk(Bytes::from_static(b"message")),
        Frame::Bulk(Bytes::copy_from_slice(channel.as_bytes())),
        Frame::Bulk(payload.clone()),
    ])
    .to_bytes()
}

/// Renders the `["pmessage", pattern, channel, payload]` push frame.
fn pmessage_bytes(pattern: &str, channel: &str, payload: &Bytes) -> Bytes {
    Frame::Array(vec![
        Frame::Bulk(Bytes::from_static(b"pmessage")),
        Frame::Bulk(Bytes::copy_from_slice(pattern.as_bytes())),
        Frame::Bulk(Bytes::copy_from_slice(channel.as_bytes())),
        Frame::Bulk(payload.clone()),
    ])
    .to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber() -> (DeliveryTx, mpsc::UnboundedReceiver<Bytes>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn publish_counts_direct_subscribers() {
        let broker = PubSubManager::new();
        let (tx1, mut rx1) = subscriber();
        let (tx2, mut rx2) = subscriber();

        broker.subscribe("news", 1, tx1);
        broker.subscribe("news", 2, tx2);

        let count = broker.publish("news", &Bytes::from_static(b"hi"));
        assert_eq!(count, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn publish_to_empty_channel_is_zero() {
        let broker = PubSubManager::new();
        assert_eq!(broker.publish("nobody", &Bytes::from_static(b"x")), 0);
    }

    #[test]
    fn pattern_subscribers_receive_pmessage() {
        let broker = PubSubManager::new();
        let (tx, mut rx) = subscriber();
        assert!(broker.psubscribe("news.*", 1, tx));

        assert_eq!(broker.publish("news.tech", &Bytes::from_static(b"m")), 1);
        assert_eq!(broker.publish("news.sports", &Bytes::from_static(b"m")), 1);
        assert_eq!(broker.publish("weather", &Bytes::from_static(b"m")), 0);

        let delivery = rx.try_recv().unwrap();
        assert!(delivery.starts_with(b"*4\r\n$8\r\npmessage\r\n"));
    }

    #[test]
    fn direct_and_pattern_both_count() {
        let broker = PubSubManager::new();
        let (tx1, _rx1) = subscriber();
        let (tx2, _rx2) = subscriber();
        broker.subscribe("news.tech", 1, tx1);
        broker.psubscribe("news.*", 2, tx2);

        assert_eq!(broker.publish("news.tech", &Bytes::from_static(b"m")), 2);
    }

    #[test]
    fn one_connection_matched_by_two_patterns_counts_twice() {
        let broker = PubSubManager::new();
        let (tx, mut rx) = subscriber();
        broker.psubscribe("news.*", 7, tx.clone());
        broker.psubscribe("*.tech", 7, tx);

        assert_eq!(broker.publish("news.tech", &Bytes::from_static(b"m")), 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let broker = PubSubManager::new();
        let (tx, _rx) = subscriber();
        broker.subscribe("ch", 1, tx);
        broker.unsubscribe("ch", 1);
        assert_eq!(broker.publish("ch", &Bytes::from_static(b"m")), 0);
    }

    #[test]
    fn disconnected_subscriber_counts_zero() {
        let broker = PubSubManager::new();
        let (tx, rx) = subscriber();
        broker.subscribe("ch", 1, tx);
        drop(rx);
        assert_eq!(broker.publish("ch", &Bytes::from_static(b"m")), 0);
    }

    #[test]
    fn remove_connection_clears_everything() {
        let broker = PubSubManager::new();
        let (tx, _rx) = subscriber();
        broker.subscribe("a", 1, tx.clone());
        broker.subscribe("b", 1, tx.clone());
        broker.psubscribe("p.*", 1, tx);

        let channels = vec!["a".to_string(), "b".to_string()];
        let patterns = vec!["p.*".to_string()];
        broker.remove_connection(1, &channels, &patterns);

        assert_eq!(broker.publish("a", &Bytes::from_static(b"m")), 0);
        assert_eq!(broker.publish("b", &Bytes::from_static(b"m")), 0);
        assert_eq!(broker.publish("p.x", &Bytes::from_static(b"m")), 0);
    }

    #[test]
    fn oversized_pattern_rejected() {
        let broker = PubSubManager::new();
        let (tx, _rx) = subscriber();
        let long = "*".repeat(MAX_PATTERN_LEN + 1);
        assert!(!broker.psubscribe(&long, 1, tx.clone()));
        let ok = "*".repeat(MAX_PATTERN_LEN);
        assert!(broker.psubscribe(&ok, 1, tx));
    }
}
