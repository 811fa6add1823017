//! Consumer-facing callbacks.
//!
//! Callbacks fire on coordinator-owned tasks. Implementations must not block
//! and must not call back into the coordinator synchronously; forward to your
//! own executor (see [`ChannelConsumer`]) instead.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::feed::FeedDiff;
use crate::models::{Intent, Materialization};
use crate::net::Subscription;

/// A new materialization plus the delta that produced it.
///
/// Shared read-only; the consumer keeps the `Arc` as long as it likes.
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    pub materialization: Arc<Materialization>,
    pub diff: FeedDiff,
    pub intent: Intent,
}

pub trait FeedConsumer: Send + Sync {
    /// A pass produced a change worth rendering.
    fn on_materialized(&self, update: &FeedUpdate);

    /// A pass finished without anything new (stop spinners).
    fn on_no_change(&self);

    /// Unseen refreshed messages exist (or no longer do).
    fn on_badge(&self, visible: bool);

    /// Previously refreshed messages just became visible.
    fn on_new_message_count(&self, count: usize);

    fn on_subscriptions(&self, _subscriptions: &[Subscription]) {}
}

/// Owned form of every callback, for channel transport.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Materialized(FeedUpdate),
    NoChange,
    Badge(bool),
    NewMessages(usize),
    Subscriptions(Vec<Subscription>),
}

/// Forwards callbacks over an unbounded tokio channel.
pub struct ChannelConsumer {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl ChannelConsumer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FeedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: FeedEvent) {
        // Receiver gone means the shell is exiting
        let _ = self.tx.send(event);
    }
}

impl FeedConsumer for ChannelConsumer {
    fn on_materialized(&self, update: &FeedUpdate) {
        self.send(FeedEvent::Materialized(update.clone()));
    }

    fn on_no_change(&self) {
        self.send(FeedEvent::NoChange);
    }

    fn on_badge(&self, visible: bool) {
        self.send(FeedEvent::Badge(visible));
    }

    fn on_new_message_count(&self, count: usize) {
        self.send(FeedEvent::NewMessages(count));
    }

    fn on_subscriptions(&self, subscriptions: &[Subscription]) {
        self.send(FeedEvent::Subscriptions(subscriptions.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Narrow;

    #[tokio::test]
    async fn test_channel_consumer_forwards_in_order() {
        let (consumer, mut rx) = ChannelConsumer::new();
        consumer.on_badge(true);
        consumer.on_materialized(&FeedUpdate {
            materialization: Arc::new(Materialization::empty()),
            diff: FeedDiff::default(),
            intent: Intent::focus(Narrow::home()),
        });
        consumer.on_no_change();

        assert!(matches!(rx.recv().await, Some(FeedEvent::Badge(true))));
        assert!(matches!(rx.recv().await, Some(FeedEvent::Materialized(_))));
        assert!(matches!(rx.recv().await, Some(FeedEvent::NoChange)));
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (consumer, rx) = ChannelConsumer::new();
        drop(rx);
        consumer.on_new_message_count(3);
    }
}
