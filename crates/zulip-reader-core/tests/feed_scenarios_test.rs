use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use zulip_reader_core::feed::FeedDiff;
use zulip_reader_core::models::{FeedPosition, NarrowOperator};
use zulip_reader_core::net::{Anchor, FetchRequest, FetchResult, MessageSource, Registration};
use zulip_reader_core::render::RawRenderer;
use zulip_reader_core::store::{CursorStore, Database};
use zulip_reader_core::{
    ChannelConsumer, CoreConfig, FeedCoordinator, FeedEvent, FeedUpdate, Intent, Message,
    MessageKind, MessagePost, Narrow, Result,
};

/// In-memory stand-in for a Zulip realm answering narrow/anchor queries.
#[derive(Default)]
struct FakeServer {
    messages: Mutex<Vec<Message>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeServer {
    fn with_messages(mut messages: Vec<Message>) -> Self {
        messages.sort_by_key(|m| m.id);
        Self {
            messages: Mutex::new(messages),
            ..Self::default()
        }
    }

    fn push(&self, message: Message) {
        let mut messages = self.messages.lock();
        messages.push(message);
        messages.sort_by_key(|m| m.id);
    }

    fn matches(operators: &[NarrowOperator], message: &Message) -> bool {
        operators.iter().all(|op| match (op.operator.as_str(), op.operand.as_str()) {
            ("stream", stream) => {
                message.kind == MessageKind::Stream && message.recipients.contains(stream)
            }
            ("topic", topic) => message.subject == topic,
            ("pm-with", emails) => {
                message.kind == MessageKind::Private
                    && emails.split(',').all(|e| message.recipients.contains(e))
            }
            ("is", "private") => message.kind == MessageKind::Private,
            ("is", "mentioned") => message.mentioned,
            _ => false,
        })
    }
}

#[async_trait]
impl MessageSource for FakeServer {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResult> {
        self.requests.lock().push(request.clone());
        let matching: Vec<Message> = self
            .messages
            .lock()
            .iter()
            .filter(|m| Self::matches(&request.narrow, m))
            .cloned()
            .collect();

        let before = request.num_before as usize;
        let after = request.num_after as usize;
        let page = match request.anchor {
            Anchor::Newest => {
                let start = matching.len().saturating_sub(before);
                matching[start..].to_vec()
            }
            Anchor::Id(anchor) => {
                let older: Vec<Message> =
                    matching.iter().filter(|m| m.id < anchor).cloned().collect();
                let start = older.len().saturating_sub(before);
                let mut page = older[start..].to_vec();
                page.extend(matching.iter().filter(|m| m.id == anchor).cloned());
                page.extend(matching.iter().filter(|m| m.id > anchor).take(after).cloned());
                page
            }
        };
        Ok(FetchResult::new(page))
    }

    async fn register(&self) -> Result<Registration> {
        Ok(Registration {
            max_message_id: self.messages.lock().last().map(|m| m.id),
            subscriptions: vec![],
        })
    }

    async fn send_message(&self, _post: &MessagePost) -> Result<()> {
        Ok(())
    }
}

fn topic_message(id: u64, stream: &str, topic: &str) -> Message {
    Message::stream(id, "ann@example.com", stream, topic, "hello")
}

fn feed_with(
    server: Arc<FakeServer>,
    window: usize,
) -> (FeedCoordinator, Arc<Database>, UnboundedReceiver<FeedEvent>) {
    let db = Arc::new(Database::in_memory().unwrap());
    let (consumer, rx) = ChannelConsumer::new();
    let config = CoreConfig::default()
        .with_window_size(window)
        .with_refresh_interval(Duration::ZERO);
    let feed = FeedCoordinator::new(
        config,
        db.clone(),
        db.clone(),
        server,
        Arc::new(RawRenderer),
        Arc::new(consumer),
    );
    (feed, db, rx)
}

/// Collect events up to and including the next materialization or no-change.
async fn until_outcome(rx: &mut UnboundedReceiver<FeedEvent>) -> Vec<FeedEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for feed event")
            .expect("feed channel closed");
        let done = matches!(event, FeedEvent::Materialized(_) | FeedEvent::NoChange);
        events.push(event);
        if done {
            return events;
        }
    }
}

fn materialized(events: &[FeedEvent]) -> &FeedUpdate {
    match events.last() {
        Some(FeedEvent::Materialized(update)) => update,
        other => panic!("expected a materialization, got {:?}", other),
    }
}

fn assert_no_badge_raised(events: &[FeedEvent]) {
    assert!(!events.iter().any(|e| matches!(e, FeedEvent::Badge(true))));
}

#[tokio::test]
async fn test_focus_on_empty_view_inserts_everything() {
    let server = Arc::new(FakeServer::with_messages(vec![
        topic_message(1, "general", "lunch"),
        topic_message(2, "general", "lunch"),
        topic_message(3, "general", "lunch"),
        topic_message(4, "general", "dinner"),
        topic_message(5, "general", "dinner"),
    ]));
    let (feed, _db, mut rx) = feed_with(server, 30);

    feed.submit(Intent::focus(Narrow::home()));
    let events = until_outcome(&mut rx).await;
    let update = materialized(&events);

    assert_eq!(update.materialization.section_count(), 2);
    assert_eq!(update.diff.inserted_sections, 0..2);
    assert_eq!(update.diff.inserted_rows.len(), 5);
    assert!(update.diff.deleted_sections.is_empty());
}

#[tokio::test]
async fn test_scroll_up_prepends_older_thread() {
    let server = Arc::new(FakeServer::with_messages(vec![
        topic_message(1, "general", "older"),
        topic_message(2, "general", "older"),
        topic_message(3, "general", "older"),
        topic_message(4, "general", "newer"),
        topic_message(5, "general", "newer"),
        topic_message(6, "general", "newer"),
    ]));
    let (feed, db, mut rx) = feed_with(server.clone(), 3);

    feed.submit(Intent::focus(Narrow::home()));
    let first = until_outcome(&mut rx).await;
    let ids: Vec<u64> = materialized(&first)
        .materialization
        .items()
        .map(|i| i.message_id)
        .collect();
    assert_eq!(ids, vec![4, 5, 6]);

    feed.submit(Intent::scroll_up(Narrow::home()));
    let events = until_outcome(&mut rx).await;
    let update = materialized(&events);

    assert_eq!(
        update.diff,
        FeedDiff {
            deleted_sections: 0..0,
            inserted_sections: 0..1,
            inserted_rows: vec![
                FeedPosition::new(0, 0),
                FeedPosition::new(0, 1),
                FeedPosition::new(0, 2),
            ],
        }
    );
    assert_eq!(update.materialization.item_count(), 6);
    assert_eq!(server.requests.lock()[1].anchor, Anchor::Id(4));
    assert_eq!(db.home_min().unwrap(), Some(1));
}

#[tokio::test]
async fn test_scroll_up_at_start_of_history_reports_no_change() {
    let server = Arc::new(FakeServer::with_messages(vec![
        topic_message(1, "general", "only"),
        topic_message(2, "general", "only"),
    ]));
    let (feed, _db, mut rx) = feed_with(server, 3);

    feed.submit(Intent::focus(Narrow::home()));
    until_outcome(&mut rx).await;

    feed.submit(Intent::scroll_up(Narrow::home()));
    let events = until_outcome(&mut rx).await;
    assert!(matches!(events.last(), Some(FeedEvent::NoChange)));
    assert!(!feed.is_loading());
}

#[tokio::test]
async fn test_refresh_without_new_messages_is_no_change() {
    let server = Arc::new(FakeServer::with_messages(vec![
        topic_message(1, "general", "lunch"),
        topic_message(2, "general", "lunch"),
    ]));
    let (feed, _db, mut rx) = feed_with(server, 2);

    feed.submit(Intent::focus(Narrow::home()));
    until_outcome(&mut rx).await;

    feed.submit(Intent::refresh(Narrow::home()));
    let events = until_outcome(&mut rx).await;

    assert!(matches!(events.last(), Some(FeedEvent::NoChange)));
    assert_no_badge_raised(&events);
    assert_eq!(feed.unread_count(), 0);
    assert_eq!(feed.materialization().item_count(), 2);
}

#[tokio::test]
async fn test_refresh_outside_narrow_badges_until_seen() {
    let server = Arc::new(FakeServer::with_messages(vec![
        topic_message(1, "general", "lunch"),
        topic_message(2, "general", "lunch"),
    ]));
    let (feed, _db, mut rx) = feed_with(server.clone(), 30);

    feed.submit(Intent::focus(Narrow::stream("general")));
    let first = until_outcome(&mut rx).await;
    assert_eq!(materialized(&first).materialization.item_count(), 2);

    server.push(topic_message(99, "random", "gossip"));
    feed.refresh_now();

    // eager badge from the refresh, then the refresh pass changes nothing
    let events = until_outcome(&mut rx).await;
    assert!(events.iter().any(|e| matches!(e, FeedEvent::Badge(true))));
    assert!(matches!(events.last(), Some(FeedEvent::NoChange)));
    assert_eq!(feed.unread_count(), 1);
    assert_eq!(feed.materialization().item_count(), 2);

    feed.submit(Intent::focus(Narrow::stream("random")));
    let events = until_outcome(&mut rx).await;
    let update = materialized(&events);

    assert_eq!(update.materialization.ids(), HashSet::from([99]));
    assert!(events.iter().any(|e| matches!(e, FeedEvent::Badge(false))));
    assert!(events.iter().any(|e| matches!(e, FeedEvent::NewMessages(1))));
    assert_eq!(feed.unread_count(), 0);
}

#[tokio::test]
async fn test_start_registers_and_focuses_home() {
    let server = Arc::new(FakeServer::with_messages(vec![
        topic_message(10, "general", "lunch"),
        topic_message(11, "general", "lunch"),
    ]));
    let (feed, db, mut rx) = feed_with(server, 30);

    feed.start().await.unwrap();
    let events = until_outcome(&mut rx).await;

    assert!(matches!(events[0], FeedEvent::Subscriptions(_)));
    assert_eq!(materialized(&events).materialization.item_count(), 2);
    assert_eq!(db.home_max().unwrap(), Some(11));
    assert_eq!(feed.intent(), Intent::focus(Narrow::home()));
}
