use chrono::DateTime;
use zulip_reader_core::models::{DisplayVariant, FeedItem};
use zulip_reader_core::{FeedEvent, FeedUpdate, MessageKind};

fn thread_header(item: &FeedItem) -> String {
    let recipients = item.recipients.iter().cloned().collect::<Vec<_>>().join(", ");
    match item.kind {
        MessageKind::Stream => format!("#{} > {}", recipients, item.subject),
        MessageKind::Private => format!("PM with {}", recipients),
    }
}

fn format_item(item: &FeedItem, out: &mut String) {
    if item.row == 0 {
        out.push_str(&format!("\n{}\n", thread_header(item)));
    }
    if item.variant == DisplayVariant::Normal && !item.sender_full_name.is_empty() {
        let time = DateTime::from_timestamp(item.timestamp, 0)
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default();
        out.push_str(&format!("  {} [{}]\n", item.sender_full_name, time));
    }
    for line in item.content.lines() {
        out.push_str(&format!("    {}\n", line));
    }
}

/// The rows an update inserted, grouped under their thread headers.
pub fn format_update(update: &FeedUpdate) -> String {
    let mut out = String::new();
    let mut positions = update.diff.inserted_rows.clone();
    positions.sort();
    for position in positions {
        if let Some(item) = update.materialization.item_at(position) {
            format_item(item, &mut out);
        }
    }
    out
}

pub fn format_event(event: &FeedEvent) -> Option<String> {
    match event {
        FeedEvent::Materialized(update) => Some(format_update(update)),
        FeedEvent::NoChange | FeedEvent::Badge(false) => None,
        FeedEvent::Badge(true) => Some("* unread messages elsewhere (h to see everything)".to_string()),
        FeedEvent::NewMessages(count) => Some(format!("({} new)", count)),
        FeedEvent::Subscriptions(subscriptions) => {
            let names: Vec<&str> = subscriptions.iter().map(|s| s.name.as_str()).collect();
            Some(format!("subscribed: {}", names.join(", ")))
        }
    }
}
