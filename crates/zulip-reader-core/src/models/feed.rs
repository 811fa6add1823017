use std::collections::{BTreeSet, HashSet};

use crate::constants::{DEFAULT_TOPIC, EMPTY_FEED_TEXT};
use crate::models::{MessageKind, Narrow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayVariant {
    /// Full item with sender chrome
    Normal,
    /// Same sender as the item right above it in the section
    Compact,
}

/// (section, row) address of an item in a materialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedPosition {
    pub section: usize,
    pub row: usize,
}

impl FeedPosition {
    pub fn new(section: usize, row: usize) -> Self {
        Self { section, row }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub message_id: u64,
    pub section: usize,
    pub row: usize,
    pub variant: DisplayVariant,
    /// Rendered content
    pub content: String,
    pub kind: MessageKind,
    pub recipients: BTreeSet<String>,
    pub subject: String,
    pub sender_full_name: String,
    pub sender_email: String,
    pub timestamp: i64,
    pub avatar_url: Option<String>,
}

impl FeedItem {
    pub fn position(&self) -> FeedPosition {
        FeedPosition::new(self.section, self.row)
    }
}

/// Contiguous run of items sharing (kind, recipients, subject).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub items: Vec<FeedItem>,
}

impl Section {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// The grouped, id-ordered view of qualifying messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialization {
    pub sections: Vec<Section>,
}

impl Materialization {
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(Section::is_empty)
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn item_count(&self) -> usize {
        self.sections.iter().map(Section::len).sum()
    }

    /// Items in display order (section by section, row by row)
    pub fn items(&self) -> impl Iterator<Item = &FeedItem> {
        self.sections.iter().flat_map(|s| s.items.iter())
    }

    pub fn ids(&self) -> HashSet<u64> {
        self.items().map(|item| item.message_id).collect()
    }

    pub fn last_item(&self) -> Option<&FeedItem> {
        self.sections.iter().rev().find_map(|s| s.items.last())
    }

    pub fn positions(&self) -> Vec<FeedPosition> {
        self.items().map(FeedItem::position).collect()
    }

    pub fn item_at(&self, position: FeedPosition) -> Option<&FeedItem> {
        self.sections
            .get(position.section)
            .and_then(|s| s.items.get(position.row))
    }

    /// Single-item view shown when a Focus finds no messages, shaped after
    /// the narrow so the consumer can offer to start that conversation.
    pub fn placeholder(narrow: &Narrow) -> Self {
        let kind = narrow.kind().unwrap_or(MessageKind::Stream);
        let subject = match kind {
            MessageKind::Stream => narrow.subject().unwrap_or(DEFAULT_TOPIC).to_string(),
            MessageKind::Private => String::new(),
        };
        let item = FeedItem {
            message_id: 0,
            section: 0,
            row: 0,
            variant: DisplayVariant::Compact,
            content: EMPTY_FEED_TEXT.to_string(),
            kind,
            recipients: narrow.recipients().cloned().unwrap_or_default(),
            subject,
            sender_full_name: String::new(),
            sender_email: String::new(),
            timestamp: 0,
            avatar_url: None,
        };
        Self::new(vec![Section { items: vec![item] }])
    }
}
