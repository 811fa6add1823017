//! Narrows: the filter deciding which stored messages belong to the view.
//!
//! A `Narrow` is a plain immutable value. Evaluating it goes through
//! [`build`], which compiles the present fields into a closed list of typed
//! clauses once per use; nothing is recomputed behind the caller's back.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::Result;
use crate::models::{Message, MessageKind};
use crate::store::CursorStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Narrow {
    kind: Option<MessageKind>,
    recipients: Option<BTreeSet<String>>,
    subject: Option<String>,
    mentioned: Option<bool>,
    min_id: Option<u64>,
    cache_key: Option<String>,
}

impl Narrow {
    /// Unfiltered home view
    pub fn home() -> Self {
        Self::default()
    }

    pub fn stream(stream: &str) -> Self {
        Self {
            kind: Some(MessageKind::Stream),
            recipients: Some(BTreeSet::from([stream.to_string()])),
            cache_key: Some(format!("stream:{}", stream)),
            ..Self::default()
        }
    }

    pub fn topic(stream: &str, subject: &str) -> Self {
        Self {
            kind: Some(MessageKind::Stream),
            recipients: Some(BTreeSet::from([stream.to_string()])),
            subject: Some(subject.to_string()),
            cache_key: Some(format!("stream:{}/topic:{}", stream, subject)),
            ..Self::default()
        }
    }

    pub fn private_with<S: AsRef<str>>(participants: &[S]) -> Self {
        let recipients: BTreeSet<String> =
            participants.iter().map(|p| p.as_ref().to_string()).collect();
        let key = recipients.iter().cloned().collect::<Vec<_>>().join(",");
        Self {
            kind: Some(MessageKind::Private),
            recipients: Some(recipients),
            cache_key: Some(format!("pm-with:{}", key)),
            ..Self::default()
        }
    }

    pub fn all_private() -> Self {
        Self {
            kind: Some(MessageKind::Private),
            cache_key: Some("is:private".to_string()),
            ..Self::default()
        }
    }

    pub fn mentioned() -> Self {
        Self {
            mentioned: Some(true),
            cache_key: Some("is:mentioned".to_string()),
            ..Self::default()
        }
    }

    pub fn with_min_id(mut self, min_id: u64) -> Self {
        self.min_id = Some(min_id);
        self
    }

    pub fn kind(&self) -> Option<MessageKind> {
        self.kind
    }

    pub fn recipients(&self) -> Option<&BTreeSet<String>> {
        self.recipients.as_ref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// True when no clause restricts the view
    pub fn is_home(&self) -> bool {
        self.kind.is_none()
            && self.recipients.is_none()
            && self.subject.is_none()
            && self.mentioned.is_none()
            && self.min_id.is_none()
    }

    pub fn compile(&self) -> CompiledFilter {
        build(self)
    }

    /// Smallest id to query: the narrow's own cursor if one was ever stored,
    /// the global home minimum otherwise.
    pub fn lower_bound(&self, cursors: &dyn CursorStore) -> Result<u64> {
        if let Some(key) = self.cache_key() {
            if let Some(cursor) = cursors.narrow_cursor(key)? {
                return Ok(cursor);
            }
        }
        Ok(cursors.home_min()?.unwrap_or(0))
    }

    /// Largest id known to be fully fetched
    pub fn upper_bound(&self, cursors: &dyn CursorStore) -> Result<u64> {
        Ok(cursors.home_max()?.unwrap_or(0))
    }

    /// Zulip narrow operators for `GET /messages`
    pub fn to_api_operators(&self) -> Vec<NarrowOperator> {
        let mut operators = Vec::new();

        match (self.kind, &self.recipients) {
            (Some(MessageKind::Stream), Some(recipients)) => {
                for stream in recipients {
                    operators.push(NarrowOperator::new("stream", stream));
                }
            }
            (Some(MessageKind::Private), Some(recipients)) => {
                let joined = recipients.iter().cloned().collect::<Vec<_>>().join(",");
                operators.push(NarrowOperator::new("pm-with", &joined));
            }
            (Some(MessageKind::Private), None) => {
                operators.push(NarrowOperator::new("is", "private"));
            }
            _ => {}
        }

        if let Some(subject) = &self.subject {
            operators.push(NarrowOperator::new("topic", subject));
        }
        if self.mentioned == Some(true) {
            operators.push(NarrowOperator::new("is", "mentioned"));
        }

        operators
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrowOperator {
    pub operator: String,
    pub operand: String,
}

impl NarrowOperator {
    pub fn new(operator: &str, operand: &str) -> Self {
        Self {
            operator: operator.to_string(),
            operand: operand.to_string(),
        }
    }
}

/// One typed condition of a compiled narrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    KindEquals(MessageKind),
    /// Every listed recipient must appear in the message's recipient set
    RecipientsContainAll(BTreeSet<String>),
    SubjectEquals(String),
    MentionedEquals(bool),
    IdAtLeast(u64),
}

impl Clause {
    fn matches(&self, message: &Message) -> bool {
        match self {
            Clause::KindEquals(kind) => message.kind == *kind,
            Clause::RecipientsContainAll(recipients) => recipients.is_subset(&message.recipients),
            Clause::SubjectEquals(subject) => message.subject == *subject,
            Clause::MentionedEquals(mentioned) => message.mentioned == *mentioned,
            Clause::IdAtLeast(min_id) => message.id >= *min_id,
        }
    }
}

/// AND of clauses; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledFilter {
    clauses: Vec<Clause>,
}

impl CompiledFilter {
    pub fn matches(&self, message: &Message) -> bool {
        self.clauses.iter().all(|clause| clause.matches(message))
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
}

pub fn build(narrow: &Narrow) -> CompiledFilter {
    let mut clauses = Vec::with_capacity(5);
    if let Some(kind) = narrow.kind {
        clauses.push(Clause::KindEquals(kind));
    }
    if let Some(recipients) = &narrow.recipients {
        clauses.push(Clause::RecipientsContainAll(recipients.clone()));
    }
    if let Some(subject) = &narrow.subject {
        clauses.push(Clause::SubjectEquals(subject.clone()));
    }
    if let Some(mentioned) = narrow.mentioned {
        clauses.push(Clause::MentionedEquals(mentioned));
    }
    if let Some(min_id) = narrow.min_id {
        clauses.push(Clause::IdAtLeast(min_id));
    }
    CompiledFilter { clauses }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;

    #[test]
    fn test_home_matches_everything() {
        let filter = build(&Narrow::home());
        assert!(filter.clauses().is_empty());
        assert!(filter.matches(&Message::stream(1, "a@x", "general", "t", "")));
        assert!(filter.matches(&Message::private(2, "a@x", &["b@x"], "")));
    }

    #[test]
    fn test_clauses_are_conjunctive() {
        let filter = build(&Narrow::topic("general", "lunch"));
        assert!(filter.matches(&Message::stream(1, "a@x", "general", "lunch", "")));
        assert!(!filter.matches(&Message::stream(2, "a@x", "general", "dinner", "")));
        assert!(!filter.matches(&Message::stream(3, "a@x", "random", "lunch", "")));
    }

    #[test]
    fn test_recipients_must_all_be_present() {
        let filter = build(&Narrow::private_with(&["a@x", "b@x"]));
        assert!(filter.matches(&Message::private(1, "a@x", &["a@x", "b@x", "c@x"], "")));
        assert!(!filter.matches(&Message::private(2, "a@x", &["a@x"], "")));
        // a stream called like a participant is still not private
        assert!(!filter.matches(&Message::stream(3, "a@x", "a@x", "", "")));
    }

    #[test]
    fn test_mentioned_and_min_id() {
        let filter = build(&Narrow::mentioned().with_min_id(10));
        assert!(filter.matches(&Message::stream(10, "a@x", "s", "t", "").mentioning()));
        assert!(!filter.matches(&Message::stream(9, "a@x", "s", "t", "").mentioning()));
        assert!(!filter.matches(&Message::stream(11, "a@x", "s", "t", "")));
    }

    #[test]
    fn test_lower_bound_prefers_narrow_cursor() {
        let db = Database::in_memory().unwrap();
        let narrow = Narrow::stream("general");

        assert_eq!(narrow.lower_bound(&db).unwrap(), 0);

        db.set_home_min(100).unwrap();
        assert_eq!(narrow.lower_bound(&db).unwrap(), 100);

        db.set_narrow_cursor("stream:general", 40).unwrap();
        assert_eq!(narrow.lower_bound(&db).unwrap(), 40);
        assert_eq!(Narrow::home().lower_bound(&db).unwrap(), 100);
    }

    #[test]
    fn test_upper_bound_is_home_max() {
        let db = Database::in_memory().unwrap();
        db.set_home_max(500).unwrap();
        db.set_narrow_cursor("stream:general", 40).unwrap();
        assert_eq!(Narrow::stream("general").upper_bound(&db).unwrap(), 500);
    }

    #[test]
    fn test_api_operators() {
        let ops = Narrow::topic("general", "lunch").to_api_operators();
        assert_eq!(
            ops,
            vec![
                NarrowOperator::new("stream", "general"),
                NarrowOperator::new("topic", "lunch"),
            ]
        );
        assert_eq!(
            Narrow::private_with(&["b@x", "a@x"]).to_api_operators(),
            vec![NarrowOperator::new("pm-with", "a@x,b@x")]
        );
        assert!(Narrow::home().to_api_operators().is_empty());
        assert!(Narrow::home().is_home());
        assert!(!Narrow::mentioned().is_home());
    }
}
