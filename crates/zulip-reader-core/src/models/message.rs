use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::FLAG_MENTIONED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Stream,
    Private,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Stream => "stream",
            MessageKind::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stream" => Some(MessageKind::Stream),
            "private" => Some(MessageKind::Private),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored chat message. Never mutated once persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned, monotonic and globally unique
    pub id: u64,
    /// Unix seconds
    pub timestamp: i64,
    pub sender_full_name: String,
    pub sender_email: String,
    /// Stream name for stream messages, participant emails for private ones
    pub recipients: BTreeSet<String>,
    /// Topic; empty for private messages
    pub subject: String,
    pub kind: MessageKind,
    /// Raw (unrendered) content
    pub content: String,
    pub mentioned: bool,
    pub avatar_url: Option<String>,
}

impl Message {
    pub fn stream(id: u64, sender_email: &str, stream: &str, subject: &str, content: &str) -> Self {
        Self {
            id,
            timestamp: 0,
            sender_full_name: sender_email.to_string(),
            sender_email: sender_email.to_string(),
            recipients: BTreeSet::from([stream.to_string()]),
            subject: subject.to_string(),
            kind: MessageKind::Stream,
            content: content.to_string(),
            mentioned: false,
            avatar_url: None,
        }
    }

    pub fn private(id: u64, sender_email: &str, recipients: &[&str], content: &str) -> Self {
        Self {
            id,
            timestamp: 0,
            sender_full_name: sender_email.to_string(),
            sender_email: sender_email.to_string(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            subject: String::new(),
            kind: MessageKind::Private,
            content: content.to_string(),
            mentioned: false,
            avatar_url: None,
        }
    }

    pub fn with_sender_name(mut self, name: &str) -> Self {
        self.sender_full_name = name.to_string();
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn mentioning(mut self) -> Self {
        self.mentioned = true;
        self
    }

    /// Convert a `/messages` payload entry.
    ///
    /// For group private messages the current user is dropped from the
    /// recipient set so a conversation groups under its other participants.
    pub fn from_api(raw: ApiMessage, own_email: &str) -> Option<Self> {
        let kind = MessageKind::parse(&raw.kind)?;

        let recipients: BTreeSet<String> = match raw.display_recipient {
            DisplayRecipient::Stream(name) => BTreeSet::from([name]),
            DisplayRecipient::Users(users) => {
                let mut emails: BTreeSet<String> = users.into_iter().map(|u| u.email).collect();
                if emails.len() > 1 {
                    emails.remove(own_email);
                }
                emails
            }
        };

        let subject = match kind {
            MessageKind::Stream => raw.subject,
            MessageKind::Private => String::new(),
        };

        Some(Self {
            id: raw.id,
            timestamp: raw.timestamp,
            sender_full_name: raw.sender_full_name,
            sender_email: raw.sender_email,
            recipients,
            subject,
            kind,
            content: raw.content,
            mentioned: raw.flags.iter().any(|f| f == FLAG_MENTIONED),
            avatar_url: raw.avatar_url,
        })
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }

    /// The (kind, recipients, subject) triple that decides section membership.
    pub fn thread_key(&self) -> (MessageKind, &BTreeSet<String>, &str) {
        (self.kind, &self.recipients, self.subject.as_str())
    }
}

/// Message object as returned by `GET /api/v1/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    pub id: u64,
    pub timestamp: i64,
    pub sender_full_name: String,
    pub sender_email: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub display_recipient: DisplayRecipient,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DisplayRecipient {
    Stream(String),
    Users(Vec<ApiRecipient>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRecipient {
    pub email: String,
    #[serde(default)]
    pub full_name: String,
}

/// Outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePost {
    Stream {
        stream: String,
        topic: String,
        content: String,
    },
    Private {
        recipients: Vec<String>,
        content: String,
    },
}

impl MessagePost {
    /// Form fields for `POST /api/v1/messages`
    pub fn form_params(&self) -> Vec<(&'static str, String)> {
        match self {
            MessagePost::Stream {
                stream,
                topic,
                content,
            } => vec![
                ("type", MessageKind::Stream.as_str().to_string()),
                ("to", stream.clone()),
                ("topic", topic.clone()),
                ("content", content.clone()),
            ],
            MessagePost::Private {
                recipients,
                content,
            } => vec![
                ("type", MessageKind::Private.as_str().to_string()),
                ("to", recipients.join(",")),
                ("content", content.clone()),
            ],
        }
    }
}
