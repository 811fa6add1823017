pub mod client;

pub use client::ZulipClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Message, MessagePost, NarrowOperator};

/// Where a message fetch is centered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Newest,
    Id(u64),
}

impl Anchor {
    pub fn as_param(&self) -> String {
        match self {
            Anchor::Newest => "newest".to_string(),
            Anchor::Id(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub anchor: Anchor,
    pub num_before: u32,
    pub num_after: u32,
    /// Empty for a home-wide fetch
    pub narrow: Vec<NarrowOperator>,
}

impl FetchRequest {
    pub fn is_home_scoped(&self) -> bool {
        self.narrow.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub messages: Vec<Message>,
}

impl FetchResult {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn min_id(&self) -> Option<u64> {
        self.messages.iter().map(|m| m.id).min()
    }

    pub fn max_id(&self) -> Option<u64> {
        self.messages.iter().map(|m| m.id).max()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Session state handed back by the server on registration.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub max_message_id: Option<u64>,
    pub subscriptions: Vec<Subscription>,
}

/// Remote message source. The coordinator only ever talks to the server
/// through this trait.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResult>;

    async fn register(&self) -> Result<Registration>;

    async fn send_message(&self, post: &MessagePost) -> Result<()>;
}
