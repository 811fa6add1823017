pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod feed;
pub mod models;
pub mod net;
pub mod render;
pub mod store;
pub mod tracing_setup;

// Re-export the pieces an application shell needs at crate root
pub use config::CoreConfig;
pub use error::{FeedError, Result};
pub use events::{ChannelConsumer, FeedConsumer, FeedEvent, FeedUpdate};
pub use feed::FeedCoordinator;
pub use models::{Intent, Materialization, Message, MessageKind, MessagePost, Narrow, UserAction};
