pub mod feed;
pub mod intent;
pub mod message;
pub mod narrow;

pub use feed::{DisplayVariant, FeedItem, FeedPosition, Materialization, Section};
pub use intent::{Intent, UserAction};
pub use message::{ApiMessage, ApiRecipient, DisplayRecipient, Message, MessageKind, MessagePost};
pub use narrow::{build, Clause, CompiledFilter, Narrow, NarrowOperator};
