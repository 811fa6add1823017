pub mod coordinator;
pub mod diff;
pub mod lanes;
pub mod pagination;
pub mod refresh_tracker;
pub mod sectionizer;

pub use coordinator::FeedCoordinator;
pub use diff::{diff, FeedDiff};
pub use lanes::Lane;
pub use pagination::{newest_window, PageDecision, PaginationPolicy};
pub use refresh_tracker::{Reconciled, RefreshTracker};
pub use sectionizer::sectionize;
