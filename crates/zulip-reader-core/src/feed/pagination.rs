use crate::models::{Materialization, Message, UserAction};

/// Outcome of comparing what the store holds against what an intent needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDecision {
    /// Refresh found nothing newer than the last shown item
    NoNewMessages,
    /// Not enough local data yet; fetch and try again
    Insufficient { required: usize },
    /// Materialize the newest `take` candidates
    Ready { take: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationPolicy {
    window_size: usize,
}

impl PaginationPolicy {
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }

    /// Number of messages the new materialization should hold.
    pub fn required(
        &self,
        action: UserAction,
        old_count: usize,
        last_shown_id: Option<u64>,
        candidates: &[Message],
    ) -> usize {
        match action {
            UserAction::Focus => self.window_size,
            UserAction::ScrollUp => self.window_size + old_count,
            UserAction::Refresh => {
                let newer = match last_shown_id {
                    Some(last_id) => candidates.iter().filter(|m| m.id > last_id).count(),
                    None => candidates.len(),
                };
                old_count + newer
            }
        }
    }

    /// `is_final` is set once the pass already triggered its network fetch.
    pub fn decide(
        &self,
        action: UserAction,
        old: &Materialization,
        candidates: &[Message],
        is_final: bool,
    ) -> PageDecision {
        let old_count = old.item_count();
        let last_shown_id = old.last_item().map(|item| item.message_id);
        let required = self.required(action, old_count, last_shown_id, candidates);
        let available = candidates.len();

        if action == UserAction::Refresh && required == old_count {
            return PageDecision::NoNewMessages;
        }

        if available < required && !is_final {
            return PageDecision::Insufficient { required };
        }

        PageDecision::Ready {
            take: required.min(available),
        }
    }
}

impl Default for PaginationPolicy {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_WINDOW_SIZE)
    }
}

/// The newest `take` messages of an ascending list, still ascending.
pub fn newest_window(candidates: &[Message], take: usize) -> &[Message] {
    let start = candidates.len().saturating_sub(take);
    &candidates[start..]
}
