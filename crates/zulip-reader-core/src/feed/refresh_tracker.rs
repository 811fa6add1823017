use std::collections::HashSet;

use crate::models::{CompiledFilter, Materialization, Message};

/// Result of matching pending ids against a fresh materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    /// Whether refreshed messages are still waiting to be seen
    pub badge: bool,
    /// Pending messages that just became visible
    pub newly_visible: usize,
}

/// Ids pulled in by background refreshes that the user has not seen under
/// the active narrow yet.
#[derive(Debug, Default, Clone)]
pub struct RefreshTracker {
    pending: HashSet<u64>,
}

impl RefreshTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every id a refresh fetch returned, matching or not.
    pub fn observe<I: IntoIterator<Item = u64>>(&mut self, ids: I) {
        self.pending.extend(ids);
    }

    /// Checked right after a refresh fetch, before the next materialization.
    ///
    /// True when something stays pending even after taking out the refreshed
    /// messages the active narrow is about to show, so the badge can go up
    /// now instead of blinking off and on.
    pub fn should_badge_eagerly(&self, refreshed: &[Message], filter: &CompiledFilter) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let soon_visible: HashSet<u64> = refreshed
            .iter()
            .filter(|m| filter.matches(m))
            .map(|m| m.id)
            .collect();
        self.pending.iter().any(|id| !soon_visible.contains(id))
    }

    /// Drop every pending id that is now visible.
    pub fn reconcile(&mut self, view: &Materialization) -> Reconciled {
        let before = self.pending.len();
        for item in view.items() {
            self.pending.remove(&item.message_id);
        }
        Reconciled {
            badge: !self.pending.is_empty(),
            newly_visible: before - self.pending.len(),
        }
    }

    /// Explicit unread reset (user went back to the unfiltered home view)
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending(&self) -> &HashSet<u64> {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
