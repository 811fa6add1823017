use crate::models::Narrow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserAction {
    /// Replace the whole view
    Focus,
    /// Extend the view with older messages
    ScrollUp,
    /// Extend the view with newer messages without moving it
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub narrow: Narrow,
    pub action: UserAction,
}

impl Intent {
    pub fn new(narrow: Narrow, action: UserAction) -> Self {
        Self { narrow, action }
    }

    pub fn focus(narrow: Narrow) -> Self {
        Self::new(narrow, UserAction::Focus)
    }

    pub fn scroll_up(narrow: Narrow) -> Self {
        Self::new(narrow, UserAction::ScrollUp)
    }

    pub fn refresh(narrow: Narrow) -> Self {
        Self::new(narrow, UserAction::Refresh)
    }

    /// Same narrow, different action
    pub fn with_action(&self, action: UserAction) -> Self {
        Self::new(self.narrow.clone(), action)
    }
}

impl Default for Intent {
    fn default() -> Self {
        Self::focus(Narrow::home())
    }
}
