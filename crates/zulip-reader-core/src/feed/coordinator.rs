//! The feed state machine.
//!
//! Explicit intents run as a preparation pass on the `prepare` lane, which
//! may hand off to the `user-network` lane and come back for one final pass.
//! A timer drives background refreshes on the `refresh-network` lane. Only
//! pass completion writes the stored materialization.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::diff::{diff, FeedDiff};
use super::lanes::{Lane, PREPARE_LANE, REFRESH_NETWORK_LANE, USER_NETWORK_LANE};
use super::pagination::{newest_window, PageDecision, PaginationPolicy};
use super::refresh_tracker::RefreshTracker;
use super::sectionizer::sectionize;
use crate::config::CoreConfig;
use crate::error::Result;
use crate::events::{FeedConsumer, FeedUpdate};
use crate::models::{Intent, Materialization, Message, MessagePost, Narrow, UserAction};
use crate::net::{Anchor, FetchRequest, FetchResult, MessageSource};
use crate::render::{ContentRenderer, MarkdownRenderer};
use crate::store::{CursorStore, Database, MessageStore};

/// Who asked for a pass. User passes own the loading flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    User,
    Refresh,
}

enum PassOutcome {
    NoChange,
    NeedsNetwork,
    Ready {
        stored: Arc<Materialization>,
        shown: Arc<Materialization>,
        diff: FeedDiff,
    },
}

#[derive(Debug, Default)]
struct FeedState {
    /// Last materialization a pass produced
    materialization: Arc<Materialization>,
    /// What the consumer was given (differs only for the empty placeholder)
    shown: Arc<Materialization>,
    intent: Intent,
    loading: bool,
}

struct Inner {
    config: CoreConfig,
    policy: PaginationPolicy,
    store: Arc<dyn MessageStore>,
    cursors: Arc<dyn CursorStore>,
    source: Arc<dyn MessageSource>,
    renderer: Arc<dyn ContentRenderer>,
    consumer: Arc<dyn FeedConsumer>,
    state: Mutex<FeedState>,
    tracker: Mutex<RefreshTracker>,
    refresh_lane: Lane,
    user_lane: Lane,
    prepare_lane: Lane,
    shutdown: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running feed. Cheap to clone; every clone drives the same
/// feed. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct FeedCoordinator {
    inner: Arc<Inner>,
}

impl FeedCoordinator {
    pub fn new(
        config: CoreConfig,
        store: Arc<dyn MessageStore>,
        cursors: Arc<dyn CursorStore>,
        source: Arc<dyn MessageSource>,
        renderer: Arc<dyn ContentRenderer>,
        consumer: Arc<dyn FeedConsumer>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let inner = Arc::new(Inner {
            policy: PaginationPolicy::new(config.window_size),
            config,
            store,
            cursors,
            source,
            renderer,
            consumer,
            state: Mutex::new(FeedState::default()),
            tracker: Mutex::new(RefreshTracker::new()),
            refresh_lane: Lane::spawn(REFRESH_NETWORK_LANE, &shutdown),
            user_lane: Lane::spawn(USER_NETWORK_LANE, &shutdown),
            prepare_lane: Lane::spawn(PREPARE_LANE, &shutdown),
            shutdown,
            timer: Mutex::new(None),
        });
        Self { inner }
    }

    /// Open the on-disk database under `config.data_dir` and render content
    /// as markdown. A database that cannot be opened is fatal.
    pub fn open(
        config: CoreConfig,
        source: Arc<dyn MessageSource>,
        consumer: Arc<dyn FeedConsumer>,
    ) -> Result<Self> {
        let db = Arc::new(Database::open(&config.data_dir)?);
        Ok(Self::new(
            config,
            db.clone(),
            db,
            source,
            Arc::new(MarkdownRenderer),
            consumer,
        ))
    }

    /// Register with the server, then focus the home view.
    pub async fn start(&self) -> Result<()> {
        self.start_with(Narrow::home()).await
    }

    /// Register with the server, then focus `narrow`.
    pub async fn start_with(&self, narrow: Narrow) -> Result<()> {
        let registration = self.inner.source.register().await?;

        if let Some(max_id) = registration.max_message_id {
            let cursors = self.inner.cursors.clone();
            tokio::task::spawn_blocking(move || -> Result<()> {
                // A stored homeMax is kept so refreshes close the gap since last run
                if cursors.home_max()?.is_none() {
                    cursors.set_home_max(max_id)?;
                }
                Ok(())
            })
            .await??;
        }

        info!(
            subscriptions = registration.subscriptions.len(),
            max_message_id = ?registration.max_message_id,
            "Registered with server"
        );
        self.inner
            .emit(|consumer| consumer.on_subscriptions(&registration.subscriptions));
        self.submit(Intent::focus(narrow));
        Ok(())
    }

    /// Start a pass for `intent`. Returns false when the intent was dropped
    /// because a user pass is still in flight.
    pub fn submit(&self, intent: Intent) -> bool {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return false;
        }

        {
            let mut state = inner.state.lock();
            if state.loading {
                debug!(action = ?intent.action, "Intent dropped while loading");
                return false;
            }
            state.loading = true;
            state.intent = intent.clone();
            // Under the state lock so a racing completion sees the cancel
            inner.cancel_lanes();
        }

        debug!(action = ?intent.action, narrow = ?intent.narrow.cache_key(), "Intent accepted");
        inner.restart_timer();
        inner.enqueue_prepare(intent, false, Origin::User, None);
        true
    }

    /// Fetch newer messages right away instead of waiting for the timer.
    pub fn refresh_now(&self) {
        if self.inner.shutdown.is_cancelled() || !self.inner.refresh_lane.is_idle() {
            return;
        }
        self.inner.enqueue_refresh();
    }

    pub async fn post_message(&self, post: MessagePost) -> Result<()> {
        self.inner.source.send_message(&post).await?;

        let (empty, narrow) = {
            let state = self.inner.state.lock();
            (state.materialization.is_empty(), state.intent.narrow.clone())
        };
        if empty {
            self.submit(Intent::focus(narrow));
        } else {
            self.refresh_now();
        }
        Ok(())
    }

    /// Forget every refreshed-but-unseen message.
    pub fn reset_unread(&self) {
        self.inner.tracker.lock().clear();
        self.inner.emit(|consumer| consumer.on_badge(false));
    }

    /// Drop all local messages and cursors (logout).
    pub async fn clear_data(&self) -> Result<()> {
        let inner = &self.inner;
        inner.stop_timer();
        {
            let mut state = inner.state.lock();
            inner.cancel_lanes();
            *state = FeedState::default();
        }
        inner.tracker.lock().clear();

        let store = inner.store.clone();
        let cursors = inner.cursors.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            store.clear_messages()?;
            cursors.clear_cursors()
        })
        .await??;

        info!("Local feed data cleared");
        Ok(())
    }

    /// Stop everything. No callback fires after this returns.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.stop_timer();
        info!("Feed coordinator shut down");
    }

    /// What the consumer was last given
    pub fn materialization(&self) -> Arc<Materialization> {
        self.inner.state.lock().shown.clone()
    }

    pub fn intent(&self) -> Intent {
        self.inner.state.lock().intent.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    pub fn unread_count(&self) -> usize {
        self.inner.tracker.lock().pending().len()
    }
}

impl Inner {
    fn emit(&self, f: impl FnOnce(&dyn FeedConsumer)) {
        if self.shutdown.is_cancelled() {
            return;
        }
        f(self.consumer.as_ref());
    }

    fn cancel_lanes(&self) {
        self.refresh_lane.cancel_all();
        self.user_lane.cancel_all();
        self.prepare_lane.cancel_all();
    }

    fn restart_timer(self: &Arc<Self>) {
        let period = self.config.refresh_interval;
        if period.is_zero() {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(inner) = weak.upgrade() else { break };
                inner.on_refresh_tick();
            }
        });

        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    fn stop_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    fn on_refresh_tick(self: &Arc<Self>) {
        if self.state.lock().materialization.is_empty() {
            trace!("Refresh tick skipped, nothing shown");
            return;
        }
        if !self.refresh_lane.is_idle() {
            trace!("Refresh tick skipped, previous refresh still running");
            return;
        }
        self.enqueue_refresh();
    }

    /// A pass started by `after` lives and dies with that pass's token.
    fn enqueue_prepare(
        self: &Arc<Self>,
        intent: Intent,
        is_final: bool,
        origin: Origin,
        after: Option<&CancellationToken>,
    ) {
        let inner = self.clone();
        let job = move |token| inner.prepare(intent, is_final, origin, token);
        match after {
            Some(origin_token) => self.prepare_lane.enqueue_linked(origin_token, job),
            None => self.prepare_lane.enqueue(job),
        }
    }

    fn enqueue_fetch(self: &Arc<Self>, intent: Intent, after: &CancellationToken) {
        let inner = self.clone();
        self.user_lane
            .enqueue_linked(after, move |token| inner.fetch_for_intent(intent, token));
    }

    fn enqueue_refresh(self: &Arc<Self>) {
        let inner = self.clone();
        self.refresh_lane
            .enqueue(move |token| inner.refresh_pass(token));
    }

    // ===== preparation =====

    async fn prepare(
        self: Arc<Self>,
        intent: Intent,
        is_final: bool,
        origin: Origin,
        token: CancellationToken,
    ) {
        match self.run_prepare(&intent, is_final, &token).await {
            Ok(Some(outcome)) => self.complete(intent, outcome, origin, &token),
            Ok(None) => trace!(action = ?intent.action, "Preparation cancelled"),
            Err(e) => {
                warn!(error = %e, action = ?intent.action, "Preparation failed");
                self.abandon(origin, &token);
            }
        }
    }

    /// `Ok(None)` means the pass was cancelled between phases.
    async fn run_prepare(
        &self,
        intent: &Intent,
        is_final: bool,
        token: &CancellationToken,
    ) -> Result<Option<PassOutcome>> {
        if token.is_cancelled() {
            return Ok(None);
        }

        let store = self.store.clone();
        let cursors = self.cursors.clone();
        let narrow = intent.narrow.clone();
        let stored = tokio::task::spawn_blocking(move || {
            let lower = narrow.lower_bound(cursors.as_ref())?;
            let upper = narrow.upper_bound(cursors.as_ref())?;
            store.query(lower, upper)
        })
        .await??;

        if token.is_cancelled() {
            return Ok(None);
        }

        let (old, previously_shown) = {
            let state = self.state.lock();
            (state.materialization.clone(), state.shown.clone())
        };

        let filter = intent.narrow.compile();
        // Scrolling up only ever prepends
        let ceiling = match intent.action {
            UserAction::ScrollUp => old.last_item().map(|item| item.message_id),
            _ => None,
        };
        let candidates: Vec<Message> = stored
            .into_iter()
            .filter(|m| filter.matches(m))
            .filter(|m| ceiling.map_or(true, |max| m.id <= max))
            .collect();

        let decision = self
            .policy
            .decide(intent.action, &old, &candidates, is_final);
        debug!(
            action = ?intent.action,
            candidates = candidates.len(),
            shown = old.item_count(),
            is_final,
            ?decision,
            "Pagination decision"
        );

        let take = match decision {
            PageDecision::NoNewMessages => return Ok(Some(PassOutcome::NoChange)),
            PageDecision::Insufficient { .. } => return Ok(Some(PassOutcome::NeedsNetwork)),
            PageDecision::Ready { take } => take,
        };

        let materialization = sectionize(newest_window(&candidates, take), self.renderer.as_ref());
        if token.is_cancelled() {
            return Ok(None);
        }

        let stored = Arc::new(materialization);
        let shown = if intent.action == UserAction::Focus && stored.is_empty() {
            Arc::new(Materialization::placeholder(&intent.narrow))
        } else {
            stored.clone()
        };
        // Nothing real on screen: splice in the whole view
        let diff_action = if old.is_empty() {
            UserAction::Focus
        } else {
            intent.action
        };
        let diff = diff(&previously_shown, &shown, diff_action);
        if token.is_cancelled() {
            return Ok(None);
        }

        Ok(Some(PassOutcome::Ready {
            stored,
            shown,
            diff,
        }))
    }

    /// Single writer of the stored materialization.
    fn complete(
        self: &Arc<Self>,
        intent: Intent,
        outcome: PassOutcome,
        origin: Origin,
        token: &CancellationToken,
    ) {
        let (stored, shown, diff) = match outcome {
            PassOutcome::NeedsNetwork => {
                self.enqueue_fetch(intent, token);
                return;
            }
            PassOutcome::NoChange => {
                self.finish_without_change(token);
                return;
            }
            PassOutcome::Ready {
                stored,
                shown,
                diff,
            } => (stored, shown, diff),
        };

        let changed = !diff.is_empty() || intent.action == UserAction::Focus;
        let reconciled = {
            let mut state = self.state.lock();
            if token.is_cancelled() {
                return;
            }
            state.loading = false;
            let reconciled = self.tracker.lock().reconcile(&stored);
            if changed {
                state.materialization = stored;
                state.shown = shown.clone();
            }
            reconciled
        };

        self.emit(|consumer| consumer.on_badge(reconciled.badge));
        if reconciled.newly_visible > 0 {
            self.emit(|consumer| consumer.on_new_message_count(reconciled.newly_visible));
        }

        if !changed {
            debug!(action = ?intent.action, ?origin, "Pass produced no change");
            self.emit(|consumer| consumer.on_no_change());
            return;
        }

        self.refresh_lane.cancel_all();
        debug!(
            action = ?intent.action,
            ?origin,
            sections = shown.section_count(),
            inserted_rows = diff.inserted_rows.len(),
            "Materialized"
        );
        let update = FeedUpdate {
            materialization: shown,
            diff,
            intent,
        };
        self.emit(|consumer| consumer.on_materialized(&update));
    }

    fn finish_without_change(&self, token: &CancellationToken) {
        let reconciled = {
            let mut state = self.state.lock();
            if token.is_cancelled() {
                return;
            }
            state.loading = false;
            self.tracker.lock().reconcile(&state.materialization)
        };
        self.emit(|consumer| consumer.on_badge(reconciled.badge));
        self.emit(|consumer| consumer.on_no_change());
    }

    /// A pass failed; leave the materialization alone.
    fn abandon(&self, origin: Origin, token: &CancellationToken) {
        if origin == Origin::Refresh {
            return;
        }
        {
            let mut state = self.state.lock();
            if token.is_cancelled() {
                return;
            }
            state.loading = false;
        }
        self.emit(|consumer| consumer.on_no_change());
    }

    // ===== network =====

    fn request_for(&self, intent: &Intent) -> Result<FetchRequest> {
        let window = u32::try_from(self.config.window_size).unwrap_or(u32::MAX);
        let narrow = intent.narrow.to_api_operators();

        let request = match intent.action {
            UserAction::Focus => FetchRequest {
                anchor: Anchor::Newest,
                num_before: window,
                num_after: 0,
                narrow,
            },
            UserAction::ScrollUp => {
                let lower = intent.narrow.lower_bound(self.cursors.as_ref())?;
                FetchRequest {
                    anchor: if lower == 0 {
                        Anchor::Newest
                    } else {
                        Anchor::Id(lower)
                    },
                    num_before: window,
                    num_after: 0,
                    narrow,
                }
            }
            UserAction::Refresh => match self.refresh_request()? {
                Some(request) => request,
                None => FetchRequest {
                    anchor: Anchor::Newest,
                    num_before: window,
                    num_after: 0,
                    narrow: Vec::new(),
                },
            },
        };
        Ok(request)
    }

    /// Home-wide fetch of everything after `homeMax`
    fn refresh_request(&self) -> Result<Option<FetchRequest>> {
        Ok(self.cursors.home_max()?.map(|max_id| FetchRequest {
            anchor: Anchor::Id(max_id),
            num_before: 0,
            num_after: self.config.refresh_batch,
            narrow: Vec::new(),
        }))
    }

    async fn fetch_and_store(
        &self,
        request: FetchRequest,
        narrow: &Narrow,
        token: &CancellationToken,
    ) -> Option<Result<FetchResult>> {
        let result = tokio::select! {
            _ = token.cancelled() => return None,
            result = self.source.fetch(request.clone()) => result,
        };
        let result = match result {
            Ok(result) => result,
            Err(e) => return Some(Err(e)),
        };

        let store = self.store.clone();
        let cursors = self.cursors.clone();
        let cache_key = narrow.cache_key().map(str::to_string);
        let home_scoped = request.is_home_scoped();
        let stored = tokio::task::spawn_blocking(move || {
            store_fetched(
                store.as_ref(),
                cursors.as_ref(),
                result,
                home_scoped,
                cache_key.as_deref(),
            )
        })
        .await;
        Some(match stored {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        })
    }

    async fn fetch_for_intent(self: Arc<Self>, intent: Intent, token: CancellationToken) {
        if token.is_cancelled() {
            return;
        }

        let request = match self.request_for(&intent) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Could not resolve fetch cursors");
                self.abandon(Origin::User, &token);
                return;
            }
        };

        let fetched = match self.fetch_and_store(request, &intent.narrow, &token).await {
            None => return,
            Some(Ok(fetched)) => fetched,
            Some(Err(e)) => {
                warn!(error = %e, action = ?intent.action, "Message fetch failed");
                self.abandon(Origin::User, &token);
                return;
            }
        };

        if token.is_cancelled() {
            return;
        }
        if intent.action == UserAction::ScrollUp && fetched.is_empty() {
            debug!("No older messages on the server");
            self.finish_without_change(&token);
            return;
        }
        self.enqueue_prepare(intent, true, Origin::User, Some(&token));
    }

    async fn refresh_pass(self: Arc<Self>, token: CancellationToken) {
        if token.is_cancelled() {
            return;
        }

        let request = match self.refresh_request() {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Could not read refresh cursor");
                return;
            }
        };
        let since = match request.anchor {
            Anchor::Id(id) => id,
            Anchor::Newest => 0,
        };

        let fetched = match self.fetch_and_store(request, &Narrow::home(), &token).await {
            None => return,
            Some(Ok(fetched)) => fetched,
            Some(Err(e)) => {
                warn!(error = %e, "Refresh fetch failed");
                return;
            }
        };
        if token.is_cancelled() {
            return;
        }

        let fresh: Vec<Message> = fetched
            .messages
            .into_iter()
            .filter(|m| m.id > since)
            .collect();
        if fresh.is_empty() {
            trace!("Refresh found nothing new");
            return;
        }

        let (intent, eager) = {
            let state = self.state.lock();
            if token.is_cancelled() {
                return;
            }
            let intent = state.intent.with_action(UserAction::Refresh);
            let mut tracker = self.tracker.lock();
            tracker.observe(fresh.iter().map(|m| m.id));
            let eager = tracker.should_badge_eagerly(&fresh, &intent.narrow.compile());
            (intent, eager)
        };
        debug!(fresh = fresh.len(), eager, "Refresh fetched new messages");
        if eager {
            self.emit(|consumer| consumer.on_badge(true));
        }

        // Decided and enqueued under the state lock: a submit that lands after
        // this point cancels `token` and with it the linked preparation.
        let state = self.state.lock();
        if token.is_cancelled() {
            return;
        }
        if state.loading || !self.prepare_lane.is_idle() || !self.user_lane.is_idle() {
            trace!("Refresh materialization deferred, other work pending");
            return;
        }
        self.enqueue_prepare(intent, true, Origin::Refresh, Some(&token));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.stop_timer();
    }
}

/// Persist a fetch and advance the cursors it covers.
fn store_fetched(
    store: &dyn MessageStore,
    cursors: &dyn CursorStore,
    result: FetchResult,
    home_scoped: bool,
    cache_key: Option<&str>,
) -> Result<FetchResult> {
    let (Some(min_id), Some(max_id)) = (result.min_id(), result.max_id()) else {
        return Ok(result);
    };

    let inserted = store.insert_messages(&result.messages)?;
    trace!(fetched = result.messages.len(), inserted, "Stored fetched messages");

    if home_scoped {
        let home_min = cursors.home_min()?.map_or(min_id, |c| c.min(min_id));
        let home_max = cursors.home_max()?.map_or(max_id, |c| c.max(max_id));
        cursors.set_home_min(home_min)?;
        cursors.set_home_max(home_max)?;
        return Ok(result);
    }

    if let Some(key) = cache_key {
        let lower = cursors.narrow_cursor(key)?.map_or(min_id, |c| c.min(min_id));
        cursors.set_narrow_cursor(key, lower)?;
    }
    if cursors.home_max()?.is_none() {
        cursors.set_home_max(max_id)?;
    }
    Ok(result)
}
