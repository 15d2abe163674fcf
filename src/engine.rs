//! # Session Engine
//!
//! Stateful engine that keeps the derived comparison state consistent with
//! the host page. All mutable session state (the current route, the
//! rendered comparison strings, the sidebar visibility flags) lives here
//! rather than in ambient module globals, so a whole session can be driven
//! deterministically in tests.
//!
//! ## Architecture
//!
//! The engine is single-threaded and event-driven. The host forwards
//! mutation notifications and calls [`CompareEngine::tick`] with the
//! current time; the engine drains its due triggers (startup delay,
//! trailing-edge debounce, poll backstop), re-extracts the route, and
//! recomputes the comparison through a render cache so unchanged output
//! never reaches the display. Storage is synchronous, so every write
//! completes before any dependent read.

use crate::error::Result;
use crate::extract::{extract_route, PageSource};
use crate::projection::{project, Metric, RenderCache};
use crate::store::{Capacity, KeyValueStore, MoveDirection, RaceStore};
use crate::watch::{
    is_valid_activity, ActivityEdge, ActivityWatcher, ChangeDetector, Mutation, WatchConfig,
};
use crate::workflow::{self, IdGenerator, PendingSave, RaceCandidate, SaveError, SaveOutcome};
use crate::{Race, Route, MAX_RACES};

/// Path fragment identifying the supported route-builder page.
pub const ROUTE_BUILDER_PATH: &str = "/maps/create";

// ============================================================================
// Command channel
// ============================================================================

/// Requests arriving from the toolbar control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open the panel for the current page; idempotent
    OpenPanel,
    /// Report whether the current page is the supported route builder
    CheckPage,
}

/// Responses to [`Command`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResponse {
    PanelOpened,
    Page { is_route_builder: bool },
}

// ============================================================================
// Events
// ============================================================================

/// Engine event types for notifying the presentation layer of changes.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The extracted route changed; re-read it through [`CompareEngine::route`]
    RouteChanged,
    /// A comparison badge changed. `None` per metric means that metric's
    /// rendered text is unchanged and must not be re-rendered.
    ComparisonChanged {
        gain: Option<String>,
        loss: Option<String>,
    },
    /// No comparison applies anymore (no selection, incomplete route)
    ComparisonCleared,
    SidebarOpened,
    SidebarClosed,
    /// The stored race collection changed
    RacesChanged,
    /// User-visible advisory text (e.g. nearing the collection ceiling)
    Advisory(String),
}

// ============================================================================
// Compare Engine
// ============================================================================

/// The per-tab session engine.
///
/// Owns the page adapter, the race store, both watchers, and every piece
/// of mutable session state. Hosts feed it mutations and time; it answers
/// with [`EngineEvent`]s.
pub struct CompareEngine<P: PageSource, S: KeyValueStore> {
    page: P,
    store: RaceStore<S>,
    config: WatchConfig,

    detector: ChangeDetector,
    activity: ActivityWatcher,
    render: RenderCache,
    ids: IdGenerator,

    // Session state
    route: Route,
    selected_race: Option<String>,
    sidebar_open: bool,
    manual_close: bool,
    selector_probe_at: Option<i64>,

    pending: Vec<EngineEvent>,
}

impl<P: PageSource, S: KeyValueStore> CompareEngine<P, S> {
    /// Create an engine for one page session, restoring persisted
    /// preferences. Storage faults during restore degrade to defaults.
    pub fn new(page: P, store: S, config: WatchConfig, now_ms: i64) -> Self {
        let store = RaceStore::new(store);

        let closed = store.sidebar_closed().unwrap_or_else(|e| {
            log::error!("[Engine] failed to read sidebar state: {}", e);
            false
        });
        let manual_close = store.sidebar_manual_close().unwrap_or_else(|e| {
            log::error!("[Engine] failed to read manual-close flag: {}", e);
            false
        });

        // Restore the last comparison selection only if the race still exists
        let selected_race = match store.last_used() {
            Ok(Some(id)) => match store.race(&id) {
                Ok(Some(_)) => Some(id),
                _ => None,
            },
            Ok(None) => None,
            Err(e) => {
                log::error!("[Engine] failed to read last-used race: {}", e);
                None
            }
        };

        log::info!("[Engine] session started");

        Self {
            page,
            store,
            config,
            detector: ChangeDetector::new(config, now_ms),
            activity: ActivityWatcher::new(),
            render: RenderCache::new(),
            ids: IdGenerator::new(),
            route: Route::default(),
            selected_race,
            sidebar_open: !closed,
            manual_close,
            selector_probe_at: Some(now_ms),
            pending: Vec::new(),
        }
    }

    // ========================================================================
    // Host notifications
    // ========================================================================

    /// Feed a host-page mutation notification. Irrelevant mutations are
    /// dropped without scheduling work.
    pub fn on_mutation(&mut self, mutation: &Mutation, now_ms: i64) {
        self.detector.observe(mutation, now_ms);
    }

    /// The activity-type selector's subtree mutated; re-check it now.
    pub fn on_selector_mutation(&mut self, now_ms: i64) -> Vec<EngineEvent> {
        self.check_activity(now_ms);
        self.take_events()
    }

    /// Advance the engine to `now_ms`, draining any due triggers.
    pub fn tick(&mut self, now_ms: i64) -> Vec<EngineEvent> {
        if self.selector_probe_at.is_some_and(|at| now_ms >= at) {
            self.check_activity(now_ms);
        }

        if !self.detector.poll(now_ms).is_empty() {
            self.recompute();
        }

        self.take_events()
    }

    /// Earliest time at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> i64 {
        let mut deadline = self.detector.next_deadline();
        if let Some(at) = self.selector_probe_at {
            deadline = deadline.min(at);
        }
        deadline
    }

    /// Drain events produced by imperative calls since the last drain.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.pending)
    }

    // ========================================================================
    // Extraction and comparison
    // ========================================================================

    fn recompute(&mut self) {
        // The route is replaced wholesale: fields the new pass did not
        // find must not linger from the previous pass.
        let route = extract_route(&self.page);
        let changed = route != self.route;
        self.route = route;
        if changed {
            self.pending.push(EngineEvent::RouteChanged);
        }
        self.refresh_comparison();
    }

    fn refresh_comparison(&mut self) {
        let projection = self.selected_race.as_deref().and_then(|id| {
            match self.store.race(id) {
                Ok(Some(race)) => project(&self.route, &race),
                Ok(None) => None,
                Err(e) => {
                    log::error!("[Engine] race lookup failed: {}", e);
                    None
                }
            }
        });

        match projection {
            Some(p) => {
                let gain_badge = p.gain.badge();
                let loss_badge = p.loss.badge();
                let gain = self
                    .render
                    .submit(Metric::Gain, &gain_badge)
                    .then_some(gain_badge);
                let loss = self
                    .render
                    .submit(Metric::Loss, &loss_badge)
                    .then_some(loss_badge);
                if gain.is_some() || loss.is_some() {
                    self.pending
                        .push(EngineEvent::ComparisonChanged { gain, loss });
                }
            }
            None => {
                let gain_cleared = self.render.submit(Metric::Gain, "");
                let loss_cleared = self.render.submit(Metric::Loss, "");
                if gain_cleared || loss_cleared {
                    self.pending.push(EngineEvent::ComparisonCleared);
                }
            }
        }
    }

    // ========================================================================
    // Activity type and sidebar visibility
    // ========================================================================

    fn check_activity(&mut self, now_ms: i64) {
        let text = match self.page.activity_selector_text() {
            Some(text) => text,
            None => {
                // Selector not rendered yet; retry until it exists
                self.selector_probe_at = Some(now_ms + self.config.selector_retry_ms);
                return;
            }
        };
        self.selector_probe_at = None;

        let first_observation = self.activity.current().is_none();
        match self.activity.observe(&text) {
            Some(ActivityEdge::EnteredValid) => {
                if !self.sidebar_open && !self.manual_close {
                    log::info!("[Engine] auto-opened sidebar for '{}'", text.trim());
                    self.set_sidebar(true, false);
                }
            }
            Some(ActivityEdge::ExitedValid) => {
                // Auto-close clears the manual flag so the next valid
                // activity auto-opens again
                if self.sidebar_open {
                    log::info!("[Engine] auto-closed sidebar for '{}'", text.trim());
                }
                self.set_sidebar(false, false);
            }
            None => {
                if first_observation && !is_valid_activity(&text) && self.sidebar_open {
                    self.set_sidebar(false, false);
                }
            }
        }
    }

    fn set_sidebar(&mut self, open: bool, manual_close: bool) {
        let changed = self.sidebar_open != open;
        self.sidebar_open = open;
        self.manual_close = manual_close;

        if let Err(e) = self.store.set_sidebar_state(!open, manual_close) {
            log::error!("[Engine] failed to persist sidebar state: {}", e);
        }
        if changed {
            self.pending.push(if open {
                EngineEvent::SidebarOpened
            } else {
                EngineEvent::SidebarClosed
            });
        }
    }

    /// The user explicitly closed the panel. Suppresses auto-open until
    /// the activity type leaves and re-enters a valid state.
    pub fn close_panel(&mut self) -> Vec<EngineEvent> {
        self.set_sidebar(false, true);
        self.take_events()
    }

    // ========================================================================
    // Race selection and comparison
    // ========================================================================

    /// Select a race for comparison (persisting the choice), or clear the
    /// current selection.
    pub fn select_race(&mut self, id: Option<&str>) -> Vec<EngineEvent> {
        self.selected_race = id.map(String::from);
        if let Some(id) = id {
            if let Err(e) = self.store.set_last_used(Some(id)) {
                log::error!("[Engine] failed to persist selection: {}", e);
            }
        }
        self.refresh_comparison();
        self.take_events()
    }

    // ========================================================================
    // Saving, deleting, reordering
    // ========================================================================

    /// Save the currently extracted route as a race. A blank name falls
    /// back to the page's route title.
    pub fn save_from_route(
        &mut self,
        name_input: &str,
        now_ms: i64,
    ) -> std::result::Result<SaveOutcome, SaveError> {
        let title = self.page.route_title();
        let candidate = RaceCandidate::from_route(&self.route, name_input, title.as_deref())
            .map_err(SaveError::Invalid)?;
        self.finish_propose(candidate, now_ms)
    }

    /// Save a manually entered race from raw field text.
    pub fn save_manual(
        &mut self,
        name: &str,
        distance: &str,
        gain: &str,
        loss: &str,
        now_ms: i64,
    ) -> std::result::Result<SaveOutcome, SaveError> {
        let candidate =
            RaceCandidate::manual(name, distance, gain, loss).map_err(SaveError::Invalid)?;
        self.finish_propose(candidate, now_ms)
    }

    fn finish_propose(
        &mut self,
        candidate: RaceCandidate,
        now_ms: i64,
    ) -> std::result::Result<SaveOutcome, SaveError> {
        let outcome = workflow::propose(&mut self.store, candidate, &mut self.ids, now_ms)?;
        if let SaveOutcome::Saved(race) = &outcome {
            let id = race.id.clone();
            self.after_save(id);
        }
        Ok(outcome)
    }

    /// Persist a duplicate-name save the user explicitly confirmed.
    pub fn confirm_save(
        &mut self,
        pending: PendingSave,
    ) -> std::result::Result<Race, SaveError> {
        let race = workflow::commit(&mut self.store, pending)?;
        self.after_save(race.id.clone());
        Ok(race)
    }

    fn after_save(&mut self, id: String) {
        self.pending.push(EngineEvent::RacesChanged);
        match self.store.capacity() {
            Ok(Capacity::Warning(count)) => self.pending.push(EngineEvent::Advisory(format!(
                "{}/{} races saved",
                count, MAX_RACES
            ))),
            Ok(_) => {}
            Err(e) => log::error!("[Engine] capacity check failed: {}", e),
        }

        // A freshly saved race becomes the comparison target
        self.selected_race = Some(id.clone());
        if let Err(e) = self.store.set_last_used(Some(&id)) {
            log::error!("[Engine] failed to persist selection: {}", e);
        }
        self.refresh_comparison();
    }

    /// Delete a race by id. Returns whether it existed.
    pub fn delete_race(&mut self, id: &str) -> Result<bool> {
        let deleted = self.store.delete(id)?;
        if deleted {
            if self.selected_race.as_deref() == Some(id) {
                self.selected_race = None;
            }
            self.pending.push(EngineEvent::RacesChanged);
            self.refresh_comparison();
        }
        Ok(deleted)
    }

    /// Move a race one step in display order; boundary moves are no-ops.
    pub fn move_race(&mut self, id: &str, direction: MoveDirection) -> Result<bool> {
        let moved = self.store.move_race(id, direction)?;
        if moved {
            self.pending.push(EngineEvent::RacesChanged);
        }
        Ok(moved)
    }

    /// All races in display order.
    pub fn races(&self) -> Result<Vec<Race>> {
        self.store.races()
    }

    // ========================================================================
    // Command channel
    // ========================================================================

    /// Handle a toolbar command.
    pub fn handle_command(&mut self, command: Command) -> CommandResponse {
        match command {
            Command::OpenPanel => {
                if !self.sidebar_open {
                    self.set_sidebar(true, false);
                }
                CommandResponse::PanelOpened
            }
            Command::CheckPage => CommandResponse::Page {
                is_route_builder: self.is_route_builder_page(),
            },
        }
    }

    fn is_route_builder_page(&self) -> bool {
        self.page.page_url().contains(ROUTE_BUILDER_PATH)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The most recently extracted route.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Id of the race currently selected for comparison.
    pub fn selected_race(&self) -> Option<&str> {
        self.selected_race.as_deref()
    }

    pub fn sidebar_open(&self) -> bool {
        self.sidebar_open
    }

    /// Whether the current route can be saved: complete data on a valid
    /// activity type.
    pub fn can_save_route(&self) -> bool {
        self.route.is_complete()
            && self
                .route
                .activity_label
                .as_deref()
                .is_some_and(is_valid_activity)
    }
}
