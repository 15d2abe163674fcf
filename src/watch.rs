//! Change detection for an asynchronously mutating host page.
//!
//! Two trigger sources feed one recompute action: mutation notifications,
//! debounced on the trailing edge, and a fixed-period poll. The poll is
//! deliberate redundancy, not a fallback of last resort: the host page's
//! DOM update patterns are not fully observable, so correctness relies on
//! eventual polling convergence rather than on push notifications alone.
//!
//! All deadlines are logical epoch-millisecond values compared against a
//! caller-supplied clock, so tests drive each trigger source
//! independently without waiting on wall time.

/// Kind of a host-page mutation notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Child list / subtree structure changed on an element
    Tree,
    /// Text content changed inside an element
    Text,
}

/// A single mutation notification from the host environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub kind: MutationKind,
    /// Class attribute of the mutated element
    pub class_name: String,
    /// Class attribute of the parent element, for text mutations
    pub parent_class: Option<String>,
}

impl Mutation {
    pub fn tree(class_name: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Tree,
            class_name: class_name.into(),
            parent_class: None,
        }
    }

    pub fn text(parent_class: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Text,
            class_name: String::new(),
            parent_class: Some(parent_class.into()),
        }
    }
}

/// Class-name substrings that mark a mutation as relevant. Only substrings
/// survive the host's build system, which appends hashed suffixes.
pub const RELEVANT_CLASS_HINTS: [&str; 3] = ["Stat", "RouteOverview", "Stats"];

/// Whether a mutation can affect the rendered route stats.
///
/// Element mutations are relevant when the element's class contains one of
/// [`RELEVANT_CLASS_HINTS`]; text mutations when the parent's class
/// contains "Stat". Everything else is dropped without scheduling work.
pub fn is_relevant(mutation: &Mutation) -> bool {
    match mutation.kind {
        MutationKind::Tree => RELEVANT_CLASS_HINTS
            .iter()
            .any(|hint| mutation.class_name.contains(hint)),
        MutationKind::Text => mutation
            .parent_class
            .as_deref()
            .is_some_and(|class| class.contains("Stat")),
    }
}

/// Timing configuration for the change-detection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    /// Trailing-edge debounce window for relevant mutations.
    /// Default: 250 ms
    pub debounce_ms: i64,

    /// Unconditional re-extraction period (backstop against missed or
    /// unrecognized mutations). Default: 2000 ms
    pub poll_ms: i64,

    /// Delay before the first extraction, allowing the host page's first
    /// paint to complete. Default: 1000 ms
    pub startup_delay_ms: i64,

    /// Retry period while the activity-type selector control does not
    /// exist yet. Default: 500 ms
    pub selector_retry_ms: i64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            poll_ms: 2000,
            startup_delay_ms: 1000,
            selector_retry_ms: 500,
        }
    }
}

/// Why a recomputation fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// One-shot startup extraction after the initial delay
    Startup,
    /// Debounced mutation burst settled
    Debounce,
    /// Fixed-period poll backstop
    Poll,
}

/// Scheduler that collapses mutation bursts and keeps the poll backstop.
///
/// The debounce is trailing-edge with last-event-wins scheduling: every
/// relevant mutation replaces any pending debounce deadline, so a burst of
/// N mutations inside the window yields exactly one trigger, 250 ms after
/// the last of them.
#[derive(Debug)]
pub struct ChangeDetector {
    config: WatchConfig,
    startup_at: Option<i64>,
    debounce_at: Option<i64>,
    poll_at: i64,
}

impl ChangeDetector {
    pub fn new(config: WatchConfig, now_ms: i64) -> Self {
        Self {
            config,
            startup_at: Some(now_ms + config.startup_delay_ms),
            debounce_at: None,
            poll_at: now_ms + config.poll_ms,
        }
    }

    /// Feed a mutation notification. Returns `true` when the mutation was
    /// relevant and a recomputation was (re)scheduled.
    pub fn observe(&mut self, mutation: &Mutation, now_ms: i64) -> bool {
        if !is_relevant(mutation) {
            return false;
        }
        self.debounce_at = Some(now_ms + self.config.debounce_ms);
        true
    }

    /// Drain all triggers due at `now_ms`. The poll trigger reschedules
    /// itself; startup fires at most once; a drained debounce clears its
    /// deadline.
    pub fn poll(&mut self, now_ms: i64) -> Vec<Trigger> {
        let mut fired = Vec::new();

        if self.startup_at.is_some_and(|at| now_ms >= at) {
            self.startup_at = None;
            fired.push(Trigger::Startup);
        }
        if self.debounce_at.is_some_and(|at| now_ms >= at) {
            self.debounce_at = None;
            fired.push(Trigger::Debounce);
        }
        if now_ms >= self.poll_at {
            // Skip missed periods instead of firing once per period
            while self.poll_at <= now_ms {
                self.poll_at += self.config.poll_ms;
            }
            fired.push(Trigger::Poll);
        }

        fired
    }

    /// Earliest pending deadline, for hosts that sleep precisely.
    pub fn next_deadline(&self) -> i64 {
        let mut deadline = self.poll_at;
        if let Some(at) = self.startup_at {
            deadline = deadline.min(at);
        }
        if let Some(at) = self.debounce_at {
            deadline = deadline.min(at);
        }
        deadline
    }
}

/// Whether an activity-type string enables the comparison feature.
pub fn is_valid_activity(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    normalized.contains("trail run") || normalized == "run"
}

/// Edge produced by an activity-type transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEdge {
    /// Transitioned into a valid activity type
    EnteredValid,
    /// Transitioned out of a valid activity type
    ExitedValid,
}

/// Edge-triggered watcher over the activity-type selector text.
///
/// Repeated observations of the same text produce nothing; only
/// transitions across the validity boundary produce an edge. The very
/// first observation of a valid type counts as entering.
#[derive(Debug, Default)]
pub struct ActivityWatcher {
    last: Option<String>,
}

impl ActivityWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current activity type as last observed, lowercased.
    pub fn current(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn observe(&mut self, text: &str) -> Option<ActivityEdge> {
        let normalized = text.trim().to_lowercase();
        if self.last.as_deref() == Some(normalized.as_str()) {
            return None;
        }

        let was_valid = self.last.as_deref().map_or(false, is_valid_activity);
        let is_valid = is_valid_activity(&normalized);
        self.last = Some(normalized);

        match (was_valid, is_valid) {
            (false, true) => Some(ActivityEdge::EnteredValid),
            (true, false) => Some(ActivityEdge::ExitedValid),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Mutation::tree("Stat_stat__a1b2c"), true)]
    #[case(Mutation::tree("RouteOverviewBottomBar_chart__x"), true)]
    #[case(Mutation::tree("Stats_listStats__99"), true)]
    #[case(Mutation::tree("mapboxgl-ctrl"), false)]
    #[case(Mutation::text("Stat_statValue__a1b2c"), true)]
    #[case(Mutation::text("Header_nav__x"), false)]
    fn test_relevance_predicate(#[case] mutation: Mutation, #[case] expected: bool) {
        assert_eq!(is_relevant(&mutation), expected);
    }

    #[test]
    fn test_text_mutation_without_parent_is_irrelevant() {
        let mutation = Mutation {
            kind: MutationKind::Text,
            class_name: "Stat_statValue__x".to_string(),
            parent_class: None,
        };
        assert!(!is_relevant(&mutation));
    }

    #[test]
    fn test_debounce_collapses_burst_to_single_trigger() {
        let mut detector = ChangeDetector::new(WatchConfig::default(), 0);
        // Drain the startup trigger out of the way
        detector.poll(1000);

        // Burst of relevant mutations inside one window
        detector.observe(&Mutation::tree("Stat_stat__a"), 1100);
        detector.observe(&Mutation::tree("Stat_stat__a"), 1200);
        detector.observe(&Mutation::tree("Stat_stat__a"), 1300);

        // Window is still open relative to the last mutation
        assert_eq!(detector.poll(1549), Vec::<Trigger>::new());
        // Fires exactly 250ms after the last mutation, once
        assert_eq!(detector.poll(1550), vec![Trigger::Debounce]);
        assert_eq!(detector.poll(1551), Vec::<Trigger>::new());
    }

    #[test]
    fn test_irrelevant_mutation_schedules_nothing() {
        let mut detector = ChangeDetector::new(WatchConfig::default(), 0);
        detector.poll(1000);

        assert!(!detector.observe(&Mutation::tree("mapboxgl-map"), 1100));
        assert_eq!(detector.poll(1400), Vec::<Trigger>::new());
    }

    #[test]
    fn test_startup_fires_once_after_delay() {
        let mut detector = ChangeDetector::new(WatchConfig::default(), 0);

        assert_eq!(detector.poll(999), Vec::<Trigger>::new());
        assert_eq!(detector.poll(1000), vec![Trigger::Startup]);
        assert_eq!(detector.poll(1001), Vec::<Trigger>::new());
    }

    #[test]
    fn test_poll_backstop_reschedules() {
        let mut detector = ChangeDetector::new(WatchConfig::default(), 0);
        detector.poll(1000); // startup

        assert_eq!(detector.poll(2000), vec![Trigger::Poll]);
        assert_eq!(detector.poll(3999), Vec::<Trigger>::new());
        assert_eq!(detector.poll(4000), vec![Trigger::Poll]);
    }

    #[test]
    fn test_missed_poll_periods_fire_once() {
        let mut detector = ChangeDetector::new(WatchConfig::default(), 0);
        detector.poll(1000);

        // Host was suspended across several periods
        assert_eq!(detector.poll(11_000), vec![Trigger::Poll]);
        assert_eq!(detector.poll(11_100), Vec::<Trigger>::new());
        assert_eq!(detector.poll(13_000), vec![Trigger::Poll]);
    }

    #[test]
    fn test_next_deadline_tracks_earliest() {
        let mut detector = ChangeDetector::new(WatchConfig::default(), 0);
        assert_eq!(detector.next_deadline(), 1000); // startup

        detector.poll(1000);
        assert_eq!(detector.next_deadline(), 2000); // poll

        detector.observe(&Mutation::tree("Stat_stat__a"), 1600);
        assert_eq!(detector.next_deadline(), 1850); // debounce
    }

    #[rstest]
    #[case("Trail Run", true)]
    #[case("run", true)]
    #[case("Run", true)]
    #[case("Ride", false)]
    #[case("Walk", false)]
    #[case("Mountain Bike Ride", false)]
    fn test_activity_validity(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(is_valid_activity(text), expected);
    }

    #[test]
    fn test_activity_watcher_edges() {
        let mut watcher = ActivityWatcher::new();

        // First observation of a valid type counts as entering
        assert_eq!(watcher.observe("Ride"), None);
        assert_eq!(watcher.observe("Trail Run"), Some(ActivityEdge::EnteredValid));
        // Same value again: no edge
        assert_eq!(watcher.observe("Trail Run"), None);
        // Valid -> valid: no edge
        assert_eq!(watcher.observe("Run"), None);
        assert_eq!(watcher.observe("Ride"), Some(ActivityEdge::ExitedValid));
        assert_eq!(watcher.observe("Walk"), None);
        assert_eq!(watcher.observe("run"), Some(ActivityEdge::EnteredValid));
    }

    #[test]
    fn test_activity_watcher_first_observation_valid() {
        let mut watcher = ActivityWatcher::new();
        assert_eq!(watcher.observe("Run"), Some(ActivityEdge::EnteredValid));
    }
}
