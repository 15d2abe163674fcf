//! # Route Compare
//!
//! Derived route metrics and race comparison for a client-rendered route
//! builder page.
//!
//! This library provides:
//! - Resilient extraction of route stats from semi-structured, unit-ambiguous page text
//! - Elevation projection against saved reference races with deviation bands
//! - A debounced change-detection loop with a polling backstop
//!
//! The host page, the persistence backend, and the presentation layer are
//! external collaborators: pages are read through [`extract::PageSource`],
//! state is kept behind [`store::KeyValueStore`], and the engine reports
//! changes as [`engine::EngineEvent`]s instead of touching any display.
//!
//! ## Features
//!
//! - **`persistence`** - SQLite-backed key-value store
//!
//! ## Quick Start
//!
//! ```rust
//! use route_compare::{project, DeviationBand, Race, RaceOrigin, Route};
//!
//! // A 50 km route with 1000 m of climbing, compared against a 100 km race
//! let route = Route {
//!     distance_km: Some(50.0),
//!     elevation_gain_m: Some(1000.0),
//!     ..Route::default()
//! };
//! let race = Race {
//!     id: "1".to_string(),
//!     name: "Mozart 100".to_string(),
//!     distance_km: 100.0,
//!     elevation_gain_m: 1700.0,
//!     elevation_loss_m: 1700.0,
//!     created_at: 0,
//!     origin: RaceOrigin::ManualEntry,
//! };
//!
//! let projection = project(&route, &race).unwrap();
//! assert_eq!(projection.gain.projected_m, 2000.0);
//! assert_eq!(projection.gain.band, DeviationBand::Caution);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{CompareError, Result};

// Measurement parsing (km/mi/m/ft normalization)
pub mod units;
pub use units::{parse_measurement, MeasureOptions};

// Route stat extraction behind the page adapter
pub mod extract;
pub use extract::{extract_route, PageSource, StatItem};

// Projection, deviation bands, render cache
pub mod projection;
pub use projection::{project, DeviationBand, Metric, Projection, ProjectedMetric, RenderCache};

// Change detection (debounce + poll) and the activity watcher
pub mod watch;
pub use watch::{
    is_relevant, is_valid_activity, ActivityEdge, ActivityWatcher, ChangeDetector, Mutation,
    MutationKind, Trigger, WatchConfig,
};

// Key-value persistence and the typed race adapter
pub mod store;
pub use store::{Capacity, KeyValueStore, MemoryStore, MoveDirection, RaceStore};
#[cfg(feature = "persistence")]
pub use store::SqliteStore;

// Validated two-phase race saving
pub mod workflow;
pub use workflow::{
    IdGenerator, PendingSave, RaceCandidate, SaveError, SaveField, SaveOutcome, ValidationError,
};

// Stateful session engine and command channel
pub mod engine;
pub use engine::{Command, CommandResponse, CompareEngine, EngineEvent};

// ============================================================================
// Core Types
// ============================================================================

/// Maximum number of races the collection may hold.
pub const MAX_RACES: usize = 50;

/// Collection size at which a user-visible advisory is shown. Does not
/// block writes.
pub const RACE_WARNING_THRESHOLD: usize = 45;

/// Metrics of the currently drawn route, as last extracted from the host
/// page.
///
/// A route is replaced wholesale on every extraction pass; fields the page
/// no longer renders come back as `None` rather than lingering from a
/// previous pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    /// Distance in kilometers
    pub distance_km: Option<f64>,
    /// Total elevation gain in meters
    pub elevation_gain_m: Option<f64>,
    /// Total elevation loss in meters
    pub elevation_loss_m: Option<f64>,
    /// Raw activity-type label text from the host page
    pub activity_label: Option<String>,
}

impl Route {
    /// A route is complete, and eligible for comparison and saving, once
    /// it has a positive distance.
    pub fn is_complete(&self) -> bool {
        matches!(self.distance_km, Some(d) if d > 0.0)
    }

    /// Elevation gain density in meters per kilometer, rounded for
    /// display. `None` while the route is incomplete or has no gain.
    pub fn gain_per_km(&self) -> Option<f64> {
        if !self.is_complete() {
            return None;
        }
        let distance = self.distance_km?;
        let gain = self.elevation_gain_m?;
        Some((gain / distance).round())
    }
}

/// Where a saved race's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceOrigin {
    /// Captured from a drawn route
    FromRoute,
    /// Entered by hand
    ManualEntry,
}

/// A persisted reference race used as a comparison target.
///
/// Races are never edited in place; replacing one means deleting it and
/// saving a new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    /// Opaque stable id, derived from a monotonic timestamp
    pub id: String,
    /// Display name, soft-unique case-insensitively
    pub name: String,
    /// Distance in kilometers, stored to one decimal place
    pub distance_km: f64,
    /// Elevation gain in meters, stored whole
    pub elevation_gain_m: f64,
    /// Elevation loss in meters, stored whole
    pub elevation_loss_m: f64,
    /// Creation time, epoch milliseconds
    pub created_at: i64,
    pub origin: RaceOrigin,
}

impl Race {
    /// One-line stats summary: `44.3 km | +1665 m | -1649 m`.
    pub fn summary(&self) -> String {
        format!(
            "{:.1} km | +{} m | -{} m",
            self.distance_km,
            self.elevation_gain_m.round() as i64,
            self.elevation_loss_m.round() as i64
        )
    }

    /// Gain density of the race itself, rounded for display.
    pub fn gain_per_km(&self) -> Option<f64> {
        if self.distance_km <= 0.0 {
            return None;
        }
        Some((self.elevation_gain_m / self.distance_km).round())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_completeness() {
        assert!(!Route::default().is_complete());

        let zero = Route {
            distance_km: Some(0.0),
            ..Route::default()
        };
        assert!(!zero.is_complete());

        let complete = Route {
            distance_km: Some(0.1),
            ..Route::default()
        };
        assert!(complete.is_complete());
    }

    #[test]
    fn test_route_gain_per_km() {
        let route = Route {
            distance_km: Some(44.3),
            elevation_gain_m: Some(1665.0),
            ..Route::default()
        };
        assert_eq!(route.gain_per_km(), Some(38.0));

        let no_gain = Route {
            distance_km: Some(44.3),
            ..Route::default()
        };
        assert_eq!(no_gain.gain_per_km(), None);
        assert_eq!(Route::default().gain_per_km(), None);
    }

    #[test]
    fn test_race_summary_format() {
        let race = Race {
            id: "1".to_string(),
            name: "Mozart 100".to_string(),
            distance_km: 44.3,
            elevation_gain_m: 1665.0,
            elevation_loss_m: 1649.0,
            created_at: 0,
            origin: RaceOrigin::FromRoute,
        };
        assert_eq!(race.summary(), "44.3 km | +1665 m | -1649 m");
        assert_eq!(race.gain_per_km(), Some(38.0));
    }

    #[test]
    fn test_race_serde_round_trip() {
        let race = Race {
            id: "1700000000000".to_string(),
            name: "UTMB".to_string(),
            distance_km: 170.7,
            elevation_gain_m: 10040.0,
            elevation_loss_m: 10040.0,
            created_at: 1_700_000_000_000,
            origin: RaceOrigin::ManualEntry,
        };

        let json = serde_json::to_value(&race).unwrap();
        let back: Race = serde_json::from_value(json).unwrap();
        assert_eq!(back, race);
    }
}
