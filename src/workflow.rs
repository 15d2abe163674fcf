//! Validated race creation: propose, confirm, commit.
//!
//! Saving is a two-phase workflow. `propose` validates a candidate and
//! either persists it directly or, on a case-insensitive name collision,
//! hands back a [`PendingSave`] for the user to confirm. Committing the
//! pending value persists it; dropping it aborts silently (the user
//! cancelled, which is not a failure). The engine never waits on user
//! interaction inside a storage operation.

use std::fmt;

use crate::store::{KeyValueStore, RaceStore};
use crate::{Race, RaceOrigin, Route, MAX_RACES};

/// Input field a validation error belongs to; receives focus on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveField {
    Name,
    Distance,
    Gain,
    Loss,
}

/// A user-input validation failure. First error wins, in the fixed order
/// name, distance, gain, loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: SaveField,
    pub message: String,
}

impl ValidationError {
    fn new(field: SaveField, message: &str) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Why a save was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveError {
    /// Candidate failed validation; the field tells the caller where to
    /// move input focus
    Invalid(ValidationError),
    /// The collection is at its fixed ceiling; nothing was written
    CapacityExceeded { limit: usize },
    /// The backing store reported a failure; the collection is unchanged
    Storage(String),
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveError::Invalid(e) => write!(f, "{}", e),
            SaveError::CapacityExceeded { limit } => {
                write!(f, "Maximum {} races allowed. Delete some first.", limit)
            }
            SaveError::Storage(message) => write!(f, "Failed to save. Try again. ({})", message),
        }
    }
}

impl std::error::Error for SaveError {}

impl From<crate::error::CompareError> for SaveError {
    fn from(err: crate::error::CompareError) -> Self {
        SaveError::Storage(err.to_string())
    }
}

/// A validated race candidate, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceCandidate {
    pub name: String,
    pub distance_km: f64,
    pub elevation_gain_m: f64,
    pub elevation_loss_m: f64,
    pub origin: RaceOrigin,
}

impl RaceCandidate {
    /// Build a candidate from the currently extracted route.
    ///
    /// A blank name falls back to the auto-discovered route title. The
    /// route must be complete with elevation gain present; a missing loss
    /// defaults to 0.
    pub fn from_route(
        route: &Route,
        name_input: &str,
        fallback_title: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let mut name = name_input.trim();
        if name.is_empty() {
            name = fallback_title.map(str::trim).unwrap_or("");
        }
        if name.is_empty() {
            return Err(ValidationError::new(
                SaveField::Name,
                "Please enter a race name",
            ));
        }

        let distance_km = match route.distance_km {
            Some(d) if route.is_complete() => d,
            _ => {
                return Err(ValidationError::new(
                    SaveField::Distance,
                    "Draw a route first",
                ))
            }
        };
        let elevation_gain_m = match route.elevation_gain_m {
            Some(g) => g,
            None => {
                return Err(ValidationError::new(
                    SaveField::Gain,
                    "Draw a route first",
                ))
            }
        };

        Ok(Self {
            name: name.to_string(),
            distance_km,
            elevation_gain_m,
            elevation_loss_m: route.elevation_loss_m.unwrap_or(0.0),
            origin: RaceOrigin::FromRoute,
        })
    }

    /// Build a candidate from manually entered field text.
    ///
    /// Distance must parse and be positive; gain must parse and be
    /// non-negative; loss, when given, must parse and be non-negative and
    /// defaults to 0 when blank.
    pub fn manual(
        name: &str,
        distance: &str,
        gain: &str,
        loss: &str,
    ) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::new(
                SaveField::Name,
                "Race name is required",
            ));
        }

        let distance_km = match parse_field(distance) {
            Some(d) if d > 0.0 => d,
            _ => {
                return Err(ValidationError::new(
                    SaveField::Distance,
                    "Enter a valid distance (> 0)",
                ))
            }
        };

        let elevation_gain_m = match parse_field(gain) {
            Some(g) if g >= 0.0 => g,
            _ => {
                return Err(ValidationError::new(
                    SaveField::Gain,
                    "Enter a valid elevation gain (>= 0)",
                ))
            }
        };

        let elevation_loss_m = if loss.trim().is_empty() {
            0.0
        } else {
            match parse_field(loss) {
                Some(l) if l >= 0.0 => l,
                _ => {
                    return Err(ValidationError::new(
                        SaveField::Loss,
                        "Enter a valid elevation loss (>= 0)",
                    ))
                }
            }
        };

        Ok(Self {
            name: name.to_string(),
            distance_km,
            elevation_gain_m,
            elevation_loss_m,
            origin: RaceOrigin::ManualEntry,
        })
    }

    /// Finalize into a persistable record. Distance is stored to one
    /// decimal place, elevations to whole meters.
    fn into_race(self, id: String, created_at: i64) -> Race {
        Race {
            id,
            name: self.name,
            distance_km: (self.distance_km * 10.0).round() / 10.0,
            elevation_gain_m: self.elevation_gain_m.round(),
            elevation_loss_m: self.elevation_loss_m.round(),
            created_at,
            origin: self.origin,
        }
    }
}

fn parse_field(text: &str) -> Option<f64> {
    let value: f64 = text.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// A race awaiting the user's duplicate-name confirmation. Commit it to
/// persist; drop it to abort.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSave {
    race: Race,
}

impl PendingSave {
    /// The race that would be saved, for the confirmation prompt.
    pub fn race(&self) -> &Race {
        &self.race
    }
}

/// Result of a successful `propose`.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// No collision; the race was persisted
    Saved(Race),
    /// A race with this name already exists; persisting needs the user's
    /// explicit confirmation
    NeedsConfirmation(PendingSave),
}

/// Generates race ids from timestamps, strictly monotonic within a
/// session even when saves land on the same millisecond.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last_ms: i64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, now_ms: i64) -> String {
        let stamp = now_ms.max(self.last_ms + 1);
        self.last_ms = stamp;
        stamp.to_string()
    }
}

/// Validate and stage a candidate for persistence.
///
/// Enforces the collection ceiling before insertion and surfaces
/// case-insensitive name collisions as a confirmation step instead of
/// writing through them.
pub fn propose<S: KeyValueStore>(
    store: &mut RaceStore<S>,
    candidate: RaceCandidate,
    ids: &mut IdGenerator,
    now_ms: i64,
) -> Result<SaveOutcome, SaveError> {
    let count = store.count()?;
    if count >= MAX_RACES {
        return Err(SaveError::CapacityExceeded { limit: MAX_RACES });
    }

    let duplicate = store.has_name(&candidate.name)?;
    let race = candidate.into_race(ids.next(now_ms), now_ms);

    if duplicate {
        log::info!(
            "[Workflow] duplicate race name '{}', awaiting confirmation",
            race.name
        );
        return Ok(SaveOutcome::NeedsConfirmation(PendingSave { race }));
    }

    store.add(race.clone())?;
    log::info!("[Workflow] race saved: {}", race.name);
    Ok(SaveOutcome::Saved(race))
}

/// Persist a confirmed duplicate. The ceiling is re-checked because the
/// collection may have grown between propose and commit.
pub fn commit<S: KeyValueStore>(
    store: &mut RaceStore<S>,
    pending: PendingSave,
) -> Result<Race, SaveError> {
    if store.count()? >= MAX_RACES {
        return Err(SaveError::CapacityExceeded { limit: MAX_RACES });
    }

    store.add(pending.race.clone())?;
    log::info!("[Workflow] race saved after confirmation: {}", pending.race.name);
    Ok(pending.race)
}
