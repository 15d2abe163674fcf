//! Typed access to the persisted race collection and UI preferences.
//!
//! Persistence is an external collaborator reached through the
//! [`KeyValueStore`] trait: whole-value JSON reads and writes under a
//! handful of logical keys. [`RaceStore`] layers the domain operations on
//! top (sorted listing, delete with pruning, reorder, selection state).
//!
//! The trait is synchronous on purpose: the engine is single-threaded,
//! so every storage operation completes before the next dependent read,
//! which rules out the stale-completion interleavings a callback-based
//! store would allow.

pub mod memory;
#[cfg(feature = "persistence")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "persistence")]
pub use sqlite::SqliteStore;

use serde_json::Value;

use crate::error::{CompareError, Result};
use crate::{Race, MAX_RACES, RACE_WARNING_THRESHOLD};

/// Logical storage keys.
pub const RACES_KEY: &str = "races";
pub const RACE_ORDER_KEY: &str = "race_order";
pub const LAST_USED_RACE_KEY: &str = "last_used_race_id";
pub const SIDEBAR_CLOSED_KEY: &str = "sidebar_closed";
pub const SIDEBAR_MANUAL_CLOSE_KEY: &str = "sidebar_manual_close";

/// Minimal key-value persistence contract.
///
/// Values are whole JSON documents replaced atomically per key; there are
/// no partial updates, so a failed write leaves the previous value intact.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// How close the race collection is to its fixed ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Available,
    /// At or past the advisory threshold; holds the current count
    Warning(usize),
    Full,
}

impl Capacity {
    pub fn of(count: usize) -> Self {
        if count >= MAX_RACES {
            Capacity::Full
        } else if count >= RACE_WARNING_THRESHOLD {
            Capacity::Warning(count)
        } else {
            Capacity::Available
        }
    }
}

/// Direction for a single-step reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Typed adapter over a [`KeyValueStore`] for the race collection and the
/// session's UI preferences.
#[derive(Debug)]
pub struct RaceStore<S: KeyValueStore> {
    inner: S,
}

impl<S: KeyValueStore> RaceStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    // ========================================================================
    // Race collection
    // ========================================================================

    fn read_races(&self) -> Result<Vec<Race>> {
        decode_or_default(self.inner.get(RACES_KEY)?, RACES_KEY)
    }

    fn write_races(&mut self, races: &[Race]) -> Result<()> {
        let value = serde_json::to_value(races).map_err(|e| CompareError::Internal {
            message: format!("race collection encode: {}", e),
        })?;
        self.inner.set(RACES_KEY, value)
    }

    fn read_order(&self) -> Result<Vec<String>> {
        decode_or_default(self.inner.get(RACE_ORDER_KEY)?, RACE_ORDER_KEY)
    }

    fn write_order(&mut self, order: &[String]) -> Result<()> {
        let value = serde_json::to_value(order).map_err(|e| CompareError::Internal {
            message: format!("race order encode: {}", e),
        })?;
        self.inner.set(RACE_ORDER_KEY, value)
    }

    /// All races in display order: the user's order preference first, then
    /// any races it does not mention, sorted case-insensitively by name.
    pub fn races(&self) -> Result<Vec<Race>> {
        let mut races = self.read_races()?;
        let order = self.read_order()?;

        races.sort_by(|a, b| {
            let a_index = order.iter().position(|id| id == &a.id);
            let b_index = order.iter().position(|id| id == &b.id);
            match (a_index, b_index) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            }
        });

        Ok(races)
    }

    /// Look up a race by id.
    pub fn race(&self, id: &str) -> Result<Option<Race>> {
        Ok(self.read_races()?.into_iter().find(|r| r.id == id))
    }

    /// Number of stored races.
    pub fn count(&self) -> Result<usize> {
        Ok(self.read_races()?.len())
    }

    /// Capacity state of the collection.
    pub fn capacity(&self) -> Result<Capacity> {
        Ok(Capacity::of(self.count()?))
    }

    /// Whether any stored race has the given name, case-insensitively.
    pub fn has_name(&self, name: &str) -> Result<bool> {
        let needle = name.to_lowercase();
        Ok(self
            .read_races()?
            .iter()
            .any(|r| r.name.to_lowercase() == needle))
    }

    /// Append a race to the collection (whole-collection replace).
    ///
    /// The capacity ceiling is enforced by the save workflow, not here.
    pub fn add(&mut self, race: Race) -> Result<()> {
        let mut races = self.read_races()?;
        races.push(race);
        self.write_races(&races)
    }

    /// Delete a race by id, pruning it from the order preference and
    /// clearing the last-used pointer if it pointed at the deleted race.
    /// Returns whether the race existed.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let mut races = self.read_races()?;
        let before = races.len();
        races.retain(|r| r.id != id);
        if races.len() == before {
            return Ok(false);
        }
        self.write_races(&races)?;

        let mut order = self.read_order()?;
        if order.iter().any(|o| o == id) {
            order.retain(|o| o != id);
            self.write_order(&order)?;
        }

        if self.last_used()?.as_deref() == Some(id) {
            self.set_last_used(None)?;
        }

        Ok(true)
    }

    /// Move a race one step up or down in display order. Moving the first
    /// race up or the last race down is a no-op; returns whether the order
    /// changed.
    pub fn move_race(&mut self, id: &str, direction: MoveDirection) -> Result<bool> {
        let sorted = self.races()?;
        let index = match sorted.iter().position(|r| r.id == id) {
            Some(i) => i,
            None => return Ok(false),
        };
        let target = match direction {
            MoveDirection::Up => {
                if index == 0 {
                    return Ok(false);
                }
                index - 1
            }
            MoveDirection::Down => {
                if index + 1 >= sorted.len() {
                    return Ok(false);
                }
                index + 1
            }
        };

        // Materialize the full display order so races the preference did
        // not yet mention keep their position.
        let mut order: Vec<String> = sorted.into_iter().map(|r| r.id).collect();
        order.swap(index, target);
        self.write_order(&order)?;
        Ok(true)
    }

    // ========================================================================
    // Selection and sidebar preferences
    // ========================================================================

    /// Id of the race last used for comparison, if it is still set.
    pub fn last_used(&self) -> Result<Option<String>> {
        match self.inner.get(LAST_USED_RACE_KEY)? {
            Some(Value::String(id)) => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    pub fn set_last_used(&mut self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => self
                .inner
                .set(LAST_USED_RACE_KEY, Value::String(id.to_string())),
            None => self.inner.remove(LAST_USED_RACE_KEY),
        }
    }

    /// Last explicit sidebar open/closed state. Defaults to open (false).
    pub fn sidebar_closed(&self) -> Result<bool> {
        read_flag(&self.inner, SIDEBAR_CLOSED_KEY)
    }

    /// Whether the user explicitly closed the sidebar this session.
    pub fn sidebar_manual_close(&self) -> Result<bool> {
        read_flag(&self.inner, SIDEBAR_MANUAL_CLOSE_KEY)
    }

    /// Persist both sidebar flags together, as every open/close path
    /// updates both.
    pub fn set_sidebar_state(&mut self, closed: bool, manual_close: bool) -> Result<()> {
        self.inner.set(SIDEBAR_CLOSED_KEY, Value::Bool(closed))?;
        self.inner
            .set(SIDEBAR_MANUAL_CLOSE_KEY, Value::Bool(manual_close))
    }
}

fn read_flag(store: &impl KeyValueStore, key: &str) -> Result<bool> {
    match store.get(key)? {
        Some(Value::Bool(b)) => Ok(b),
        _ => Ok(false),
    }
}

fn decode_or_default<T: serde::de::DeserializeOwned + Default>(
    value: Option<Value>,
    key: &str,
) -> Result<T> {
    match value {
        None => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| CompareError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RaceOrigin;

    fn race(id: &str, name: &str) -> Race {
        Race {
            id: id.to_string(),
            name: name.to_string(),
            distance_km: 42.2,
            elevation_gain_m: 500.0,
            elevation_loss_m: 500.0,
            created_at: 0,
            origin: RaceOrigin::ManualEntry,
        }
    }

    fn store_with(races: &[Race]) -> RaceStore<MemoryStore> {
        let mut store = RaceStore::new(MemoryStore::new());
        for r in races {
            store.add(r.clone()).unwrap();
        }
        store
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        let store = RaceStore::new(MemoryStore::new());
        assert_eq!(store.races().unwrap(), Vec::new());
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.capacity().unwrap(), Capacity::Available);
    }

    #[test]
    fn test_add_and_round_trip() {
        let store = store_with(&[race("1", "Mozart 100")]);
        let races = store.races().unwrap();
        assert_eq!(races.len(), 1);
        assert_eq!(races[0].name, "Mozart 100");
        assert_eq!(store.race("1").unwrap().unwrap().id, "1");
        assert_eq!(store.race("missing").unwrap(), None);
    }

    #[test]
    fn test_listing_sorts_by_name_without_order_preference() {
        let store = store_with(&[race("1", "Zermatt"), race("2", "aarhus"), race("3", "Berlin")]);
        let names: Vec<String> = store.races().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["aarhus", "Berlin", "Zermatt"]);
    }

    #[test]
    fn test_order_preference_wins_and_unknown_ids_append() {
        let mut store = store_with(&[race("1", "Alpha"), race("2", "Beta"), race("3", "Gamma")]);
        // Only two ids in the preference; "1" (Alpha) is unmentioned
        store.write_order(&["3".to_string(), "2".to_string()]).unwrap();

        let ids: Vec<String> = store.races().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }

    #[test]
    fn test_delete_prunes_order_and_selection() {
        let mut store = store_with(&[race("1", "Alpha"), race("2", "Beta")]);
        store.write_order(&["2".to_string(), "1".to_string()]).unwrap();
        store.set_last_used(Some("2")).unwrap();

        assert!(store.delete("2").unwrap());

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.read_order().unwrap(), vec!["1".to_string()]);
        assert_eq!(store.last_used().unwrap(), None);
    }

    #[test]
    fn test_delete_keeps_unrelated_selection() {
        let mut store = store_with(&[race("1", "Alpha"), race("2", "Beta")]);
        store.set_last_used(Some("1")).unwrap();

        assert!(store.delete("2").unwrap());
        assert_eq!(store.last_used().unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut store = store_with(&[race("1", "Alpha")]);
        assert!(!store.delete("99").unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_move_race_swaps_neighbors() {
        let mut store = store_with(&[race("1", "Alpha"), race("2", "Beta"), race("3", "Gamma")]);

        assert!(store.move_race("3", MoveDirection::Up).unwrap());
        let ids: Vec<String> = store.races().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "3", "2"]);

        assert!(store.move_race("1", MoveDirection::Down).unwrap());
        let ids: Vec<String> = store.races().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_move_clamps_at_boundaries() {
        let mut store = store_with(&[race("1", "Alpha"), race("2", "Beta")]);

        assert!(!store.move_race("1", MoveDirection::Up).unwrap());
        assert!(!store.move_race("2", MoveDirection::Down).unwrap());
        assert!(!store.move_race("missing", MoveDirection::Up).unwrap());

        let ids: Vec<String> = store.races().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_capacity_thresholds() {
        assert_eq!(Capacity::of(0), Capacity::Available);
        assert_eq!(Capacity::of(44), Capacity::Available);
        assert_eq!(Capacity::of(45), Capacity::Warning(45));
        assert_eq!(Capacity::of(49), Capacity::Warning(49));
        assert_eq!(Capacity::of(50), Capacity::Full);
        assert_eq!(Capacity::of(51), Capacity::Full);
    }

    #[test]
    fn test_sidebar_flags_default_and_round_trip() {
        let mut store = RaceStore::new(MemoryStore::new());
        assert!(!store.sidebar_closed().unwrap());
        assert!(!store.sidebar_manual_close().unwrap());

        store.set_sidebar_state(true, true).unwrap();
        assert!(store.sidebar_closed().unwrap());
        assert!(store.sidebar_manual_close().unwrap());

        store.set_sidebar_state(false, false).unwrap();
        assert!(!store.sidebar_closed().unwrap());
    }

    #[test]
    fn test_has_name_is_case_insensitive() {
        let store = store_with(&[race("1", "Mozart 100")]);
        assert!(store.has_name("mozart 100").unwrap());
        assert!(store.has_name("MOZART 100").unwrap());
        assert!(!store.has_name("Mozart 101").unwrap());
    }

    #[test]
    fn test_corrupt_collection_reported() {
        let mut inner = MemoryStore::new();
        inner
            .set(RACES_KEY, serde_json::json!({"not": "an array"}))
            .unwrap();
        let store = RaceStore::new(inner);

        assert!(matches!(
            store.races(),
            Err(CompareError::Corrupt { .. })
        ));
    }
}
