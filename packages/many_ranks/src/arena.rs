//! Stable-slot arenas with generation-checked keys.
//!
//! Instances, timer groups and timers all live in arenas. A slot, once
//! occupied, is never reused for a different entity; retiring a slot bumps
//! its generation so that stale keys miss instead of aliasing.

use std::sync::{Arc, Mutex};

use crate::ERR_POISONED_LOCK;
use crate::error::{Error, Result};

/// A key into an [`Arena`], valid until the slot it names is retired.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct SlotKey {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

/// An append-only arena of reference-counted slots.
///
/// Insertion order is creation order; callers that need deterministic
/// traversal (report emission, teardown) walk [`Arena::live()`].
#[derive(Debug)]
pub(crate) struct Arena<T> {
    slots: Mutex<Vec<Slot<T>>>,
}

impl<T> Arena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Adds a value, returning the key that addresses it.
    ///
    /// Callers serialize creation through the session's creation lock; the
    /// internal mutex only guards against concurrent lookups.
    pub(crate) fn insert(&self, value: T) -> SlotKey {
        let mut slots = self.slots.lock().expect(ERR_POISONED_LOCK);
        let index = slots.len();
        slots.push(Slot {
            generation: 1,
            value: Some(Arc::new(value)),
        });
        SlotKey {
            index,
            generation: 1,
        }
    }

    /// Resolves a key to its value, failing with the given error when the
    /// key is stale, retired or from another arena.
    pub(crate) fn get(&self, key: SlotKey, missing: Error) -> Result<Arc<T>> {
        let slots = self.slots.lock().expect(ERR_POISONED_LOCK);
        slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.clone())
            .ok_or(missing)
    }

    /// Empties a slot and invalidates every key that addressed it.
    ///
    /// The retired value is handed back so the caller can run teardown on it.
    pub(crate) fn retire(&self, key: SlotKey, missing: Error) -> Result<Arc<T>> {
        let mut slots = self.slots.lock().expect(ERR_POISONED_LOCK);
        let slot = slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)
            .ok_or(missing)?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.value.take().ok_or(missing)
    }

    /// Snapshot of the live slots in creation order.
    pub(crate) fn live(&self) -> Vec<(SlotKey, Arc<T>)> {
        let slots = self.slots.lock().expect(ERR_POISONED_LOCK);
        slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.value.as_ref().map(|value| {
                    (
                        SlotKey {
                            index,
                            generation: slot.generation,
                        },
                        Arc::clone(value),
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let arena = Arena::new();
        let key = arena.insert("hello");

        let value = arena.get(key, Error::UnknownTimer).unwrap();
        assert_eq!(*value, "hello");
    }

    #[test]
    fn retired_keys_miss() {
        let arena = Arena::new();
        let key = arena.insert(7_u32);

        let value = arena.retire(key, Error::UnknownTimer).unwrap();
        assert_eq!(*value, 7);

        assert_eq!(arena.get(key, Error::UnknownTimer), Err(Error::UnknownTimer));
        assert_eq!(
            arena.retire(key, Error::UnknownTimer),
            Err(Error::UnknownTimer)
        );
    }

    #[test]
    fn foreign_keys_miss() {
        let arena_a = Arena::new();
        let arena_b: Arena<u32> = Arena::new();
        let key = arena_a.insert(1_u32);

        assert_eq!(arena_b.get(key, Error::UnknownGroup), Err(Error::UnknownGroup));
    }

    #[test]
    fn live_preserves_creation_order() {
        let arena = Arena::new();
        let first = arena.insert("a");
        let second = arena.insert("b");
        let third = arena.insert("c");

        arena.retire(second, Error::UnknownTimer).unwrap();

        let live = arena.live();
        let names: Vec<&str> = live.iter().map(|(_, value)| **value).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(live.first().map(|(key, _)| *key), Some(first));
        assert_eq!(live.get(1).map(|(key, _)| *key), Some(third));
    }
}
