//! Timer groups: named collections of timers, ordered for report emission.

use std::sync::{Arc, Mutex};

use crate::ERR_POISONED_LOCK;
use crate::arena::SlotKey;
use crate::error::{Error, Result};
use crate::timer::TimerSlot;

/// Identifies a timer group within its [`Session`][crate::Session].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct GroupId(pub(crate) SlotKey);

/// One timer name within a group, with its per-context variants.
///
/// Variants are kept sorted ascending by context id; aggregation relies on
/// this order when it serializes the group.
#[derive(Debug)]
pub(crate) struct NameSlot {
    pub(crate) name: String,
    pub(crate) variants: Vec<Arc<TimerSlot>>,
}

/// A timer group as stored in the session's group arena.
///
/// Name slots appear in discovery order, which fixes the order in which the
/// group's timers are serialized and ultimately printed.
#[derive(Debug)]
pub(crate) struct GroupSlot {
    pub(crate) name: String,
    pub(crate) names: Mutex<Vec<NameSlot>>,
}

impl GroupSlot {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            names: Mutex::new(Vec::new()),
        }
    }

    /// Files a freshly created timer under its name slot.
    ///
    /// A name slot is created on first sight of the name; within a slot the
    /// variant list stays sorted by context id. Creating the same name twice
    /// for the same context is refused.
    pub(crate) fn add_timer(&self, timer: Arc<TimerSlot>) -> Result<()> {
        let mut names = self.names.lock().expect(ERR_POISONED_LOCK);

        if !names.iter().any(|slot| slot.name == timer.name) {
            names.push(NameSlot {
                name: timer.name.clone(),
                variants: Vec::new(),
            });
        }
        let slot = names
            .iter_mut()
            .find(|slot| slot.name == timer.name)
            .expect("slot exists or was pushed above");

        if slot
            .variants
            .iter()
            .any(|variant| variant.context == timer.context)
        {
            return Err(Error::CreateTimerFailed);
        }

        let position = slot
            .variants
            .iter()
            .position(|variant| variant.context > timer.context)
            .unwrap_or(slot.variants.len());
        slot.variants.insert(position, timer);

        Ok(())
    }

    /// Whether the given timer slot was filed in this group. Instance
    /// teardown uses this to find the timer arena entries it must retire.
    pub(crate) fn owns(&self, timer: &Arc<TimerSlot>) -> bool {
        let names = self.names.lock().expect(ERR_POISONED_LOCK);
        names
            .iter()
            .any(|slot| slot.variants.iter().any(|variant| Arc::ptr_eq(variant, timer)))
    }

    /// Snapshot of the name slots in discovery order, variants in context
    /// order, for serialization.
    pub(crate) fn timers(&self) -> Vec<(String, Vec<Arc<TimerSlot>>)> {
        let names = self.names.lock().expect(ERR_POISONED_LOCK);
        names
            .iter()
            .map(|slot| {
                (
                    slot.name.clone(),
                    slot.variants.iter().map(Arc::clone).collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::indexing_slicing, reason = "panic is fine in tests")]

    use super::*;
    use crate::timer_kind::TimerKind;

    fn timer(name: &str, context: u32) -> Arc<TimerSlot> {
        Arc::new(TimerSlot::new(name.to_string(), TimerKind::NONE, context))
    }

    #[test]
    fn variants_sort_by_context() {
        let group = GroupSlot::new("group".to_string());

        group.add_timer(timer("step", 2)).unwrap();
        group.add_timer(timer("step", 0)).unwrap();
        group.add_timer(timer("step", 1)).unwrap();

        let timers = group.timers();
        assert_eq!(timers.len(), 1);
        let contexts: Vec<u32> = timers[0].1.iter().map(|t| t.context).collect();
        assert_eq!(contexts, vec![0, 1, 2]);
    }

    #[test]
    fn duplicate_context_is_refused() {
        let group = GroupSlot::new("group".to_string());

        group.add_timer(timer("step", 0)).unwrap();
        let result = group.add_timer(timer("step", 0));

        assert_eq!(result, Err(Error::CreateTimerFailed));
    }

    #[test]
    fn owns_tracks_filed_slots_only() {
        let group = GroupSlot::new("group".to_string());
        let filed = timer("step", 0);
        let stranger = timer("step", 0);

        group.add_timer(Arc::clone(&filed)).unwrap();

        assert!(group.owns(&filed));
        assert!(!group.owns(&stranger));
    }

    #[test]
    fn same_name_different_context_shares_a_slot() {
        let group = GroupSlot::new("group".to_string());

        group.add_timer(timer("step", 0)).unwrap();
        group.add_timer(timer("other", 0)).unwrap();
        group.add_timer(timer("step", 1)).unwrap();

        let timers = group.timers();
        let names: Vec<&str> = timers.iter().map(|(name, _)| name.as_str()).collect();
        // Discovery order, not alphabetical.
        assert_eq!(names, vec!["step", "other"]);
        assert_eq!(timers[0].1.len(), 2);
        assert_eq!(timers[1].1.len(), 1);
    }
}
