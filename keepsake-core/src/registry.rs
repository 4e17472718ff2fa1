/*!
Registry of live participants, partitioned by slot.
*/

use crate::participant::Participant;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

type SlotPartition = IndexMap<String, Participant>;

/// Live participants keyed by `(slot, id)`
///
/// Within a slot, participants keep their registration order. The lock is held only
/// for the duration of a single mutation or snapshot.
#[derive(Default)]
pub struct ParticipantRegistry {
    slots: Mutex<HashMap<String, SlotPartition>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SlotPartition>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a participant, returning the one it replaced
    pub fn register(&self, participant: Participant) -> Option<Participant> {
        let slot = participant.slot().to_string();
        let id = participant.id().to_string();
        let replaced = self
            .lock()
            .entry(slot.clone())
            .or_default()
            .insert(id.clone(), participant);
        debug!(slot = %slot, id = %id, replaced = replaced.is_some(), "participant registered");
        replaced
    }

    /// Remove a participant; returns false if it was not registered
    pub fn unregister(&self, slot: &str, id: &str) -> bool {
        let mut slots = self.lock();
        let Some(partition) = slots.get_mut(slot) else {
            return false;
        };
        let removed = partition.shift_remove(id).is_some();
        if partition.is_empty() {
            slots.remove(slot);
        }
        if removed {
            debug!(slot, id, "participant unregistered");
        }
        removed
    }

    /// Snapshot of the participants currently registered for `slot`
    pub fn participants_for(&self, slot: &str) -> Vec<Participant> {
        self.lock()
            .get(slot)
            .map(|partition| partition.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, slot: &str, id: &str) -> bool {
        self.lock()
            .get(slot)
            .is_some_and(|partition| partition.contains_key(id))
    }

    /// Slot names with at least one participant, sorted
    pub fn slots(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Total number of registered participants
    pub fn len(&self) -> usize {
        self.lock().values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureError, Saveable};
    use std::sync::Arc;

    struct Flag {
        id: String,
        slot: String,
        value: bool,
    }

    impl Saveable for Flag {
        type State = bool;
        const TYPE_TAG: &'static str = "flag";

        fn id(&self) -> &str {
            &self.id
        }

        fn slot(&self) -> &str {
            &self.slot
        }

        fn capture(&self) -> Result<bool, CaptureError> {
            Ok(self.value)
        }

        fn restore(&self, _state: bool) {}
    }

    fn flag(id: &str, slot: &str, value: bool) -> Participant {
        Participant::new(Arc::new(Flag {
            id: id.into(),
            slot: slot.into(),
            value,
        }))
        .unwrap()
    }

    fn ids(participants: &[Participant]) -> Vec<&str> {
        participants.iter().map(Participant::id).collect()
    }

    #[test]
    fn test_register_partitions_by_slot() {
        let registry = ParticipantRegistry::new();
        registry.register(flag("a", "one.dat", true));
        registry.register(flag("b", "two.dat", true));
        registry.register(flag("c", "one.dat", false));

        assert_eq!(ids(&registry.participants_for("one.dat")), vec!["a", "c"]);
        assert_eq!(ids(&registry.participants_for("two.dat")), vec!["b"]);
        assert!(registry.participants_for("three.dat").is_empty());
        assert_eq!(registry.slots(), vec!["one.dat", "two.dat"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_reregistration_replaces_in_place() {
        let registry = ParticipantRegistry::new();
        registry.register(flag("a", "one.dat", true));
        registry.register(flag("b", "one.dat", true));
        let replaced = registry.register(flag("a", "one.dat", false));

        assert!(replaced.is_some());
        assert_eq!(registry.len(), 2);
        let participants = registry.participants_for("one.dat");
        assert_eq!(ids(&participants), vec!["a", "b"]);
        assert_eq!(participants[0].capture().unwrap().value, serde_json::json!(false));
    }

    #[test]
    fn test_same_id_in_different_slots_is_distinct() {
        let registry = ParticipantRegistry::new();
        registry.register(flag("a", "one.dat", true));
        registry.register(flag("a", "two.dat", true));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("one.dat", "a"));
        assert!(registry.contains("two.dat", "a"));
    }

    #[test]
    fn test_unregister() {
        let registry = ParticipantRegistry::new();
        registry.register(flag("a", "one.dat", true));
        registry.register(flag("b", "one.dat", true));

        assert!(registry.unregister("one.dat", "a"));
        assert!(!registry.unregister("one.dat", "a"));
        assert!(!registry.unregister("missing.dat", "a"));
        assert_eq!(ids(&registry.participants_for("one.dat")), vec!["b"]);

        assert!(registry.unregister("one.dat", "b"));
        assert!(registry.is_empty());
        assert!(registry.slots().is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_from_later_mutation() {
        let registry = ParticipantRegistry::new();
        registry.register(flag("a", "one.dat", true));
        let snapshot = registry.participants_for("one.dat");
        registry.unregister("one.dat", "a");
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(ParticipantRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        registry.register(flag(&format!("{t}-{i}"), "shared.dat", true));
                        let _ = registry.participants_for("shared.dat");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 400);
    }
}
