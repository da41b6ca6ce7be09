/// Actor state registry — the last state each actor reported this frame.
use std::collections::BTreeMap;

/// State string an actor reports when it has nothing in progress.
pub const IDLE_STATE: &str = "nothing";

/// Newtype wrapper for actor state slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorSlot(pub usize);

/// Slot-indexed map from actor to its last reported state.
///
/// Owned by the host session and passed to actors (for writing) and to
/// the director (for reading). Actors report once per frame, as the last
/// step of their own update, so runs ticking afterwards see fresh values.
#[derive(Debug, Clone, Default)]
pub struct ActorStateRegistry {
    states: BTreeMap<ActorSlot, String>,
    next_slot: usize,
}

impl ActorStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot for a new actor. The actor starts out idle.
    pub fn allocate_slot(&mut self) -> ActorSlot {
        let mut slot = ActorSlot(self.next_slot);
        if self.states.contains_key(&slot) {
            // Only reachable once `next_slot` has saturated at the top index.
            slot = self.lowest_free_slot();
        }
        self.next_slot = self.next_slot.max(slot.0.saturating_add(1));
        self.states.insert(slot, IDLE_STATE.to_string());
        slot
    }

    /// Overwrite the state for `slot`.
    pub fn report(&mut self, slot: ActorSlot, state: impl Into<String>) {
        // Saturates at the top slot; allocation never wraps onto live slots.
        self.next_slot = self.next_slot.max(slot.0.saturating_add(1));
        self.states.insert(slot, state.into());
    }

    pub fn read(&self, slot: ActorSlot) -> Option<&str> {
        self.states.get(&slot).map(String::as_str)
    }

    pub fn is_idle(&self, slot: ActorSlot) -> bool {
        self.read(slot) == Some(IDLE_STATE)
    }

    /// True when no actor anywhere is mid-action.
    pub fn all_idle(&self) -> bool {
        self.states.values().all(|s| s == IDLE_STATE)
    }

    /// Drop an actor's entry, e.g. when its node is destroyed.
    pub fn release(&mut self, slot: ActorSlot) -> Option<String> {
        self.states.remove(&slot)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn lowest_free_slot(&self) -> ActorSlot {
        let mut candidate = 0;
        for slot in self.states.keys() {
            if slot.0 != candidate {
                break;
            }
            candidate += 1;
        }
        ActorSlot(candidate)
    }

    /// Entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ActorSlot, &str)> {
        self.states.iter().map(|(slot, state)| (*slot, state.as_str()))
    }
}
