//! The fixed-size instance slot table. Grounded in `effects.c`'s `InstanceContainer effects[]`
//! array and its `MAX_INSTANCES`/reserved-global-slot conventions.

use parking_lot::RwLock;

use crate::error::HostError;

/// Mirrors the original's `MAX_INSTANCES`.
pub const MAX_INSTANCES: usize = 10_000;

/// The reserved slot id used for the global (transport/CC-only) pseudo-instance, matching the
/// original's `EFFECT_ID_ALL`-adjacent `9995` convention for global assignments.
pub const GLOBAL_INSTANCE_ID: i32 = 9995;

/// Instance ids at or above this value are reserved for host-internal bookkeeping (currently just
/// [`GLOBAL_INSTANCE_ID`]) and are never handed out by `add()`.
pub const TOOLS_RESERVED_RANGE: i32 = 9990;

/// A generic fixed-size slot table keyed by small integer ids `0..MAX_INSTANCES`, used for plugin
/// instances. Slot reuse is allowed (unlike the tombstoned CC table) since a freed instance id is
/// immediately safe to reissue once its teardown has completed.
pub struct InstanceTable<T> {
    slots: RwLock<Vec<Option<T>>>,
}

impl<T> InstanceTable<T> {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_INSTANCES);
        slots.resize_with(MAX_INSTANCES, || None);
        Self {
            slots: RwLock::new(slots),
        }
    }

    /// Finds the lowest-numbered free slot below [`TOOLS_RESERVED_RANGE`] and installs `value`,
    /// matching the original's linear scan for a free `InstanceContainer`.
    pub fn insert(&self, value: T) -> Result<i32, HostError> {
        let mut slots = self.slots.write();
        let reserved = TOOLS_RESERVED_RANGE as usize;
        for (id, slot) in slots.iter_mut().enumerate().take(reserved) {
            if slot.is_none() {
                *slot = Some(value);
                return Ok(id as i32);
            }
        }
        Err(HostError::InstanceAlreadyExists)
    }

    /// Installs `value` at a specific id (used for the reserved global slot), failing if the id
    /// is out of range or already occupied.
    pub fn insert_at(&self, id: i32, value: T) -> Result<(), HostError> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(id as usize).ok_or(HostError::InstanceInvalid)?;
        if slot.is_some() {
            return Err(HostError::InstanceAlreadyExists);
        }
        *slot = Some(value);
        Ok(())
    }

    pub fn remove(&self, id: i32) -> Option<T> {
        let mut slots = self.slots.write();
        slots.get_mut(id as usize).and_then(|slot| slot.take())
    }

    /// Runs `f` against the slot at `id` while holding the table's write lock, returning `None` if
    /// the slot is out of range or empty. Used by the control surface for in-place mutation (e.g.
    /// writing a control port's buffer) without cloning the slot's contents.
    pub fn with_mut<R>(&self, id: i32, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(id as usize)?.as_mut()?;
        Some(f(slot))
    }

    pub fn contains(&self, id: i32) -> bool {
        self.slots
            .read()
            .get(id as usize)
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    /// All currently occupied ids, ascending. Used by `remove(ALL)` and by feedback broadcast.
    pub fn ids(&self) -> Vec<i32> {
        self.slots
            .read()
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.is_some().then_some(id as i32))
            .collect()
    }
}

impl<T> Default for InstanceTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> InstanceTable<T> {
    pub fn get_cloned(&self, id: i32) -> Option<T> {
        self.slots.read().get(id as usize).and_then(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_picks_lowest_free_id_and_remove_frees_it() {
        let table: InstanceTable<u32> = InstanceTable::new();
        let a = table.insert(10).unwrap();
        let b = table.insert(20).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);

        assert_eq!(table.remove(a), Some(10));
        let c = table.insert(30).unwrap();
        assert_eq!(c, 0);
    }

    #[test]
    fn reserved_range_is_excluded_from_automatic_insert() {
        let table: InstanceTable<u32> = InstanceTable::new();
        for _ in 0..TOOLS_RESERVED_RANGE {
            table.insert(0).unwrap();
        }
        assert!(table.insert(0).is_err());
    }

    #[test]
    fn insert_at_reserved_global_slot() {
        let table: InstanceTable<u32> = InstanceTable::new();
        table.insert_at(GLOBAL_INSTANCE_ID, 99).unwrap();
        assert!(table.contains(GLOBAL_INSTANCE_ID));
        assert!(table.insert_at(GLOBAL_INSTANCE_ID, 1).is_err());
    }
}
