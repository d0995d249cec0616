//! Generation-checked handle table.
//!
//! Objects crossing the API boundary are referenced by small integers
//! instead of pointers. Each slot carries a generation counter that is bumped
//! when the slot is freed, so a stale handle never resolves to whatever
//! object later reuses the slot.

use std::fmt;

/// Number of bits holding the slot index.
const INDEX_BITS: u32 = 20;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Generation bits sit above the index, keeping every handle a
/// non-negative `i32`.
const GENERATION_BITS: u32 = 11;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;

/// Maximum number of live objects in one table.
pub const MAX_HANDLES: usize = 1 << INDEX_BITS;

/// Opaque reference to a soundfont or stream owned by an [`crate::Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    fn new(index: usize, generation: u32) -> Self {
        Self(((generation & GENERATION_MASK) << INDEX_BITS) | (index as u32 & INDEX_MASK))
    }

    /// Reconstructs a handle from its raw integer value.
    ///
    /// Any value is accepted; unknown values simply fail to resolve.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw integer value (always fits in a non-negative `i32`).
    pub fn as_raw(&self) -> u32 {
        self.0
    }

    fn index(&self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }

    fn generation(&self) -> u32 {
        (self.0 >> INDEX_BITS) & GENERATION_MASK
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena of objects addressed by [`Handle`]s.
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Stores a value and returns its handle.
    ///
    /// Returns `None` when every slot is occupied.
    pub fn insert(&mut self, value: T) -> Option<Handle> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.value = Some(value);
            return Some(Handle::new(index, slot.generation));
        }

        let index = self.slots.len();
        if index >= MAX_HANDLES {
            return None;
        }
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        Some(Handle::new(index, 1))
    }

    fn slot(&self, handle: Handle) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
    }

    /// Resolves a handle to a shared reference.
    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slot(handle).and_then(|slot| slot.value.as_ref())
    }

    /// Resolves a handle to a mutable reference.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    /// Removes the value, invalidating the handle immediately.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let index = handle.index();
        let slot = self
            .slots
            .get_mut(index)
            .filter(|slot| slot.generation == handle.generation())?;
        let value = slot.value.take()?;

        // Generation 0 is skipped so a zero raw value is never handed out.
        slot.generation = (slot.generation + 1) & GENERATION_MASK;
        if slot.generation == 0 {
            slot.generation = 1;
        }
        self.free.push(index);
        Some(value)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns true if no objects are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
