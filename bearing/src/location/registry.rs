//! Generation-checked request slots.
//!
//! Backends keep their in-flight requests in a [`SlotArena`]. Each insert
//! hands out a [`RequestId`] made of a slot index and the slot's generation.
//! Removing an entry bumps the generation, so an id that outlives its request
//! can never resolve to a later request that reuses the same slot.
//!
//! ```text
//! insert(a) → req-0.0      remove(req-0.0) → Some(a)
//! insert(b) → req-0.1      get(req-0.0)    → None (stale)
//! ```

use std::fmt;

/// Opaque identifier for one live backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId {
    index: u32,
    generation: u32,
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}.{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena of request entries addressed by [`RequestId`].
#[derive(Debug)]
pub struct SlotArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotArena<T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store a value and return its id.
    pub fn insert(&mut self, value: T) -> RequestId {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return RequestId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        RequestId {
            index,
            generation: 0,
        }
    }

    /// Allocate an id that is released immediately.
    ///
    /// Used for requests answered on the spot (cache hits, early failures):
    /// the caller still gets a well-formed id, and cancelling it is a no-op.
    pub fn reserve_released(&mut self) -> RequestId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        let id = RequestId {
            index,
            generation: slot.generation,
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        id
    }

    /// Look up a live entry.
    pub fn get(&self, id: RequestId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Look up a live entry mutably.
    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Whether `id` refers to a live entry.
    pub fn contains(&self, id: RequestId) -> bool {
        self.get(id).is_some()
    }

    /// Remove and return a live entry. Stale or unknown ids return `None`.
    pub fn remove(&mut self, id: RequestId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    /// Remove every entry, returning them with their ids.
    pub fn drain(&mut self) -> Vec<(RequestId, T)> {
        let mut drained = Vec::with_capacity(self.len);
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if let Some(value) = slot.value.take() {
                drained.push((
                    RequestId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                ));
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.len = 0;
        drained
    }

    /// Iterate over live entries.
    pub fn iter(&self) -> impl Iterator<Item = (RequestId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    RequestId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena has no live entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = SlotArena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");

        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_stale_id_does_not_resolve_reused_slot() {
        let mut arena = SlotArena::new();
        let old = arena.insert(1);
        assert_eq!(arena.remove(old), Some(1));

        let new = arena.insert(2);
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.get(new), Some(&2));
        assert_eq!(arena.remove(old), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_double_remove_is_noop() {
        let mut arena = SlotArena::new();
        let id = arena.insert(());
        assert!(arena.remove(id).is_some());
        assert!(arena.remove(id).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_reserve_released() {
        let mut arena: SlotArena<u8> = SlotArena::new();
        let id = arena.reserve_released();
        assert!(!arena.contains(id));
        assert!(arena.is_empty());

        let next = arena.insert(7);
        assert_ne!(id, next);
        assert!(!arena.contains(id));
    }

    #[test]
    fn test_drain_empties_and_invalidates() {
        let mut arena = SlotArena::new();
        let a = arena.insert('a');
        let b = arena.insert('b');

        let drained = arena.drain();
        assert_eq!(drained.len(), 2);
        assert!(arena.is_empty());
        assert!(!arena.contains(a));
        assert!(!arena.contains(b));
    }

    #[test]
    fn test_iter_skips_removed() {
        let mut arena = SlotArena::new();
        let a = arena.insert(10);
        let _b = arena.insert(20);
        arena.remove(a);

        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![20]);
    }

    #[test]
    fn test_display() {
        let mut arena = SlotArena::new();
        let id = arena.insert(());
        assert_eq!(id.to_string(), "req-0.0");
    }
}
