//! # Sparse Array
//!
//! Sparse-to-dense mapping keyed by small integer ids.
//!
//! ```text
//! sparse:       [ 2,  -,  0,  -,  1 ]   <- indexed by entity id
//! dense_ids:    [ 2,  4,  0 ]
//! dense_values: [ V2, V4, V0 ]          <- contiguous, iteration-friendly
//! buffer:       Some(S)                 <- reserved singleton slot
//! ```
//!
//! - get/set/has/remove: O(1)
//! - Removal swap-removes the dense arrays and never shrinks capacity.
//! - The sparse side grows geometrically to the next power of two.

const ABSENT: u32 = u32::MAX;

/// Sparse set storing at most one `T` per id, plus one singleton slot.
#[derive(Clone, Debug)]
pub struct SparseArray<T> {
    /// Id -> dense index, or `ABSENT`.
    sparse: Vec<u32>,
    /// Dense index -> id.
    dense_ids: Vec<u32>,
    /// Dense index -> value.
    dense_values: Vec<T>,
    /// Slot not tied to any id.
    buffer: Option<T>,
}

impl<T> Default for SparseArray<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T> SparseArray<T> {
    /// Creates an array with room for `capacity` values.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            sparse: vec![ABSENT; capacity],
            dense_ids: Vec::with_capacity(capacity),
            dense_values: Vec::with_capacity(capacity),
            buffer: None,
        }
    }

    /// Number of id-keyed values (the singleton slot is not counted).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense_values.len()
    }

    /// Checks if no id-keyed value is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense_values.is_empty()
    }

    /// Capacity of the sparse side.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.sparse.len()
    }

    #[inline]
    fn dense_index(&self, id: u32) -> Option<usize> {
        match self.sparse.get(id as usize) {
            Some(&index) if index != ABSENT => Some(index as usize),
            _ => None,
        }
    }

    /// Inserts or replaces the value for `id`.
    ///
    /// Returns the replaced value, if any.
    pub fn set(&mut self, id: u32, value: T) -> Option<T> {
        if let Some(index) = self.dense_index(id) {
            return Some(std::mem::replace(&mut self.dense_values[index], value));
        }

        let slot = id as usize;
        if slot >= self.sparse.len() {
            let new_len = (slot + 1).next_power_of_two();
            self.sparse.resize(new_len, ABSENT);
        }
        self.sparse[slot] = self.dense_values.len() as u32;
        self.dense_ids.push(id);
        self.dense_values.push(value);
        None
    }

    /// Gets the value for `id`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&T> {
        self.dense_index(id).map(|index| &self.dense_values[index])
    }

    /// Gets the value for `id` mutably.
    #[inline]
    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.dense_index(id).map(|index| &mut self.dense_values[index])
    }

    /// Checks if `id` has a value.
    #[inline]
    #[must_use]
    pub fn has(&self, id: u32) -> bool {
        self.dense_index(id).is_some()
    }

    /// Removes and returns the value for `id`.
    pub fn remove(&mut self, id: u32) -> Option<T> {
        let index = self.dense_index(id)?;
        self.sparse[id as usize] = ABSENT;

        let last = self.dense_values.len() - 1;
        if index != last {
            let moved_id = self.dense_ids[last];
            self.sparse[moved_id as usize] = index as u32;
        }
        self.dense_ids.swap_remove(index);
        Some(self.dense_values.swap_remove(index))
    }

    /// Sets the singleton slot. Returns the replaced value, if any.
    pub fn set_buffer_value(&mut self, value: T) -> Option<T> {
        self.buffer.replace(value)
    }

    /// Gets the singleton slot.
    #[inline]
    #[must_use]
    pub fn buffer_value(&self) -> Option<&T> {
        self.buffer.as_ref()
    }

    /// Gets the singleton slot mutably.
    #[inline]
    pub fn buffer_value_mut(&mut self) -> Option<&mut T> {
        self.buffer.as_mut()
    }

    /// Checks if the singleton slot is occupied.
    #[inline]
    #[must_use]
    pub fn has_buffer_value(&self) -> bool {
        self.buffer.is_some()
    }

    /// Empties the singleton slot.
    pub fn remove_buffer_value(&mut self) -> Option<T> {
        self.buffer.take()
    }

    /// Iterates over `(id, value)` pairs in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.dense_ids.iter().copied().zip(self.dense_values.iter())
    }

    /// Iterates mutably over `(id, value)` pairs in dense order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.dense_ids.iter().copied().zip(self.dense_values.iter_mut())
    }

    /// Removes every value (including the singleton), keeping capacity.
    ///
    /// Values are handed to `on_removed` before being dropped.
    pub fn drain_with(&mut self, mut on_removed: impl FnMut(T)) {
        for &id in &self.dense_ids {
            self.sparse[id as usize] = ABSENT;
        }
        self.dense_ids.clear();
        for value in self.dense_values.drain(..) {
            on_removed(value);
        }
        if let Some(value) = self.buffer.take() {
            on_removed(value);
        }
    }

    /// Removes every value (including the singleton), keeping capacity.
    pub fn clear(&mut self) {
        self.drain_with(drop);
    }
}
