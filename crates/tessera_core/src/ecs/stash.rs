//! # Component Stash
//!
//! One stash per component type per world. Wraps a [`SparseArray`] and adds
//! the disposal contract: a disposable value is disposed exactly once, when
//! it is removed, replaced by a new value, or dropped by a clear.

use std::any::Any;

use super::component::{component_type_id, Component, ComponentTypeId};
use super::sparse::SparseArray;

/// Storage for a single component type.
pub struct Stash<T: Component> {
    components: SparseArray<T>,
}

#[inline]
fn dispose<T: Component>(mut value: T) {
    if T::DISPOSABLE {
        value.dispose();
    }
}

impl<T: Component> Stash<T> {
    /// Creates a stash with room for `initial_capacity` entities.
    #[must_use]
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            components: SparseArray::new(initial_capacity),
        }
    }

    /// Number of entities holding a value.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Checks if no entity holds a value.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Stores `value` for `entity_id`. Returns `true` if the id was newly added.
    ///
    /// A replaced value is disposed.
    pub fn set(&mut self, entity_id: u32, value: T) -> bool {
        match self.components.set(entity_id, value) {
            Some(previous) => {
                dispose(previous);
                false
            }
            None => true,
        }
    }

    /// Gets the value of `entity_id`.
    #[inline]
    #[must_use]
    pub fn get(&self, entity_id: u32) -> Option<&T> {
        self.components.get(entity_id)
    }

    /// Gets the value of `entity_id` mutably.
    #[inline]
    pub fn get_mut(&mut self, entity_id: u32) -> Option<&mut T> {
        self.components.get_mut(entity_id)
    }

    /// Checks if `entity_id` has a value.
    #[inline]
    #[must_use]
    pub fn has(&self, entity_id: u32) -> bool {
        self.components.has(entity_id)
    }

    /// Disposes and drops the value of `entity_id`. Returns `true` if one existed.
    pub fn remove(&mut self, entity_id: u32) -> bool {
        match self.components.remove(entity_id) {
            Some(value) => {
                dispose(value);
                true
            }
            None => false,
        }
    }

    /// Stores the world singleton. A replaced value is disposed.
    pub fn world_set(&mut self, value: T) {
        if let Some(previous) = self.components.set_buffer_value(value) {
            dispose(previous);
        }
    }

    /// Gets the world singleton.
    #[inline]
    #[must_use]
    pub fn world_get(&self) -> Option<&T> {
        self.components.buffer_value()
    }

    /// Gets the world singleton mutably.
    #[inline]
    pub fn world_get_mut(&mut self) -> Option<&mut T> {
        self.components.buffer_value_mut()
    }

    /// Checks if the world singleton is set.
    #[inline]
    #[must_use]
    pub fn world_has(&self) -> bool {
        self.components.has_buffer_value()
    }

    /// Disposes and drops the world singleton. Returns `true` if one existed.
    pub fn world_remove(&mut self) -> bool {
        match self.components.remove_buffer_value() {
            Some(value) => {
                dispose(value);
                true
            }
            None => false,
        }
    }

    /// Iterates over `(entity_id, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.components.iter()
    }

    /// Disposes every value, including the singleton.
    pub fn clear(&mut self) {
        self.components.drain_with(dispose::<T>);
    }
}

impl<T: Component> Drop for Stash<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Type-erased view used by the world to route removals by type id.
pub trait ErasedStash: Any {
    /// Type id of the stored component.
    fn component_type(&self) -> ComponentTypeId;
    /// Removes the value of `entity_id` through the disposal path.
    fn remove_id(&mut self, entity_id: u32) -> bool;
    /// Checks if `entity_id` has a value.
    fn has_id(&self, entity_id: u32) -> bool;
    /// Disposes every value.
    fn clear(&mut self);
    /// Number of entities holding a value.
    fn len(&self) -> usize;
    /// Upcast for downcasting to `Stash<T>`.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for downcasting to `Stash<T>`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedStash for Stash<T> {
    fn component_type(&self) -> ComponentTypeId {
        component_type_id::<T>()
    }

    fn remove_id(&mut self, entity_id: u32) -> bool {
        self.remove(entity_id)
    }

    fn has_id(&self, entity_id: u32) -> bool {
        self.has(entity_id)
    }

    fn clear(&mut self) {
        Stash::clear(self);
    }

    fn len(&self) -> usize {
        Stash::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Handle {
        disposed: Rc<Cell<u32>>,
    }

    impl Component for Handle {
        const DISPOSABLE: bool = true;

        fn dispose(&mut self) {
            self.disposed.set(self.disposed.get() + 1);
        }
    }

    #[derive(Debug, PartialEq)]
    struct Plain(u32);
    impl Component for Plain {}

    #[test]
    fn test_set_get_remove() {
        let mut stash = Stash::new(4);
        assert!(stash.set(3, Plain(1)));
        assert!(!stash.set(3, Plain(2)), "overwrite is not an add");
        assert_eq!(stash.get(3), Some(&Plain(2)));

        stash.get_mut(3).unwrap().0 = 7;
        assert_eq!(stash.get(3), Some(&Plain(7)));

        assert!(stash.remove(3));
        assert!(!stash.remove(3));
        assert!(stash.is_empty());
    }

    #[test]
    fn test_dispose_exactly_once_on_remove() {
        let counter = Rc::new(Cell::new(0));
        let mut stash = Stash::new(1);
        stash.set(0, Handle { disposed: Rc::clone(&counter) });

        assert!(stash.remove(0));
        assert_eq!(counter.get(), 1);

        let second = Rc::new(Cell::new(0));
        stash.set(0, Handle { disposed: Rc::clone(&second) });
        assert_eq!(counter.get(), 1, "re-adding does not touch the old instance");
        assert_eq!(second.get(), 0);
    }

    #[test]
    fn test_dispose_on_replace_and_clear() {
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let singleton = Rc::new(Cell::new(0));

        let mut stash = Stash::new(1);
        stash.set(0, Handle { disposed: Rc::clone(&first) });
        stash.set(0, Handle { disposed: Rc::clone(&second) });
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 0);

        stash.world_set(Handle { disposed: Rc::clone(&singleton) });
        assert!(stash.world_has());

        stash.clear();
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 1);
        assert_eq!(singleton.get(), 1);

        drop(stash);
        assert_eq!(second.get(), 1, "drop after clear disposes nothing twice");
    }

    #[test]
    fn test_erased_routing() {
        let mut erased: Box<dyn ErasedStash> = Box::new(Stash::<Plain>::new(2));
        erased
            .as_any_mut()
            .downcast_mut::<Stash<Plain>>()
            .unwrap()
            .set(1, Plain(5));
        assert!(erased.has_id(1));
        assert_eq!(erased.len(), 1);
        assert!(erased.remove_id(1));
        assert_eq!(erased.component_type(), component_type_id::<Plain>());
    }
}
