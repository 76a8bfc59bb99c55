//! # Component System
//!
//! Components are plain data attached to entities under a specific type.
//!
//! Each component type receives a small stable integer id the first time it
//! is used, process-wide. Bitsets and query masks are indexed by that id. The
//! assignment lives in a lazily created registry that can be explicitly reset
//! when the embedding host reloads code.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use parking_lot::RwLock;

/// Marker trait for ECS components.
///
/// Components that own external resources set `DISPOSABLE` and implement
/// [`Component::dispose`]; the owning stash calls it exactly once when the
/// value is removed, replaced, or cleared.
///
/// # Example
///
/// ```rust
/// use tessera_core::Component;
///
/// #[derive(Clone, Copy, Debug, Default, PartialEq)]
/// struct Position {
///     x: f32,
///     y: f32,
/// }
///
/// impl Component for Position {}
/// ```
pub trait Component: 'static {
    /// Whether [`Component::dispose`] must run when a value leaves storage.
    const DISPOSABLE: bool = false;

    /// Releases resources owned by this value.
    fn dispose(&mut self) {}
}

/// Stable per-process index of a component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u32);

impl ComponentTypeId {
    /// Index into bitsets and per-type tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry record for a component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentTypeInfo {
    /// Assigned index.
    pub id: ComponentTypeId,
    /// Full Rust type name.
    pub name: &'static str,
    /// Whether values are disposed on removal.
    pub disposable: bool,
}

impl ComponentTypeInfo {
    /// Type name without its module path.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

#[derive(Default)]
struct TypeRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    infos: Vec<ComponentTypeInfo>,
    /// Bumped on every reset so stale worlds can be detected.
    epoch: u64,
}

fn registry() -> &'static RwLock<TypeRegistry> {
    static REGISTRY: OnceLock<RwLock<TypeRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(TypeRegistry::default()))
}

/// Returns the index of `T`, assigning the next free one on first use.
pub fn component_type_id<T: Component>() -> ComponentTypeId {
    let key = TypeId::of::<T>();
    if let Some(&id) = registry().read().by_type.get(&key) {
        return id;
    }

    let mut registry = registry().write();
    // Another caller may have registered between the two locks.
    if let Some(&id) = registry.by_type.get(&key) {
        return id;
    }
    let id = ComponentTypeId(registry.infos.len() as u32);
    registry.infos.push(ComponentTypeInfo {
        id,
        name: type_name::<T>(),
        disposable: T::DISPOSABLE,
    });
    registry.by_type.insert(key, id);
    tracing::trace!(component = type_name::<T>(), %id, "registered component type");
    id
}

/// Looks up the registry record of an assigned index.
#[must_use]
pub fn component_type_info(id: ComponentTypeId) -> Option<ComponentTypeInfo> {
    registry().read().infos.get(id.index()).copied()
}

/// Number of component types registered since the last reset.
#[must_use]
pub fn registered_component_count() -> usize {
    registry().read().infos.len()
}

/// Current registry epoch. Changes on every [`reset_type_registry`].
#[must_use]
pub fn type_registry_epoch() -> u64 {
    registry().read().epoch
}

/// Forgets every index assignment.
///
/// Intended for hosts that reload code. Worlds created before the reset hold
/// storage keyed by the old indices and must not be used afterwards.
pub fn reset_type_registry() {
    let mut registry = registry().write();
    let forgotten = registry.infos.len();
    registry.by_type.clear();
    registry.infos.clear();
    registry.epoch += 1;
    tracing::warn!(forgotten, epoch = registry.epoch, "component type registry reset");
}

pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    // Keep generic arguments intact, strip the leading path only.
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    impl Component for Alpha {}

    struct Beta;
    impl Component for Beta {
        const DISPOSABLE: bool = true;
    }

    #[test]
    fn test_ids_are_stable_and_distinct() {
        let a = component_type_id::<Alpha>();
        let b = component_type_id::<Beta>();
        assert_ne!(a, b);
        assert_eq!(a, component_type_id::<Alpha>());

        let info = component_type_info(b).unwrap();
        assert_eq!(info.short_name(), "Beta");
        assert!(info.disposable);
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("a::b::Position"), "Position");
        assert_eq!(short_type_name("Position"), "Position");
        assert_eq!(short_type_name("a::Wrapper<b::Inner>"), "Wrapper<b::Inner>");
    }
}
