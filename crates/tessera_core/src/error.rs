//! # ECS Error Types
//!
//! All errors that can be raised by the runtime core.
//!
//! Identity and presence violations are programming errors upstream of the
//! call site. They are surfaced immediately and never swallowed; call sites
//! where absence is an expected outcome use the `try_*` variants instead.

use thiserror::Error;

use crate::ecs::Entity;

/// Errors that can occur in the ECS runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The entity handle is dead or stale (its slot was destroyed or reused).
    #[error("entity {entity} is not alive")]
    EntityNotAlive {
        /// The offending handle.
        entity: Entity,
    },

    /// The entity does not have the requested component.
    #[error("entity {entity} has no {component} component")]
    ComponentNotPresent {
        /// The entity that was queried.
        entity: Entity,
        /// Name of the missing component type.
        component: &'static str,
    },

    /// The world has no singleton value for the requested component.
    #[error("world has no {component} singleton")]
    SingletonNotPresent {
        /// Name of the missing component type.
        component: &'static str,
    },

    /// The slot is alive under a different generation.
    #[error("entity id {id} is in use (requested generation {generation})")]
    IdInUse {
        /// Requested slot id.
        id: u32,
        /// Requested generation.
        generation: u32,
    },

    /// The exact entity (id and generation) already exists.
    #[error("entity {entity} already exists")]
    DuplicateCreation {
        /// The entity that is already alive.
        entity: Entity,
    },

    /// The before/after constraints of a group cannot be satisfied.
    #[error("ordering conflict in group {group}: cycle through [{}]", systems.join(", "))]
    OrderingConflict {
        /// Name of the group being sorted.
        group: &'static str,
        /// Systems that could not be placed.
        systems: Vec<&'static str>,
    },

    /// The world was torn down.
    #[error("world has been destroyed")]
    WorldDestroyed,

    /// A byte buffer ran out of data while deserializing.
    #[error("buffer underflow: needed {needed} bytes, {remaining} remaining")]
    BufferUnderflow {
        /// Bytes requested by the read.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A sequence is too long for its `u32` length prefix.
    #[error("sequence of {len} elements does not fit a u32 length prefix")]
    SequenceTooLong {
        /// Element count of the rejected sequence.
        len: usize,
    },
}

/// Result type for ECS operations.
pub type EcsResult<T> = Result<T, EcsError>;
