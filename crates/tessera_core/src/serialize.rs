//! # Component Serialization
//!
//! Byte images of single components, independent of entity identity.
//!
//! Plain-old-data components get a serializer for free by implementing
//! [`PodComponent`]; their image is exactly `size_of::<T>()` bytes in native
//! byte order. Other components implement [`ComponentSerializer`] by hand on
//! top of [`ByteBuffer`].

use bytemuck::Pod;

use crate::ecs::{Component, Entity, World};
use crate::error::{EcsError, EcsResult};

/// Growable byte buffer with a read cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
    cursor: usize,
}

impl ByteBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer reading from a copy of `bytes`.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            cursor: 0,
        }
    }

    /// Total bytes written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Checks if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    /// Moves the read cursor back to the start.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Everything written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Appends the byte image of a plain value.
    pub fn write<T: Pod>(&mut self, value: &T) {
        self.bytes.extend_from_slice(bytemuck::bytes_of(value));
    }

    /// Appends a `u32` length followed by every element.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::SequenceTooLong`] if the length does not fit a `u32`.
    pub fn write_slice<T: Pod>(&mut self, values: &[T]) -> EcsResult<()> {
        let len = u32::try_from(values.len())
            .map_err(|_| EcsError::SequenceTooLong { len: values.len() })?;
        self.write(&len);
        self.bytes.extend_from_slice(bytemuck::cast_slice(values));
        Ok(())
    }

    /// Reads the next plain value.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::BufferUnderflow`] if too few bytes remain.
    pub fn read<T: Pod>(&mut self) -> EcsResult<T> {
        let bytes = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Reads a sequence written by [`ByteBuffer::write_slice`].
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::BufferUnderflow`] if too few bytes remain.
    pub fn read_vec<T: Pod>(&mut self) -> EcsResult<Vec<T>> {
        let len = self.read::<u32>()? as usize;
        let size = std::mem::size_of::<T>();
        if size == 0 {
            return Ok(vec![T::zeroed(); len]);
        }
        let bytes = self.take(len.saturating_mul(size))?;
        Ok(bytes.chunks_exact(size).map(bytemuck::pod_read_unaligned).collect())
    }

    fn take(&mut self, needed: usize) -> EcsResult<&[u8]> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(EcsError::BufferUnderflow { needed, remaining });
        }
        let start = self.cursor;
        self.cursor += needed;
        Ok(&self.bytes[start..self.cursor])
    }
}

/// Converts a component to and from bytes.
pub trait ComponentSerializer: Component + Sized {
    /// Appends the byte image of `self`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::SequenceTooLong`] if a sequence cannot be
    /// length-prefixed.
    fn serialize(&self, buffer: &mut ByteBuffer) -> EcsResult<()>;

    /// Reads a value back.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::BufferUnderflow`] on truncated input.
    fn deserialize(buffer: &mut ByteBuffer) -> EcsResult<Self>;
}

/// Marker for components whose byte image is their memory layout.
pub trait PodComponent: Component + Pod {}

impl<T: PodComponent> ComponentSerializer for T {
    fn serialize(&self, buffer: &mut ByteBuffer) -> EcsResult<()> {
        buffer.write(self);
        Ok(())
    }

    fn deserialize(buffer: &mut ByteBuffer) -> EcsResult<Self> {
        buffer.read()
    }
}

impl World {
    /// Serializes one component of an entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotAlive`], [`EcsError::ComponentNotPresent`], or
    /// the serializer's own error.
    pub fn serialize_component<T: ComponentSerializer>(&self, entity: Entity) -> EcsResult<Vec<u8>> {
        let mut buffer = ByteBuffer::new();
        self.get::<T>(entity)?.serialize(&mut buffer)?;
        Ok(buffer.into_bytes())
    }

    /// Deserializes `bytes` and sets the result on an entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityNotAlive`] or [`EcsError::BufferUnderflow`].
    pub fn deserialize_component<T: ComponentSerializer>(
        &mut self,
        entity: Entity,
        bytes: &[u8],
        enable_if_added: bool,
    ) -> EcsResult<()> {
        if !self.is_alive(entity) {
            return Err(EcsError::EntityNotAlive { entity });
        }
        let value = T::deserialize(&mut ByteBuffer::from_slice(bytes))?;
        self.set(entity, value, enable_if_added)
    }
}
