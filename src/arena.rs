//! Fixed-capacity bump allocator.
//!
//! Every other arena-backed structure in this crate (the chunk pool, the
//! spatial hash's entry pool, the octree's node array, the draw list) carves
//! its storage out of one [`BufferArena`]. Reservation never shrinks or
//! remaps; the only bulk release is [`BufferArena::reset`] at world teardown.

use crate::error::ArenaError;

pub struct BufferArena {
    storage: Vec<u8>,
    head: usize,
}

impl BufferArena {
    /// Reserves `total_size` bytes once. The arena never grows past this.
    pub fn alloc(total_size: usize) -> Self {
        Self {
            storage: vec![0u8; total_size],
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn remaining(&self) -> usize {
        self.storage.len() - self.head
    }

    /// Advances the head cursor, aligned up to `alignment`, and returns a
    /// mutable byte slice of length `size`.
    pub fn take(&mut self, size: usize, alignment: usize) -> Result<&mut [u8], ArenaError> {
        let aligned_head = align_up(self.head, alignment);
        let end = aligned_head
            .checked_add(size)
            .ok_or(ArenaError::OutOfArena {
                requested: size,
                remaining: self.remaining(),
            })?;

        if end > self.storage.len() {
            return Err(ArenaError::OutOfArena {
                requested: size,
                remaining: self.remaining(),
            });
        }

        self.head = end;
        Ok(&mut self.storage[aligned_head..end])
    }

    /// Authorizes storage for `count` values of `T`, advancing the head
    /// cursor by `count * size_of::<T>()` aligned to `align_of::<T>()`. The
    /// caller still owns its own typed storage (a `Vec<T>`); this only
    /// carves the byte budget for it out of the shared region so every
    /// arena-backed structure in the world draws from one reservation.
    pub fn take_typed<T>(&mut self, count: usize) -> Result<(), ArenaError> {
        self.take(count * std::mem::size_of::<T>(), std::mem::align_of::<T>())?;
        Ok(())
    }

    /// Resets the head cursor to zero. Does not zero memory.
    pub fn reset(&mut self) {
        self.head = 0;
    }
}

fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_advances_head_and_aligns() {
        let mut arena = BufferArena::alloc(64);
        let _ = arena.take(3, 1).unwrap();
        assert_eq!(arena.head, 3);
        let _ = arena.take(4, 8).unwrap();
        assert_eq!(arena.head, 12);
    }

    #[test]
    fn take_fails_when_exhausted() {
        let mut arena = BufferArena::alloc(8);
        assert!(arena.take(9, 1).is_err());
    }

    #[test]
    fn take_typed_sizes_by_count_times_element_size() {
        let mut arena = BufferArena::alloc(64);
        arena.take_typed::<u32>(4).unwrap();
        assert_eq!(arena.head, 16);
        assert!(arena.take_typed::<u32>(100).is_err());
    }

    #[test]
    fn reset_rewinds_head_without_zeroing() {
        let mut arena = BufferArena::alloc(16);
        {
            let slice = arena.take(4, 1).unwrap();
            slice.copy_from_slice(&[1, 2, 3, 4]);
        }
        arena.reset();
        assert_eq!(arena.head, 0);
        assert_eq!(&arena.storage[..4], &[1, 2, 3, 4]);
    }
}
