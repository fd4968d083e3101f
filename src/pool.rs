//! Fixed-count, fixed-slot-size allocator with a free bitmap.
//!
//! A slot is live iff its bit in `free_bitmap` is set. Reservation scans for
//! the first run of `n` consecutive clear bits starting just after a
//! rotating cursor (`last_pos`), wrapping around once. Both the single
//! threaded [`ChunkPool`] and the [`SyncChunkPool`] wrapper share this
//! layout; the sync variant only adds a mutex around mutation.
//!
//! Slot storage is a `Vec<T>`, but its capacity is only ever authorized
//! through a shared [`BufferArena`] (see [`ChunkPool::new_in`]) so every
//! pool in a world draws its budget from the same one-shot region.

use crate::arena::BufferArena;
use crate::error::PoolError;
use log::warn;
use parking_lot::Mutex;

const WORD_BITS: usize = 64;

#[derive(Clone)]
struct Bitmap {
    words: Vec<u64>,
    capacity: usize,
}

impl Bitmap {
    fn new(capacity: usize) -> Self {
        Self {
            words: vec![0u64; capacity.div_ceil(WORD_BITS)],
            capacity,
        }
    }

    fn get(&self, index: usize) -> bool {
        (self.words[index / WORD_BITS] >> (index % WORD_BITS)) & 1 == 1
    }

    fn set(&mut self, index: usize) {
        self.words[index / WORD_BITS] |= 1u64 << (index % WORD_BITS);
    }

    fn clear(&mut self, index: usize) {
        self.words[index / WORD_BITS] &= !(1u64 << (index % WORD_BITS));
    }

    /// Finds the first run of `n` consecutive clear bits starting at or after
    /// `start`, wrapping around the bitmap once. Skips whole words that are
    /// entirely set.
    fn find_clear_run(&self, start: usize, n: usize) -> Option<usize> {
        if n > self.capacity {
            return None;
        }

        for offset in 0..self.capacity {
            let candidate = (start + offset) % self.capacity;

            // Fast-skip a fully occupied word.
            let word_idx = candidate / WORD_BITS;
            if self.words[word_idx] == u64::MAX && candidate % WORD_BITS == 0 {
                continue;
            }

            if candidate + n > self.capacity {
                continue;
            }

            if (candidate..candidate + n).all(|i| !self.get(i)) {
                return Some(candidate);
            }
        }

        None
    }

    fn set_run(&mut self, start: usize, n: usize) {
        for i in start..start + n {
            self.set(i);
        }
    }

    fn clear_run(&mut self, start: usize, n: usize) {
        for i in start..start + n {
            self.clear(i);
        }
    }
}

/// Single-threaded fixed-slot pool. `T` occupies every slot from
/// construction; a slot is considered "live" data only once reserved, per
/// the free bitmap.
pub struct ChunkPool<T> {
    slots: Vec<T>,
    free_bitmap: Bitmap,
    last_pos: isize,
    capacity: usize,
}

impl<T: Default + Clone> ChunkPool<T> {
    /// Bytes a pool of `capacity` slots of `T` needs from a [`BufferArena`],
    /// including slack for the alignment padding `take` may insert.
    pub fn bytes_for(capacity: usize) -> usize {
        capacity * std::mem::size_of::<T>() + std::mem::align_of::<T>()
    }

    /// Authorizes `capacity` slots of `T` from `arena` and builds the pool.
    pub fn new_in(arena: &mut BufferArena, capacity: usize) -> Result<Self, PoolError> {
        arena.take_typed::<T>(capacity)?;
        Ok(Self {
            slots: vec![T::default(); capacity],
            free_bitmap: Bitmap::new(capacity),
            last_pos: -1,
            capacity,
        })
    }
}

impl<T> ChunkPool<T> {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reserves a run of `n` contiguous slots, returning the first slot
    /// index. Returns `PoolError::Full` if no such run exists.
    pub fn reserve(&mut self, n: usize) -> Result<usize, PoolError> {
        let start = (self.last_pos + 1).rem_euclid(self.capacity as isize) as usize;
        let found = self
            .free_bitmap
            .find_clear_run(start, n)
            .ok_or_else(|| {
                warn!(
                    "chunk pool exhausted: no run of {} slot(s) in capacity {}",
                    n, self.capacity
                );
                PoolError::Full {
                    requested: n,
                    capacity: self.capacity,
                }
            })?;

        self.free_bitmap.set_run(found, n);
        self.last_pos = (found + n - 1) as isize;
        Ok(found)
    }

    /// Releases a run of `n` contiguous slots starting at `slot_index`.
    pub fn release(&mut self, slot_index: usize, n: usize) -> Result<(), PoolError> {
        if slot_index + n > self.capacity {
            return Err(PoolError::InvalidSlot(slot_index));
        }
        self.free_bitmap.clear_run(slot_index, n);
        Ok(())
    }

    pub fn is_live(&self, slot_index: usize) -> bool {
        slot_index < self.capacity && self.free_bitmap.get(slot_index)
    }

    pub fn get(&self, slot_index: usize) -> Option<&T> {
        if self.is_live(slot_index) {
            self.slots.get(slot_index)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, slot_index: usize) -> Option<&mut T> {
        if self.is_live(slot_index) {
            self.slots.get_mut(slot_index)
        } else {
            None
        }
    }

    /// Visits every live slot in ascending order.
    pub fn iter_live(&self) -> impl Iterator<Item = (usize, &T)> {
        (0..self.capacity).filter_map(move |i| self.get(i).map(|v| (i, v)))
    }

    pub fn live_count(&self) -> usize {
        (0..self.capacity).filter(|&i| self.free_bitmap.get(i)).count()
    }
}

/// `parking_lot`-guarded wrapper over the same bitmap/slot layout, for
/// callers that reserve/release from multiple producers.
pub struct SyncChunkPool<T> {
    inner: Mutex<ChunkPool<T>>,
}

impl<T: Default + Clone> SyncChunkPool<T> {
    pub fn new_in(arena: &mut BufferArena, capacity: usize) -> Result<Self, PoolError> {
        Ok(Self {
            inner: Mutex::new(ChunkPool::new_in(arena, capacity)?),
        })
    }
}

impl<T> SyncChunkPool<T> {
    pub fn reserve(&self, n: usize) -> Result<usize, PoolError> {
        self.inner.lock().reserve(n)
    }

    pub fn release(&self, slot_index: usize, n: usize) -> Result<(), PoolError> {
        self.inner.lock().release(slot_index, n)
    }

    pub fn with_slot<R>(&self, slot_index: usize, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.lock().get(slot_index).map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_for(capacity: usize) -> BufferArena {
        BufferArena::alloc(ChunkPool::<u32>::bytes_for(capacity))
    }

    #[test]
    fn reserve_then_release_frees_the_slot() {
        let mut arena = arena_for(4);
        let mut pool: ChunkPool<u32> = ChunkPool::new_in(&mut arena, 4).unwrap();
        let a = pool.reserve(1).unwrap();
        assert!(pool.is_live(a));
        pool.release(a, 1).unwrap();
        assert!(!pool.is_live(a));
    }

    #[test]
    fn reserve_exhaustion_returns_full() {
        let mut arena = arena_for(2);
        let mut pool: ChunkPool<u32> = ChunkPool::new_in(&mut arena, 2).unwrap();
        pool.reserve(1).unwrap();
        pool.reserve(1).unwrap();
        assert!(matches!(pool.reserve(1), Err(PoolError::Full { .. })));
    }

    #[test]
    fn reserve_multi_slot_run() {
        let mut arena = arena_for(8);
        let mut pool: ChunkPool<u32> = ChunkPool::new_in(&mut arena, 8).unwrap();
        let first = pool.reserve(3).unwrap();
        assert!((first..first + 3).all(|i| pool.is_live(i)));
    }

    #[test]
    fn cursor_rotates_across_wraparound() {
        let mut arena = arena_for(4);
        let mut pool: ChunkPool<u32> = ChunkPool::new_in(&mut arena, 4).unwrap();
        let a = pool.reserve(1).unwrap();
        let b = pool.reserve(1).unwrap();
        pool.release(a, 1).unwrap();
        let c = pool.reserve(1).unwrap();
        assert_ne!(b, c);
    }

    #[test]
    fn new_in_fails_when_arena_is_too_small() {
        let mut arena = BufferArena::alloc(4);
        let result: Result<ChunkPool<u32>, PoolError> = ChunkPool::new_in(&mut arena, 8);
        assert!(matches!(result, Err(PoolError::Arena(_))));
    }

    #[test]
    fn sync_pool_reserve_release_roundtrip() {
        let mut arena = arena_for(4);
        let pool: SyncChunkPool<u32> = SyncChunkPool::new_in(&mut arena, 4).unwrap();
        let slot = pool.reserve(1).unwrap();
        pool.release(slot, 1).unwrap();
        let slot2 = pool.reserve(1).unwrap();
        assert_eq!(slot, slot2);
    }
}
