//! Hash map whose chain storage lives inside a [`ChunkPool`] rather than a
//! separate allocator. Chains are 1-based pool slot indices (0 terminates a
//! chain), so a zeroed table represents "every bucket empty" without any
//! initialization pass.

use crate::arena::BufferArena;
use crate::error::PoolError;
use crate::pool::ChunkPool;
use crate::voxel::pack_chunk_coord;

const HASH_KEY_MAX_LEN: usize = 26;

struct Entry<V> {
    key: u64,
    next: u16,
    value: V,
}

impl<V: Default> Default for Entry<V> {
    fn default() -> Self {
        Self {
            key: 0,
            next: 0,
            value: V::default(),
        }
    }
}

impl<V: Clone> Clone for Entry<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            next: self.next,
            value: self.value.clone(),
        }
    }
}

/// Integer-keyed hash map over packed chunk coordinates. `V` is stored by
/// value in the entry pool; callers typically store a pool slot index
/// (a handle) rather than a raw pointer.
pub struct SpatialHash<V> {
    table: Vec<u16>,
    entries: ChunkPool<Entry<V>>,
}

impl<V: Default + Clone> SpatialHash<V> {
    /// Bytes a hash of `capacity` buckets needs from a [`BufferArena`]: the
    /// bucket table plus the embedded entry pool.
    pub fn bytes_for(capacity: usize) -> usize {
        capacity * std::mem::size_of::<u16>()
            + std::mem::align_of::<u16>()
            + ChunkPool::<Entry<V>>::bytes_for(capacity)
    }

    pub fn new_in(arena: &mut BufferArena, capacity: usize) -> Result<Self, PoolError> {
        arena.take_typed::<u16>(capacity)?;
        Ok(Self {
            table: vec![0u16; capacity],
            entries: ChunkPool::new_in(arena, capacity)?,
        })
    }

    fn bucket(&self, key: u64) -> usize {
        (key % self.table.len() as u64) as usize
    }

    pub fn get(&self, key: u64) -> Option<&V> {
        let mut slot = self.table[self.bucket(key)];
        while slot != 0 {
            let entry = self.entries.get(slot as usize - 1)?;
            if entry.key == key {
                return Some(&entry.value);
            }
            slot = entry.next;
        }
        None
    }

    pub fn get_mut(&mut self, key: u64) -> Option<&mut V> {
        let mut slot = self.table[self.bucket(key)];
        while slot != 0 {
            let idx = slot as usize - 1;
            // Re-borrow each iteration to satisfy the borrow checker while
            // walking a singly linked chain.
            let next = self.entries.get(idx)?.next;
            if self.entries.get(idx)?.key == key {
                return self.entries.get_mut(idx).map(|e| &mut e.value);
            }
            slot = next;
        }
        None
    }

    pub fn contains(&self, key: u64) -> bool {
        self.get(key).is_some()
    }

    /// Inserts `value` at `key`. Overwrites the value if `key` is already
    /// present instead of appending a duplicate chain entry.
    pub fn insert(&mut self, key: u64, value: V) -> Result<(), PoolError> {
        if let Some(existing) = self.get_mut(key) {
            *existing = value;
            return Ok(());
        }

        let slot = self.entries.reserve(1)?;
        {
            let entry = self.entries.get_mut(slot).expect("just reserved");
            entry.key = key;
            entry.value = value;
            entry.next = 0;
        }

        let bucket = self.bucket(key);
        let head = self.table[bucket];
        if head == 0 {
            self.table[bucket] = (slot + 1) as u16;
        } else {
            let mut cur = head;
            loop {
                let next = self.entries.get(cur as usize - 1).expect("live chain node").next;
                if next == 0 {
                    break;
                }
                cur = next;
            }
            self.entries.get_mut(cur as usize - 1).expect("live chain node").next = (slot + 1) as u16;
        }

        Ok(())
    }

    pub fn remove(&mut self, key: u64) -> Option<V> {
        let bucket = self.bucket(key);
        let mut prev: Option<u16> = None;
        let mut cur = self.table[bucket];

        while cur != 0 {
            let idx = cur as usize - 1;
            let (entry_key, entry_next) = {
                let entry = self.entries.get(idx)?;
                (entry.key, entry.next)
            };

            if entry_key == key {
                match prev {
                    None => self.table[bucket] = entry_next,
                    Some(p) => {
                        self.entries.get_mut(p as usize - 1).expect("live chain node").next = entry_next;
                    }
                }
                let value = self.entries.get(idx)?.value.clone();
                self.entries.release(idx, 1).ok()?;
                return Some(value);
            }

            prev = Some(cur);
            cur = entry_next;
        }

        None
    }

    pub fn insert_chunk_coord(&mut self, x: i32, y: i32, z: i32, value: V) -> Result<(), PoolError> {
        self.insert(pack_chunk_coord(x, y, z), value)
    }

    pub fn get_chunk_coord(&self, x: i32, y: i32, z: i32) -> Option<&V> {
        self.get(pack_chunk_coord(x, y, z))
    }

    pub fn remove_chunk_coord(&mut self, x: i32, y: i32, z: i32) -> Option<V> {
        self.remove(pack_chunk_coord(x, y, z))
    }

    pub fn len(&self) -> usize {
        self.entries.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// djb2, the default string hash.
pub fn djb2(key: &str) -> u64 {
    let mut hash: u64 = 5381;
    for b in key.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as u64);
    }
    hash
}

type StringHashFn = fn(&str) -> u64;

/// String-keyed variant sharing the same chain-in-pool layout. Keys longer
/// than 26 bytes are truncated to their *last* 26 bytes (matching the source
/// engine's fixed-size key buffer). The hash function is swappable via a
/// plain function pointer; it defaults to [`djb2`].
pub struct StringHashMap<V> {
    table: Vec<u16>,
    entries: ChunkPool<StringEntry<V>>,
    hash_fn: StringHashFn,
}

struct StringEntry<V> {
    key: [u8; HASH_KEY_MAX_LEN],
    key_len: u8,
    next: u16,
    value: V,
}

impl<V: Default> Default for StringEntry<V> {
    fn default() -> Self {
        Self {
            key: [0u8; HASH_KEY_MAX_LEN],
            key_len: 0,
            next: 0,
            value: V::default(),
        }
    }
}

impl<V: Clone> Clone for StringEntry<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            key_len: self.key_len,
            next: self.next,
            value: self.value.clone(),
        }
    }
}

fn truncate_key(key: &str) -> [u8; HASH_KEY_MAX_LEN] {
    let bytes = key.as_bytes();
    let mut buf = [0u8; HASH_KEY_MAX_LEN];
    if bytes.len() <= HASH_KEY_MAX_LEN {
        buf[..bytes.len()].copy_from_slice(bytes);
    } else {
        let start = bytes.len() - HASH_KEY_MAX_LEN;
        buf.copy_from_slice(&bytes[start..]);
    }
    buf
}

impl<V: Default + Clone> StringHashMap<V> {
    pub fn bytes_for(capacity: usize) -> usize {
        capacity * std::mem::size_of::<u16>()
            + std::mem::align_of::<u16>()
            + ChunkPool::<StringEntry<V>>::bytes_for(capacity)
    }

    pub fn new_in(arena: &mut BufferArena, capacity: usize) -> Result<Self, PoolError> {
        arena.take_typed::<u16>(capacity)?;
        Ok(Self {
            table: vec![0u16; capacity],
            entries: ChunkPool::new_in(arena, capacity)?,
            hash_fn: djb2,
        })
    }

    pub fn with_hash_fn(mut self, hash_fn: StringHashFn) -> Self {
        self.hash_fn = hash_fn;
        self
    }

    fn bucket(&self, key: &str) -> usize {
        ((self.hash_fn)(key) % self.table.len() as u64) as usize
    }

    pub fn insert(&mut self, key: &str, value: V) -> Result<(), PoolError> {
        let truncated = truncate_key(key);
        let key_len = truncated.iter().take_while(|&&b| b != 0).count().max(1) as u8;

        let slot = self.entries.reserve(1)?;
        {
            let entry = self.entries.get_mut(slot).expect("just reserved");
            entry.key = truncated;
            entry.key_len = key_len;
            entry.value = value;
            entry.next = 0;
        }

        let bucket = self.bucket(key);
        let head = self.table[bucket];
        if head == 0 {
            self.table[bucket] = (slot + 1) as u16;
        } else {
            let mut cur = head;
            loop {
                let next = self.entries.get(cur as usize - 1).expect("live chain node").next;
                if next == 0 {
                    break;
                }
                cur = next;
            }
            self.entries.get_mut(cur as usize - 1).expect("live chain node").next = (slot + 1) as u16;
        }

        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        let truncated = truncate_key(key);
        let mut slot = self.table[self.bucket(key)];
        while slot != 0 {
            let entry = self.entries.get(slot as usize - 1)?;
            if entry.key == truncated {
                return Some(&entry.value);
            }
            slot = entry.next;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_roundtrips() {
        let mut arena = BufferArena::alloc(SpatialHash::<usize>::bytes_for(16));
        let mut hash: SpatialHash<usize> = SpatialHash::new_in(&mut arena, 16).unwrap();
        hash.insert_chunk_coord(1, 2, 3, 42).unwrap();
        assert_eq!(hash.get_chunk_coord(1, 2, 3), Some(&42));
    }

    #[test]
    fn remove_makes_key_absent() {
        let mut arena = BufferArena::alloc(SpatialHash::<usize>::bytes_for(16));
        let mut hash: SpatialHash<usize> = SpatialHash::new_in(&mut arena, 16).unwrap();
        hash.insert_chunk_coord(1, 2, 3, 42).unwrap();
        assert_eq!(hash.remove_chunk_coord(1, 2, 3), Some(42));
        assert_eq!(hash.get_chunk_coord(1, 2, 3), None);
    }

    #[test]
    fn colliding_keys_chain_correctly() {
        // Force collisions with a tiny table.
        let mut arena = BufferArena::alloc(SpatialHash::<usize>::bytes_for(4));
        let mut hash: SpatialHash<usize> = SpatialHash::new_in(&mut arena, 4).unwrap();
        for i in 0..4 {
            hash.insert_chunk_coord(i, 0, 0, i as usize).unwrap();
        }
        for i in 0..4 {
            assert_eq!(hash.get_chunk_coord(i, 0, 0), Some(&(i as usize)));
        }
    }

    #[test]
    fn string_keys_truncate_to_last_26_chars() {
        let mut arena = BufferArena::alloc(StringHashMap::<u32>::bytes_for(8));
        let mut hash: StringHashMap<u32> = StringHashMap::new_in(&mut arena, 8).unwrap();
        let long_key = "a_very_long_key_that_exceeds_twenty_six_bytes";
        hash.insert(long_key, 7).unwrap();
        assert_eq!(hash.get(long_key), Some(&7));
        // A different prefix with the same last 26 bytes collides to the same entry.
        let other_prefix = format!("xx{}", &long_key[long_key.len() - 26..]);
        assert_eq!(hash.get(&other_prefix), Some(&7));
    }
}
