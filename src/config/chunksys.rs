use serde::{Deserialize, Serialize};

/// Capacities and tunables for the arenas backing a [`crate::world::World`].
///
/// All fields bound the fixed-size arenas carved out at construction time;
/// none of them grow afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Number of 32^3 chunk slots in the chunk pool.
    pub chunk_capacity: usize,
    /// Number of buckets in the spatial hash table. The source engine sizes
    /// this at 2x chunk_capacity to keep the load factor low.
    pub hash_table_capacity: usize,
    /// Number of octree nodes pre-allocated. Sized at chunk_capacity * 8 to
    /// match the source engine's worst-case node budget.
    pub octree_node_capacity: usize,
    /// Maximum number of chunks a single `build_draw_list` call can emit.
    pub draw_list_capacity: usize,
    /// Edge length, in voxels, below which an octree node is a leaf.
    pub leaf_size: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        let chunk_capacity = 4096;
        Self {
            chunk_capacity,
            hash_table_capacity: chunk_capacity * 2,
            octree_node_capacity: chunk_capacity * 8,
            draw_list_capacity: chunk_capacity,
            leaf_size: crate::voxel::CHUNK_SIZE,
        }
    }
}

impl WorldConfig {
    pub fn with_chunk_capacity(mut self, chunk_capacity: usize) -> Self {
        self.chunk_capacity = chunk_capacity;
        self
    }

    pub fn with_hash_table_capacity(mut self, hash_table_capacity: usize) -> Self {
        self.hash_table_capacity = hash_table_capacity;
        self
    }

    pub fn with_octree_node_capacity(mut self, octree_node_capacity: usize) -> Self {
        self.octree_node_capacity = octree_node_capacity;
        self
    }

    pub fn with_draw_list_capacity(mut self, draw_list_capacity: usize) -> Self {
        self.draw_list_capacity = draw_list_capacity;
        self
    }

    pub fn with_leaf_size(mut self, leaf_size: i32) -> Self {
        self.leaf_size = leaf_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacities_are_consistent() {
        let cfg = WorldConfig::default();
        assert_eq!(cfg.hash_table_capacity, cfg.chunk_capacity * 2);
        assert_eq!(cfg.octree_node_capacity, cfg.chunk_capacity * 8);
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = WorldConfig::default()
            .with_chunk_capacity(16)
            .with_leaf_size(16);
        assert_eq!(cfg.chunk_capacity, 16);
        assert_eq!(cfg.leaf_size, 16);
    }
}
