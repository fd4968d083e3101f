//! World facade: ties the arena, chunk pool, spatial hash, and
//! double-buffered octree together behind `set_voxel` / `update_position` /
//! `update_state` / `build_draw_list`.

use crate::arena::BufferArena;
use crate::chunk::VoxelChunk;
use crate::config::WorldConfig;
use crate::error::{Result, WorldError};
use crate::mesher::{ChunkSource, Mesher};
use crate::octree::VoxelOctree;
use crate::pool::ChunkPool;
use crate::spatial_hash::SpatialHash;
use crate::visibility::{DrawList, Frustum};
use crate::voxel::{chunk_coord_in_range, floor_div, NonZeroSolid, SolidPredicate, Voxel, CHUNK_SIZE};
use glam::{IVec3, Vec3};
use log::{debug, info, warn};

/// Computed once per world: how many levels of 8-way subdivision the octree
/// spans so its root comfortably covers the configured chunk capacity.
fn octree_depth_for(chunk_capacity: usize) -> u32 {
    let mut depth = 1u32;
    while (1usize << (3 * (depth.saturating_sub(1)))) < chunk_capacity.max(1) {
        depth += 1;
    }
    depth
}

pub struct World<P: SolidPredicate = NonZeroSolid> {
    config: WorldConfig,
    arena: BufferArena,
    pool: ChunkPool<VoxelChunk>,
    hash: SpatialHash<usize>,
    oct_old: VoxelOctree,
    oct_new: VoxelOctree,
    draw_list: DrawList,
    solid: P,
    octree_depth: u32,
}

impl World<NonZeroSolid> {
    pub fn new(config: WorldConfig) -> Result<Self> {
        Self::with_solid_predicate(config, NonZeroSolid)
    }
}

impl<P: SolidPredicate> World<P> {
    pub fn with_solid_predicate(config: WorldConfig, solid: P) -> Result<Self> {
        let octree_depth = octree_depth_for(config.chunk_capacity);
        info!(
            "creating voxel world: chunk_capacity={} hash_capacity={} octree_nodes={}",
            config.chunk_capacity, config.hash_table_capacity, config.octree_node_capacity
        );

        let total_bytes = ChunkPool::<VoxelChunk>::bytes_for(config.chunk_capacity)
            + SpatialHash::<usize>::bytes_for(config.hash_table_capacity)
            + VoxelOctree::bytes_for(config.octree_node_capacity) * 2
            + DrawList::bytes_for(config.draw_list_capacity);
        let mut arena = BufferArena::alloc(total_bytes);

        let pool = ChunkPool::new_in(&mut arena, config.chunk_capacity)?;
        let hash = SpatialHash::new_in(&mut arena, config.hash_table_capacity)?;
        let oct_old = VoxelOctree::new_in(
            &mut arena,
            config.octree_node_capacity,
            config.leaf_size,
            octree_depth,
            IVec3::ZERO,
        )?;
        let oct_new = VoxelOctree::new_in(
            &mut arena,
            config.octree_node_capacity,
            config.leaf_size,
            octree_depth,
            IVec3::ZERO,
        )?;
        let draw_list = DrawList::new_in(&mut arena, config.draw_list_capacity)?;

        Ok(Self {
            config,
            arena,
            pool,
            hash,
            oct_old,
            oct_new,
            draw_list,
            solid,
            octree_depth,
        })
    }

    /// Bytes claimed from the shared arena so far. Exposed mainly for
    /// diagnostics; the arena itself is released in one shot when the world
    /// is dropped.
    pub fn arena_bytes_used(&self) -> usize {
        self.arena.capacity() - self.arena.remaining()
    }

    fn chunk_coord_for_world(&self, world: IVec3) -> IVec3 {
        IVec3::new(
            floor_div(world.x, CHUNK_SIZE),
            floor_div(world.y, CHUNK_SIZE),
            floor_div(world.z, CHUNK_SIZE),
        )
    }

    fn get_or_create_chunk(&mut self, coord: IVec3) -> Result<usize> {
        if let Some(&slot) = self.hash.get_chunk_coord(coord.x, coord.y, coord.z) {
            return Ok(slot);
        }

        let slot = self.pool.reserve(1)?;
        *self.pool.get_mut(slot).expect("just reserved") = VoxelChunk::new(coord);
        self.hash
            .insert_chunk_coord(coord.x, coord.y, coord.z, slot)?;
        debug!("created chunk at {:?} (slot {})", coord, slot);
        Ok(slot)
    }

    /// Writes one voxel at world-space coordinates, creating the owning
    /// chunk lazily if needed.
    pub fn set_voxel(&mut self, world: IVec3, voxel: Voxel) -> Result<()> {
        let chunk_coord = self.chunk_coord_for_world(world);
        if !chunk_coord_in_range(chunk_coord.x, chunk_coord.y, chunk_coord.z) {
            return Err(WorldError::CoordOutOfRange((
                chunk_coord.x,
                chunk_coord.y,
                chunk_coord.z,
            )));
        }
        let slot = self.get_or_create_chunk(chunk_coord)?;
        let local = world - chunk_coord * CHUNK_SIZE;
        let chunk = self.pool.get_mut(slot).expect("slot just resolved");
        chunk.set_local(local, voxel);
        Ok(())
    }

    /// Rebuilds the octree around `position`, inserting every chunk whose
    /// bounds overlap the new root and flagging the rest `SHOULD_REMOVE`.
    ///
    /// The predicate is named explicitly and applied in its plain-English
    /// sense (flag chunks that do NOT overlap), not inverted.
    pub fn update_position(&mut self, position: Vec3) -> Result<()> {
        let center_chunk = IVec3::new(
            floor_div(position.x as i32, CHUNK_SIZE),
            floor_div(position.y as i32, CHUNK_SIZE),
            floor_div(position.z as i32, CHUNK_SIZE),
        );

        self.oct_new.reset(self.config.leaf_size, self.octree_depth, center_chunk);
        let new_root = self.oct_new.root_bounds();

        let chunk_overlaps_new_root = |chunk: &VoxelChunk| -> bool {
            let min = chunk.bounds_min();
            let max = chunk.bounds_max();
            min.x < new_root.max.x
                && max.x > new_root.min.x
                && min.y < new_root.max.y
                && max.y > new_root.min.y
                && min.z < new_root.max.z
                && max.z > new_root.min.z
        };

        let slots: Vec<usize> = self.pool.iter_live().map(|(slot, _)| slot).collect();
        for slot in slots {
            let overlaps = {
                let chunk = self.pool.get(slot).expect("live slot");
                chunk_overlaps_new_root(chunk)
            };

            let chunk = self.pool.get_mut(slot).expect("live slot");
            if !overlaps {
                chunk.flags.insert(crate::chunk::ChunkFlags::SHOULD_REMOVE);
                continue;
            }

            chunk.flags.remove(crate::chunk::ChunkFlags::SHOULD_REMOVE);
            let coord = chunk.coord;
            self.oct_new.insert(coord, slot)?;
        }

        // `oct_new`, freshly rebuilt above, becomes the active tree
        // (`oct_old`, read by `build_draw_list`); the previously active tree
        // becomes the scratch buffer for the next rebuild.
        std::mem::swap(&mut self.oct_old, &mut self.oct_new);
        self.rebuild_dirty_meshes()?;
        Ok(())
    }

    fn rebuild_dirty_meshes(&mut self) -> Result<()> {
        let slots: Vec<usize> = self
            .pool
            .iter_live()
            .filter(|(_, c)| c.flags.contains(crate::chunk::ChunkFlags::IS_CHANGED))
            .map(|(slot, _)| slot)
            .collect();

        for slot in slots {
            self.rebuild_mesh_for_slot(slot)?;
        }
        Ok(())
    }

    fn rebuild_mesh_for_slot(&mut self, slot: usize) -> Result<()> {
        let source = PoolChunkSource {
            pool: &self.pool,
            hash: &self.hash,
        };
        let mesh = {
            let chunk = self.pool.get(slot).expect("live slot");
            let mesher = Mesher::new(&self.solid);
            mesher.build_mesh(chunk, &source)
        };
        let chunk = self.pool.get_mut(slot).expect("live slot");
        chunk.mesh = mesh;
        chunk.flags.remove(crate::chunk::ChunkFlags::IS_CHANGED);
        Ok(())
    }

    /// Visits every live chunk (by pool order, not hash order), retiring
    /// removed/inactive chunks, promoting new ones into the octree, and
    /// rebuilding meshes for changed ones.
    pub fn update_state(&mut self) -> Result<()> {
        let slots: Vec<usize> = self.pool.iter_live().map(|(slot, _)| slot).collect();

        for slot in slots {
            let (should_remove, is_inactive, is_new, is_changed, coord) = {
                let chunk = match self.pool.get(slot) {
                    Some(c) => c,
                    None => continue,
                };
                (
                    chunk.flags.contains(crate::chunk::ChunkFlags::SHOULD_REMOVE),
                    chunk.flags.contains(crate::chunk::ChunkFlags::IS_INACTIVE),
                    chunk.flags.contains(crate::chunk::ChunkFlags::IS_NEW),
                    chunk.flags.contains(crate::chunk::ChunkFlags::IS_CHANGED),
                    chunk.coord,
                )
            };

            if should_remove || is_inactive {
                self.oct_old.remove(coord);
                self.hash.remove_chunk_coord(coord.x, coord.y, coord.z);
                if should_remove {
                    if let Err(e) = self.pool.release(slot, 1) {
                        warn!("failed to release chunk slot {}: {}", slot, e);
                    }
                    debug!("removed chunk at {:?} (slot {})", coord, slot);
                }
                continue;
            }

            if is_new {
                self.oct_old.insert(coord, slot)?;
                let chunk = self.pool.get_mut(slot).expect("live slot");
                chunk.flags.remove(crate::chunk::ChunkFlags::IS_NEW);
                chunk.flags.insert(crate::chunk::ChunkFlags::IS_CHANGED);
                continue;
            }

            if is_changed {
                self.rebuild_mesh_for_slot(slot)?;
            }
        }

        Ok(())
    }

    /// Collects frustum-visible leaves from the current octree and returns
    /// them depth-sorted front-to-back, reusing the world's own draw list.
    pub fn build_draw_list(&mut self, camera_position: Vec3, frustum: &Frustum) -> &DrawList {
        let mut visible = Vec::new();
        self.oct_old
            .collect_visible(&|bounds| frustum.intersects_aabb_i32(bounds), &mut visible);

        let pool = &self.pool;
        self.draw_list.rebuild(visible, camera_position, |slot| {
            pool.get(slot).map(|c| c.center()).unwrap_or(Vec3::ZERO)
        });
        &self.draw_list
    }

    pub fn chunk(&self, slot: usize) -> Option<&VoxelChunk> {
        self.pool.get(slot)
    }

    pub fn chunk_at_coord(&self, coord: IVec3) -> Option<&VoxelChunk> {
        let slot = *self.hash.get_chunk_coord(coord.x, coord.y, coord.z)?;
        self.pool.get(slot)
    }

    pub fn chunk_count(&self) -> usize {
        self.pool.live_count()
    }
}

struct PoolChunkSource<'a> {
    pool: &'a ChunkPool<VoxelChunk>,
    hash: &'a SpatialHash<usize>,
}

impl ChunkSource for PoolChunkSource<'_> {
    fn chunk_at(&self, coord: IVec3) -> Option<&VoxelChunk> {
        let slot = *self.hash.get_chunk_coord(coord.x, coord.y, coord.z)?;
        self.pool.get(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_world() -> World {
        World::new(
            WorldConfig::default()
                .with_chunk_capacity(64)
                .with_hash_table_capacity(128)
                .with_octree_node_capacity(64 * 8)
                .with_draw_list_capacity(64),
        )
        .unwrap()
    }

    #[test]
    fn set_voxel_then_update_state_builds_six_quads() {
        let mut world = small_world();
        world.set_voxel(IVec3::new(1, 1, 1), Voxel::new(1, 0)).unwrap();
        world.update_state().unwrap();

        let chunk = world.chunk_at_coord(IVec3::ZERO).unwrap();
        assert_eq!(chunk.mesh.indices.len(), 36);
    }

    #[test]
    fn negative_coordinates_map_into_expected_chunk_and_local() {
        let mut world = small_world();
        world
            .set_voxel(IVec3::new(-42, -42, -42), Voxel::new(1, 0))
            .unwrap();

        let chunk = world.chunk_at_coord(IVec3::new(-2, -2, -2)).unwrap();
        assert_eq!(
            chunk.get_local(IVec3::new(22, 22, 22)),
            Voxel::new(1, 0)
        );
    }

    #[test]
    fn update_position_keeps_only_overlapping_chunks() {
        let mut world = small_world();
        world.set_voxel(IVec3::new(1, 1, 1), Voxel::new(1, 0)).unwrap();
        world.update_state().unwrap();

        // Move far enough away that chunk (0,0,0) falls outside the new root.
        world
            .update_position(Vec3::new(100_000.0, 100_000.0, 100_000.0))
            .unwrap();
        world.update_state().unwrap();

        assert!(world.chunk_at_coord(IVec3::ZERO).is_none());
    }

    #[test]
    fn update_state_is_a_no_op_with_no_flags_set() {
        let mut world = small_world();
        world.set_voxel(IVec3::new(1, 1, 1), Voxel::new(1, 0)).unwrap();
        world.update_state().unwrap();
        let before = world
            .chunk_at_coord(IVec3::ZERO)
            .unwrap()
            .mesh
            .indices
            .clone();

        world.update_state().unwrap();
        let after = world.chunk_at_coord(IVec3::ZERO).unwrap().mesh.indices.clone();
        assert_eq!(before, after);
    }

    #[test]
    fn set_voxel_beyond_21_bit_chunk_range_returns_coord_out_of_range() {
        let mut world = small_world();
        let far = (1i32 << 20) * CHUNK_SIZE;
        assert!(matches!(
            world.set_voxel(IVec3::new(far, 0, 0), Voxel::new(1, 0)),
            Err(WorldError::CoordOutOfRange(_))
        ));
    }
}
