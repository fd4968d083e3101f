//! The dense 32^3 voxel grid and its CPU-side mesh buffer.

use crate::voxel::{Voxel, CHUNK_SIZE};
use bitflags::bitflags;
use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ChunkFlags: u8 {
        /// Freshly created; not yet inserted into the octree.
        const IS_NEW = 1 << 0;
        /// A voxel write landed since the mesh was last built.
        const IS_CHANGED = 1 << 1;
        /// Flagged during a position update for removal on the next
        /// `update_state` pass.
        const SHOULD_REMOVE = 1 << 2;
        /// Outside the active region but not yet due for removal (grace
        /// period); excluded from meshing and visibility.
        const IS_INACTIVE = 1 << 3;
    }
}

/// Worst-case vertex/index counts for one chunk: a checkerboard pattern on
/// every face emits one quad per voxel face.
pub const MESH_VERTEX_CAP: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize * 3;
pub const MESH_INDEX_CAP: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize * 2;

/// CPU-side mesh buffer for one chunk. Rebuilt wholesale by the mesher
/// whenever `IS_CHANGED` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMesh {
    pub vertices: Vec<Vec3>,
    /// Packed signed unit normals: `n * 127 + 127`, so -1/0/+1 map to
    /// 0/127/254 per axis.
    pub normals: Vec<[u8; 3]>,
    pub types: Vec<u16>,
    pub rotations: Vec<u8>,
    pub indices: Vec<u32>,
}

impl ChunkMesh {
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.normals.clear();
        self.types.clear();
        self.rotations.clear();
        self.indices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

/// Packs a signed unit-axis normal component into a byte.
pub fn pack_normal_component(n: f32) -> u8 {
    (n * 127.0 + 127.0).round() as u8
}

/// A 32x32x32 block of voxels, the atomic unit of spatial indexing and
/// meshing. Lives inside [`crate::pool::ChunkPool`] slots; `coord` is the
/// chunk index in world space (multiply by [`CHUNK_SIZE`] for the voxel
/// origin).
#[derive(Clone, Serialize, Deserialize)]
pub struct VoxelChunk {
    pub coord: IVec3,
    #[serde(with = "voxel_array")]
    voxels: Box<[Voxel; CHUNK_VOLUME]>,
    pub flags: ChunkFlags,
    pub mesh: ChunkMesh,
}

mod voxel_array {
    use super::{Voxel, CHUNK_VOLUME};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        voxels: &Box<[Voxel; CHUNK_VOLUME]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        voxels.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Box<[Voxel; CHUNK_VOLUME]>, D::Error> {
        let v: Vec<Voxel> = Vec::deserialize(deserializer)?;
        let boxed: Box<[Voxel]> = v.into_boxed_slice();
        let arr: Box<[Voxel; CHUNK_VOLUME]> = boxed
            .try_into()
            .map_err(|_| serde::de::Error::custom("voxel array length mismatch"))?;
        Ok(arr)
    }
}

impl VoxelChunk {
    pub fn new(coord: IVec3) -> Self {
        Self {
            coord,
            voxels: Box::new([Voxel::AIR; CHUNK_VOLUME]),
            flags: ChunkFlags::IS_NEW | ChunkFlags::IS_CHANGED,
            mesh: ChunkMesh::default(),
        }
    }

    /// World-space AABB covering this chunk.
    pub fn bounds_min(&self) -> IVec3 {
        self.coord * CHUNK_SIZE
    }

    pub fn bounds_max(&self) -> IVec3 {
        self.bounds_min() + IVec3::splat(CHUNK_SIZE)
    }

    pub fn center(&self) -> Vec3 {
        (self.bounds_min().as_vec3() + self.bounds_max().as_vec3()) * 0.5
    }

    fn index(local: IVec3) -> usize {
        debug_assert!(local.x >= 0 && local.x < CHUNK_SIZE);
        debug_assert!(local.y >= 0 && local.y < CHUNK_SIZE);
        debug_assert!(local.z >= 0 && local.z < CHUNK_SIZE);
        (local.x + local.y * CHUNK_SIZE + local.z * CHUNK_SIZE * CHUNK_SIZE) as usize
    }

    /// Returns the voxel at local coordinates `[0, CHUNK_SIZE)` on every
    /// axis. Panics (in debug) on out-of-range input; callers crossing chunk
    /// boundaries must resolve the owning chunk first (see `mesher::read_voxel`).
    pub fn get_local(&self, local: IVec3) -> Voxel {
        self.voxels[Self::index(local)]
    }

    pub fn set_local(&mut self, local: IVec3, voxel: Voxel) {
        let idx = Self::index(local);
        self.voxels[idx] = voxel;
        self.flags.insert(ChunkFlags::IS_CHANGED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_chunk_is_all_air_and_flagged_new() {
        let chunk = VoxelChunk::new(IVec3::ZERO);
        assert_eq!(chunk.get_local(IVec3::new(0, 0, 0)), Voxel::AIR);
        assert!(chunk.flags.contains(ChunkFlags::IS_NEW));
        assert!(chunk.flags.contains(ChunkFlags::IS_CHANGED));
    }

    #[test]
    fn set_local_marks_changed() {
        let mut chunk = VoxelChunk::new(IVec3::ZERO);
        chunk.flags.remove(ChunkFlags::IS_CHANGED);
        chunk.set_local(IVec3::new(1, 1, 1), Voxel::new(5, 0));
        assert!(chunk.flags.contains(ChunkFlags::IS_CHANGED));
        assert_eq!(chunk.get_local(IVec3::new(1, 1, 1)).r#type, 5);
    }

    #[test]
    fn bounds_match_coord_times_chunk_size() {
        let chunk = VoxelChunk::new(IVec3::new(-2, -2, -2));
        assert_eq!(chunk.bounds_min(), IVec3::splat(-64));
        assert_eq!(chunk.bounds_max(), IVec3::splat(-32));
    }

    #[test]
    fn pack_normal_component_maps_unit_axis_values() {
        assert_eq!(pack_normal_component(-1.0), 0);
        assert_eq!(pack_normal_component(0.0), 127);
        assert_eq!(pack_normal_component(1.0), 254);
    }
}
