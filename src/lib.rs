//! Voxel world core: fixed-capacity arenas, a chunk-pool-backed spatial
//! hash, greedy meshing, and an octree-driven visibility/draw-list pass.
//!
//! Rendering backends, asset loading, audio, UI, persistence, terrain
//! generation, and collision resolution are external collaborators; this
//! crate only turns voxel writes into a frustum-culled, depth-sorted stream
//! of chunk meshes.

pub mod arena;
pub mod chunk;
pub mod config;
pub mod error;
pub mod mesher;
pub mod octree;
pub mod pool;
pub mod spatial_hash;
pub mod visibility;
pub mod voxel;
pub mod world;

pub mod prelude {
    pub use crate::chunk::{ChunkFlags, ChunkMesh, VoxelChunk};
    pub use crate::config::WorldConfig;
    pub use crate::error::{Result, WorldError};
    pub use crate::visibility::{DrawList, Frustum};
    pub use crate::voxel::{SolidPredicate, Voxel};
    pub use crate::world::World;

    pub use glam::{IVec3, Mat4, Vec3};
}

/// Current crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
