use thiserror::Error;

/// Errors from the buffer arena.
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("arena exhausted: requested {requested} bytes, {remaining} remaining")]
    OutOfArena { requested: usize, remaining: usize },
}

/// Errors from the chunk pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool full: no run of {requested} free slot(s) in capacity {capacity}")]
    Full { requested: usize, capacity: usize },

    #[error("slot index {0} out of range")]
    InvalidSlot(usize),

    #[error("chunk pool construction failed: {0}")]
    Arena(#[from] ArenaError),
}

/// Errors from the loose octree.
#[derive(Debug, Error)]
pub enum OctreeError {
    #[error("octree node array exhausted: capacity {capacity}")]
    NodeExhausted { capacity: usize },

    #[error("octree node array construction failed: {0}")]
    Arena(#[from] ArenaError),
}

/// Top-level errors surfaced by the world facade.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("chunk coordinate out of range: {0:?} exceeds 21-bit signed per-axis limit")]
    CoordOutOfRange((i32, i32, i32)),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Octree(#[from] OctreeError),

    #[error(transparent)]
    Arena(#[from] ArenaError),
}

pub type Result<T> = std::result::Result<T, WorldError>;
