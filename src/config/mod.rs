pub mod chunksys;

pub use chunksys::WorldConfig;
