//! Loose octree over chunk coordinates, used to drive frustum-culled
//! visibility queries. Nodes are bump-allocated from a pre-reserved array;
//! children are referenced by `u32` index (0 = null) rather than raw
//! pointers, so the tree carries no lifetime entanglement.

use crate::arena::BufferArena;
use crate::error::OctreeError;
use crate::voxel::CoordAxis;
use glam::IVec3;
use log::warn;

#[derive(Clone, Copy, Debug)]
pub struct AabbI32 {
    pub min: IVec3,
    pub max: IVec3,
}

impl AabbI32 {
    pub fn center(&self) -> IVec3 {
        (self.min + self.max) / 2
    }

    pub fn edge(&self) -> i32 {
        self.max.x - self.min.x
    }
}

const NULL: u32 = 0;

struct OctNode {
    bounds: AabbI32,
    is_leaf: bool,
    has_data: bool,
    children: [u32; 8],
    /// Pool slot index of the chunk occupying this leaf, if any. 0 doubles
    /// as "no data" since pool slot 0 is never confused with it: presence is
    /// tracked by `has_data`, not by this field alone.
    data: Option<usize>,
}

impl OctNode {
    fn empty(bounds: AabbI32) -> Self {
        Self {
            bounds,
            is_leaf: false,
            has_data: false,
            children: [NULL; 8],
            data: None,
        }
    }
}

/// Bump-allocated node array. `last` is the index one past the most
/// recently allocated node (slot 0 is always the root).
pub struct VoxelOctree {
    nodes: Vec<OctNode>,
    capacity: usize,
    leaf_size: i32,
}

fn child_index_for(node_bounds: &AabbI32, coord: IVec3) -> usize {
    let center = node_bounds.center();
    let mut index = 0usize;
    if coord.x >= center.x {
        index |= CoordAxis::X as usize;
    }
    if coord.y >= center.y {
        index |= CoordAxis::Y as usize;
    }
    if coord.z >= center.z {
        index |= CoordAxis::Z as usize;
    }
    index
}

fn make_root(leaf_size: i32, max_depth: u32, center_chunk_coord: IVec3) -> OctNode {
    let chunk_count = 1i64 << max_depth.saturating_sub(1);
    let half_size = (leaf_size / 2) * chunk_count as i32;

    let ctr = center_chunk_coord * leaf_size + IVec3::splat(leaf_size / 2);
    let root_bounds = AabbI32 {
        min: ctr - IVec3::splat(half_size),
        max: ctr + IVec3::splat(half_size),
    };

    let mut root = OctNode::empty(root_bounds);
    root.is_leaf = max_depth <= 1;
    root
}

fn child_bounds(parent: &AabbI32, child_index: usize) -> AabbI32 {
    let center = parent.center();
    let mut out = *parent;

    if child_index & CoordAxis::X as usize != 0 {
        out.min.x = center.x;
    } else {
        out.max.x = center.x;
    }
    if child_index & CoordAxis::Y as usize != 0 {
        out.min.y = center.y;
    } else {
        out.max.y = center.y;
    }
    if child_index & CoordAxis::Z as usize != 0 {
        out.min.z = center.z;
    } else {
        out.max.z = center.z;
    }

    out
}

impl VoxelOctree {
    /// Bytes a tree of `capacity` nodes needs from a [`BufferArena`].
    pub fn bytes_for(capacity: usize) -> usize {
        capacity * std::mem::size_of::<OctNode>() + std::mem::align_of::<OctNode>()
    }

    /// Authorizes `capacity` nodes from `arena` and builds a tree rooted on
    /// the chunk containing `center_chunk_coord`, spanning `2^max_depth`
    /// chunks per axis.
    pub fn new_in(
        arena: &mut BufferArena,
        capacity: usize,
        leaf_size: i32,
        max_depth: u32,
        center_chunk_coord: IVec3,
    ) -> Result<Self, OctreeError> {
        arena.take_typed::<OctNode>(capacity)?;
        let mut nodes = Vec::with_capacity(capacity);
        nodes.push(make_root(leaf_size, max_depth, center_chunk_coord));
        Ok(Self {
            nodes,
            capacity,
            leaf_size,
        })
    }

    /// Rebuilds this tree in place around a new center, reusing its already
    /// arena-authorized node storage instead of allocating a fresh tree.
    pub fn reset(&mut self, leaf_size: i32, max_depth: u32, center_chunk_coord: IVec3) {
        self.nodes.clear();
        self.nodes.push(make_root(leaf_size, max_depth, center_chunk_coord));
        self.leaf_size = leaf_size;
    }

    fn allocate_child(&mut self, bounds: AabbI32) -> Result<u32, OctreeError> {
        if self.nodes.len() >= self.capacity {
            warn!("octree node array exhausted: capacity {}", self.capacity);
            return Err(OctreeError::NodeExhausted {
                capacity: self.capacity,
            });
        }
        let mut node = OctNode::empty(bounds);
        node.has_data = true;
        node.is_leaf = bounds.edge() <= self.leaf_size;
        self.nodes.push(node);
        Ok(self.nodes.len() as u32 - 1)
    }

    /// Inserts a chunk handle at `chunk_coord`, lazily creating interior
    /// nodes as needed.
    pub fn insert(&mut self, chunk_coord: IVec3, pool_slot: usize) -> Result<(), OctreeError> {
        let world_anchor = chunk_coord * self.leaf_size + IVec3::splat(self.leaf_size / 2);
        let mut node_idx = 0u32;

        loop {
            self.nodes[node_idx as usize].has_data = true;
            if self.nodes[node_idx as usize].is_leaf {
                break;
            }

            let child_slot = child_index_for(&self.nodes[node_idx as usize].bounds, world_anchor);
            let existing = self.nodes[node_idx as usize].children[child_slot];

            let child_idx = if existing == NULL {
                let bounds = child_bounds(&self.nodes[node_idx as usize].bounds, child_slot);
                let new_idx = self.allocate_child(bounds)?;
                self.nodes[node_idx as usize].children[child_slot] = new_idx;
                new_idx
            } else {
                existing
            };

            node_idx = child_idx;
        }

        self.nodes[node_idx as usize].data = Some(pool_slot);
        self.nodes[node_idx as usize].has_data = true;
        Ok(())
    }

    /// Removes the chunk at `chunk_coord`, if present, recomputing
    /// `has_data` bottom-up along the path.
    pub fn remove(&mut self, chunk_coord: IVec3) {
        let world_anchor = chunk_coord * self.leaf_size + IVec3::splat(self.leaf_size / 2);
        let mut path = vec![0u32];
        let mut node_idx = 0u32;

        loop {
            if self.nodes[node_idx as usize].is_leaf {
                break;
            }
            let child_slot = child_index_for(&self.nodes[node_idx as usize].bounds, world_anchor);
            let child = self.nodes[node_idx as usize].children[child_slot];
            if child == NULL {
                return;
            }
            node_idx = child;
            path.push(node_idx);
        }

        self.nodes[node_idx as usize].data = None;
        self.nodes[node_idx as usize].has_data = false;

        for &idx in path.iter().rev().skip(1) {
            let any_child_has_data = self.nodes[idx as usize]
                .children
                .iter()
                .any(|&c| c != NULL && self.nodes[c as usize].has_data);
            self.nodes[idx as usize].has_data = any_child_has_data;
        }
    }

    /// Depth-first collection of leaf chunk handles whose bounds intersect
    /// `test`. `test` receives a node's bounds and returns whether it might
    /// be visible; kept generic so [`crate::visibility::Frustum`] need not
    /// be known to this module.
    pub fn collect_visible(&self, test: &impl Fn(&AabbI32) -> bool, out: &mut Vec<usize>) {
        self.collect_visible_from(0, test, out);
    }

    fn collect_visible_from(
        &self,
        node_idx: u32,
        test: &impl Fn(&AabbI32) -> bool,
        out: &mut Vec<usize>,
    ) {
        let node = &self.nodes[node_idx as usize];
        if !node.has_data || !test(&node.bounds) {
            return;
        }

        if node.is_leaf {
            if let Some(slot) = node.data {
                out.push(slot);
            }
            return;
        }

        for &child in node.children.iter() {
            if child != NULL {
                self.collect_visible_from(child, test, out);
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn root_bounds(&self) -> AabbI32 {
        self.nodes[0].bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(capacity: usize, leaf_size: i32, max_depth: u32) -> VoxelOctree {
        let mut arena = BufferArena::alloc(VoxelOctree::bytes_for(capacity));
        VoxelOctree::new_in(&mut arena, capacity, leaf_size, max_depth, IVec3::ZERO).unwrap()
    }

    #[test]
    fn insert_then_collect_visible_finds_the_chunk() {
        let mut tree = tree_with(512, 32, 4);
        tree.insert(IVec3::new(0, 0, 0), 7).unwrap();

        let mut out = Vec::new();
        tree.collect_visible(&|_| true, &mut out);
        assert_eq!(out, vec![7]);
    }

    #[test]
    fn remove_clears_leaf_and_propagates_has_data() {
        let mut tree = tree_with(512, 32, 4);
        tree.insert(IVec3::new(0, 0, 0), 7).unwrap();
        tree.remove(IVec3::new(0, 0, 0));

        let mut out = Vec::new();
        tree.collect_visible(&|_| true, &mut out);
        assert!(out.is_empty());
        assert!(!tree.nodes[0].has_data);
    }

    #[test]
    fn insert_exhaustion_returns_node_exhausted() {
        let mut tree = tree_with(1, 32, 4);
        // Root alone is not a leaf at depth 4, so the first insert needs a
        // child node the single-node capacity cannot provide.
        assert!(matches!(
            tree.insert(IVec3::new(100, 0, 0), 1),
            Err(OctreeError::NodeExhausted { .. })
        ));
    }

    #[test]
    fn reset_rebuilds_root_without_reallocating() {
        let mut tree = tree_with(512, 32, 4);
        tree.insert(IVec3::new(0, 0, 0), 7).unwrap();
        tree.reset(32, 4, IVec3::new(100, 0, 0));
        assert_eq!(tree.node_count(), 1);
        assert!(!tree.nodes[0].has_data);
    }
}
