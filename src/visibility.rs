//! Frustum culling and draw-list construction.

use crate::arena::BufferArena;
use crate::error::ArenaError;
use crate::octree::AabbI32;
use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, Default)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    fn normalize(&mut self) {
        let length = self.normal.length();
        self.normal /= length;
        self.d /= length;
    }
}

/// Six-plane view frustum extracted from a combined view-projection matrix.
#[derive(Debug, Clone)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn from_view_projection(view_proj: &Mat4) -> Self {
        let m = view_proj.to_cols_array_2d();

        let mut planes = [
            Plane {
                normal: Vec3::new(m[0][3] + m[0][0], m[1][3] + m[1][0], m[2][3] + m[2][0]),
                d: m[3][3] + m[3][0],
            }, // left
            Plane {
                normal: Vec3::new(m[0][3] - m[0][0], m[1][3] - m[1][0], m[2][3] - m[2][0]),
                d: m[3][3] - m[3][0],
            }, // right
            Plane {
                normal: Vec3::new(m[0][3] + m[0][1], m[1][3] + m[1][1], m[2][3] + m[2][1]),
                d: m[3][3] + m[3][1],
            }, // bottom
            Plane {
                normal: Vec3::new(m[0][3] - m[0][1], m[1][3] - m[1][1], m[2][3] - m[2][1]),
                d: m[3][3] - m[3][1],
            }, // top
            Plane {
                normal: Vec3::new(m[0][3] + m[0][2], m[1][3] + m[1][2], m[2][3] + m[2][2]),
                d: m[3][3] + m[3][2],
            }, // near
            Plane {
                normal: Vec3::new(m[0][3] - m[0][2], m[1][3] - m[1][2], m[2][3] - m[2][2]),
                d: m[3][3] - m[3][2],
            }, // far
        ];

        for plane in &mut planes {
            plane.normalize();
        }

        Self { planes }
    }

    /// Positive-vertex test: for each plane, take the AABB corner farthest
    /// along the plane's normal. If that corner is still behind the plane,
    /// the whole box is outside. Conservative: may return true for boxes
    /// that only clip a silhouette corner.
    pub fn intersects_aabb_i32(&self, aabb: &AabbI32) -> bool {
        let min = aabb.min.as_vec3();
        let max = aabb.max.as_vec3();
        self.intersects_aabb(min, max)
    }

    pub fn intersects_aabb(&self, min: Vec3, max: Vec3) -> bool {
        for plane in &self.planes {
            let mut positive = min;
            if plane.normal.x >= 0.0 {
                positive.x = max.x;
            }
            if plane.normal.y >= 0.0 {
                positive.y = max.y;
            }
            if plane.normal.z >= 0.0 {
                positive.z = max.z;
            }

            if plane.normal.dot(positive) + plane.d < 0.0 {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DrawEntry {
    pub chunk_slot: usize,
    pub dist2: f32,
}

/// Per-frame ordered sequence of chunk handles, front-to-back by squared
/// distance from the camera.
#[derive(Debug, Clone)]
pub struct DrawList {
    pub entries: Vec<DrawEntry>,
    capacity: usize,
}

impl DrawList {
    /// Bytes a draw list of `capacity` entries needs from a [`BufferArena`].
    pub fn bytes_for(capacity: usize) -> usize {
        capacity * std::mem::size_of::<DrawEntry>() + std::mem::align_of::<DrawEntry>()
    }

    /// Authorizes `capacity` entries from `arena` and builds an empty list.
    pub fn new_in(arena: &mut BufferArena, capacity: usize) -> Result<Self, ArenaError> {
        arena.take_typed::<DrawEntry>(capacity)?;
        Ok(Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// Refills this list in place from `visible_slots`, sorted front-to-back
    /// by squared distance from `camera_position`, capped at `self.capacity`.
    pub fn rebuild(
        &mut self,
        visible_slots: Vec<usize>,
        camera_position: Vec3,
        chunk_center: impl Fn(usize) -> Vec3,
    ) {
        self.entries.clear();
        self.entries.extend(visible_slots.into_iter().take(self.capacity).map(|slot| DrawEntry {
            chunk_slot: slot,
            dist2: chunk_center(slot).distance_squared(camera_position),
        }));

        self.entries.sort_by(|a, b| a.dist2.partial_cmp(&b.dist2).unwrap());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    #[test]
    fn frustum_excludes_box_entirely_behind_a_plane() {
        // Looking down -Z from the origin with a narrow vertical FOV.
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(0.5, 1.0, 0.1, 100.0);
        let frustum = Frustum::from_view_projection(&(proj * view));

        let far_box = AabbI32 {
            min: IVec3::new(-1, 200, -1),
            max: IVec3::new(1, 202, 1),
        };
        assert!(!frustum.intersects_aabb_i32(&far_box));
    }

    #[test]
    fn draw_list_is_sorted_by_distance_ascending() {
        let centers = [Vec3::new(10.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0)];
        let mut arena = BufferArena::alloc(DrawList::bytes_for(100));
        let mut list = DrawList::new_in(&mut arena, 100).unwrap();
        list.rebuild(vec![0, 1, 2], Vec3::ZERO, |i| centers[i]);
        let dists: Vec<f32> = list.entries.iter().map(|e| e.dist2).collect();
        assert!(dists.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(list.entries[0].chunk_slot, 1);
    }
}
