//! Collision detection subsystem

pub mod broad_phase;
pub mod dynamic_tree;
pub mod narrow_phase;
pub mod spatial_grid;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Most points a 2D manifold can carry
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// A single contact point produced by the narrow phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifoldPoint {
    /// World space contact point
    pub point: Vec2,
    /// Penetration at this point, positive when overlapping
    pub penetration: f32,
}

/// Contact information between two colliding shapes
#[derive(Debug, Clone, PartialEq)]
pub struct Manifold {
    /// Unit normal pointing from A to B
    pub normal: Vec2,
    /// Deepest penetration over all points
    pub penetration: f32,
    points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    point_count: usize,
}

impl Manifold {
    pub fn new(normal: Vec2) -> Self {
        Self {
            normal,
            penetration: 0.0,
            points: [ManifoldPoint {
                point: Vec2::ZERO,
                penetration: 0.0,
            }; MAX_MANIFOLD_POINTS],
            point_count: 0,
        }
    }

    /// Add a point, ignoring anything past the manifold capacity
    pub fn push(&mut self, point: Vec2, penetration: f32) {
        if self.point_count < MAX_MANIFOLD_POINTS {
            self.points[self.point_count] = ManifoldPoint { point, penetration };
            if self.point_count == 0 || penetration > self.penetration {
                self.penetration = penetration;
            }
            self.point_count += 1;
        }
    }

    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Swap A and B
    pub fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        self
    }
}

/// Axis-aligned bounding box for broad phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Create an AABB from a center point and half-extents
    pub fn from_center_half_extents(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Check if this AABB overlaps with another
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Whether `other` lies fully inside this box
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Merge two AABBs
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Surface measure used by the tree's insertion cost (2D perimeter)
    pub fn perimeter(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x + d.y)
    }

    pub fn fattened(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec2::splat(margin),
            max: self.max + Vec2::splat(margin),
        }
    }

    pub fn translated(&self, offset: Vec2) -> Aabb {
        Aabb {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Segment test against the box, used to prune ray casts
    pub fn intersects_segment(&self, from: Vec2, to: Vec2) -> bool {
        let d = to - from;
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;
        for axis in 0..2 {
            let (o, dir, lo, hi) = (from[axis], d[axis], self.min[axis], self.max[axis]);
            if dir.abs() < 1e-12 {
                if o < lo || o > hi {
                    return false;
                }
            } else {
                let inv = 1.0 / dir;
                let mut t1 = (lo - o) * inv;
                let mut t2 = (hi - o) * inv;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_overlap() {
        let aabb1 = Aabb::new(Vec2::ZERO, Vec2::ONE);
        let aabb2 = Aabb::new(Vec2::splat(0.5), Vec2::splat(1.5));
        let aabb3 = Aabb::new(Vec2::splat(2.0), Vec2::splat(3.0));

        assert!(aabb1.overlaps(&aabb2));
        assert!(aabb2.overlaps(&aabb1));
        assert!(!aabb1.overlaps(&aabb3));
        assert!(!aabb3.overlaps(&aabb1));
    }

    #[test]
    fn test_aabb_union_and_contains() {
        let a = Aabb::new(Vec2::ZERO, Vec2::ONE);
        let b = Aabb::new(Vec2::splat(2.0), Vec2::splat(3.0));
        let merged = a.union(&b);
        assert!(merged.contains(&a));
        assert!(merged.contains(&b));
        assert_eq!(merged.perimeter(), 12.0);
        assert!(a.fattened(0.5).contains(&a));
    }

    #[test]
    fn test_segment_pruning() {
        let aabb = Aabb::new(Vec2::splat(-1.0), Vec2::splat(1.0));
        assert!(aabb.intersects_segment(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)));
        assert!(!aabb.intersects_segment(Vec2::new(-5.0, 3.0), Vec2::new(5.0, 3.0)));
        assert!(!aabb.intersects_segment(Vec2::new(-5.0, 0.0), Vec2::new(-3.0, 0.0)));
    }

    #[test]
    fn test_manifold_tracks_deepest_point() {
        let mut m = Manifold::new(Vec2::Y);
        m.push(Vec2::ZERO, 0.5);
        m.push(Vec2::X, 1.5);
        m.push(Vec2::ONE, 3.0);
        assert_eq!(m.points().len(), 2);
        assert_eq!(m.penetration, 1.5);
        assert_eq!(m.flipped().normal, -Vec2::Y);
    }
}
