//! Broad phase candidate pair generation

use super::dynamic_tree::DynamicTree;
use super::spatial_grid::SpatialGrid;
use super::Aabb;
use crate::body::Body;
use crate::config::BroadPhaseKind;
use tracing::warn;

/// Spatial structure used to find candidate pairs
#[derive(Debug, Clone)]
pub enum BroadPhase {
    Tree(DynamicTree),
    Grid(SpatialGrid),
}

impl BroadPhase {
    pub fn new(kind: &BroadPhaseKind, capacity: usize) -> Self {
        match *kind {
            BroadPhaseKind::DynamicTree => BroadPhase::Tree(DynamicTree::new(capacity)),
            BroadPhaseKind::SpatialGrid { cell_size, min, max } => {
                BroadPhase::Grid(SpatialGrid::new(cell_size, min, max))
            }
        }
    }

    /// Register a new body and return its fat bounds plus its proxy handle.
    /// Moving bodies in the grid get no persistent proxy.
    pub fn insert(&mut self, body: usize, tight: Aabb, margin: f32, is_static: bool) -> (Aabb, Option<usize>) {
        let fat = tight.fattened(margin);
        match self {
            BroadPhase::Tree(tree) => (fat, Some(tree.create_proxy(fat, body))),
            BroadPhase::Grid(grid) => {
                if is_static {
                    grid.insert_static(body, fat);
                }
                (fat, None)
            }
        }
    }

    /// Refresh the bounds of every non-static body. `tight` holds the tight
    /// bounds per body index, `None` for bodies that should not be refreshed.
    pub fn update(&mut self, bodies: &mut [Body], tight: &[Option<Aabb>], margin: f32) {
        match self {
            BroadPhase::Tree(tree) => {
                for (body, aabb) in bodies.iter_mut().zip(tight) {
                    if let (Some(proxy), Some(aabb)) = (body.proxy, aabb) {
                        tree.move_proxy(proxy, *aabb, margin);
                        body.aabb = tree.fat_aabb(proxy);
                    }
                }
            }
            BroadPhase::Grid(grid) => {
                grid.clear_dynamic();
                for (index, (body, aabb)) in bodies.iter_mut().zip(tight).enumerate() {
                    if body.is_static() {
                        continue;
                    }
                    if let Some(aabb) = aabb {
                        body.aabb = aabb.fattened(margin);
                    }
                    grid.insert_dynamic(index, body.aabb);
                }
            }
        }
    }

    /// Re-register a body after its pose was set directly
    pub fn teleport(&mut self, body_index: usize, body: &mut Body, margin: f32) {
        let tight = body.broadphase_aabb(0.0);
        match self {
            BroadPhase::Tree(tree) => {
                if let Some(proxy) = body.proxy {
                    tree.move_proxy(proxy, tight, margin);
                    body.aabb = tree.fat_aabb(proxy);
                }
            }
            BroadPhase::Grid(grid) => {
                body.aabb = tight.fattened(margin);
                if body.is_static() {
                    grid.remove_static(body_index);
                    grid.insert_static(body_index, body.aabb);
                }
            }
        }
    }

    /// Sorted, deduplicated candidate pairs `(min, max)` capped at
    /// `max_pairs`. Returns the number of pairs dropped by the cap.
    pub fn collect_pairs(&self, bodies: &[Body], max_pairs: usize, out: &mut Vec<(usize, usize)>) -> usize {
        out.clear();
        match self {
            BroadPhase::Tree(tree) => {
                for (index, body) in bodies.iter().enumerate() {
                    if body.is_static() {
                        continue;
                    }
                    tree.query(&body.aabb, |other| {
                        if other != index {
                            out.push((index.min(other), index.max(other)));
                        }
                        true
                    });
                }
            }
            BroadPhase::Grid(grid) => grid.collect_pairs(out),
        }

        out.sort_unstable();
        out.dedup();

        let dropped = out.len().saturating_sub(max_pairs);
        if dropped > 0 {
            warn!(dropped, max_pairs, "Broadphase pair capacity exceeded, dropping pairs");
            out.truncate(max_pairs);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyDef, BodyId, Shape};
    use glam::Vec2;

    fn make_bodies() -> Vec<Body> {
        let defs = [
            BodyDef::fixed(Shape::rect(400.0, 20.0)).with_position(Vec2::new(0.0, -10.0)),
            BodyDef::fixed(Shape::rect(20.0, 400.0)).with_position(Vec2::new(190.0, 0.0)),
            BodyDef::dynamic(Shape::Circle { radius: 10.0 }).with_position(Vec2::new(0.0, 9.0)),
            BodyDef::dynamic(Shape::rect(20.0, 20.0)).with_position(Vec2::new(15.0, 12.0)),
            BodyDef::dynamic(Shape::Circle { radius: 5.0 }).with_position(Vec2::new(-150.0, 150.0)),
        ];
        defs.iter()
            .enumerate()
            .map(|(i, def)| Body::from_def(BodyId(i as u32), def))
            .collect()
    }

    fn pairs_for(kind: BroadPhaseKind) -> Vec<(usize, usize)> {
        let mut bodies = make_bodies();
        let mut broad_phase = BroadPhase::new(&kind, bodies.len());
        for (index, body) in bodies.iter_mut().enumerate() {
            let (fat, proxy) = broad_phase.insert(index, body.broadphase_aabb(0.0), 2.0, body.is_static());
            body.aabb = fat;
            body.proxy = proxy;
        }
        let tight: Vec<_> = bodies.iter().map(|b| Some(b.broadphase_aabb(0.0))).collect();
        broad_phase.update(&mut bodies, &tight, 2.0);

        let mut pairs = Vec::new();
        broad_phase.collect_pairs(&bodies, 64, &mut pairs);
        pairs
    }

    #[test]
    fn test_tree_and_grid_agree() {
        let tree = pairs_for(BroadPhaseKind::DynamicTree);
        let grid = pairs_for(BroadPhaseKind::SpatialGrid {
            cell_size: 32.0,
            min: Vec2::splat(-256.0),
            max: Vec2::splat(256.0),
        });
        assert_eq!(tree, vec![(0, 2), (0, 3), (2, 3)]);
        assert_eq!(tree, grid);
    }

    #[test]
    fn test_teleported_static_body_moves_in_grid() {
        let mut bodies = make_bodies();
        let mut broad_phase = BroadPhase::new(
            &BroadPhaseKind::SpatialGrid {
                cell_size: 32.0,
                min: Vec2::splat(-256.0),
                max: Vec2::splat(256.0),
            },
            bodies.len(),
        );
        for (index, body) in bodies.iter_mut().enumerate() {
            let (fat, proxy) = broad_phase.insert(index, body.broadphase_aabb(0.0), 2.0, body.is_static());
            body.aabb = fat;
            body.proxy = proxy;
        }
        // Slide the wall under the lone circle in the corner
        bodies[1].pose.position = Vec2::new(-150.0, 150.0);
        broad_phase.teleport(1, &mut bodies[1], 2.0);
        let tight: Vec<_> = bodies.iter().map(|b| Some(b.broadphase_aabb(0.0))).collect();
        broad_phase.update(&mut bodies, &tight, 2.0);

        let mut pairs = Vec::new();
        broad_phase.collect_pairs(&bodies, 64, &mut pairs);
        assert!(pairs.contains(&(1, 4)), "{pairs:?}");
    }

    #[test]
    fn test_pair_cap_drops_excess() {
        let mut bodies = make_bodies();
        let mut broad_phase = BroadPhase::new(&BroadPhaseKind::DynamicTree, bodies.len());
        for (index, body) in bodies.iter_mut().enumerate() {
            let (fat, proxy) = broad_phase.insert(index, body.broadphase_aabb(0.0), 2.0, body.is_static());
            body.aabb = fat;
            body.proxy = proxy;
        }
        let mut pairs = Vec::new();
        let dropped = broad_phase.collect_pairs(&bodies, 2, &mut pairs);
        assert_eq!(dropped, 1);
        assert_eq!(pairs, vec![(0, 2), (0, 3)]);
    }
}
