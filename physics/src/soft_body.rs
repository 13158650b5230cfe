//! Pressure-based soft bodies: a closed ring of Verlet points held together
//! by distance springs and an internal pressure that pushes toward the
//! area the ring had when it was created.

use crate::body::{Body, Shape};
use crate::collision::Aabb;
use crate::config::SoftBodyConfig;
use crate::error::{PhysicsError, PhysicsResult};
use crate::math::{inv_rotate, polygon_area, rotate};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{trace, warn};

/// Interior spokes are this much softer than the perimeter
const SPOKE_STIFFNESS_SCALE: f32 = 0.1;
const MIN_SPRING_LENGTH: f32 = 1e-4;

/// Stable handle to a soft body
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SoftBodyId(pub u32);

impl SoftBodyId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SoftBodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creation parameters, also used by scene files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftBodyDef {
    pub points: Vec<Vec2>,
    pub pressure: f32,
    pub stiffness: f32,
}

impl SoftBodyDef {
    pub fn new(points: Vec<Vec2>, pressure: f32, stiffness: f32) -> Self {
        Self {
            points,
            pressure,
            stiffness,
        }
    }

    /// Split coordinate arrays, as handed over by the C ABI
    pub fn from_coords(xs: &[f32], ys: &[f32], pressure: f32, stiffness: f32) -> PhysicsResult<Self> {
        if xs.len() != ys.len() {
            return Err(PhysicsError::InvalidDefinition(format!(
                "soft body coordinate arrays differ in length ({} vs {})",
                xs.len(),
                ys.len()
            )));
        }
        let points = xs.iter().zip(ys).map(|(&x, &y)| Vec2::new(x, y)).collect();
        Ok(Self::new(points, pressure, stiffness))
    }

    /// Regular polygon ring, handy for tests and demos
    pub fn ring(center: Vec2, radius: f32, count: usize, pressure: f32, stiffness: f32) -> Self {
        let points = (0..count)
            .map(|i| {
                let angle = std::f32::consts::TAU * i as f32 / count as f32;
                center + Vec2::from_angle(angle) * radius
            })
            .collect();
        Self::new(points, pressure, stiffness)
    }

    pub(crate) fn validate(&self) -> PhysicsResult<()> {
        if self.points.len() < 3 {
            return Err(PhysicsError::InvalidDefinition(format!(
                "soft body needs at least 3 points, got {}",
                self.points.len()
            )));
        }
        if self.points.iter().any(|p| !p.is_finite()) {
            return Err(PhysicsError::InvalidDefinition("soft body points must be finite".into()));
        }
        if !self.pressure.is_finite() || self.pressure < 0.0 {
            return Err(PhysicsError::InvalidDefinition(format!(
                "soft body pressure must be >= 0, got {}",
                self.pressure
            )));
        }
        if !(self.stiffness > 0.0 && self.stiffness <= 1.0) {
            return Err(PhysicsError::InvalidDefinition(format!(
                "soft body stiffness must be in (0, 1], got {}",
                self.stiffness
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftPoint {
    pub position: Vec2,
    pub(crate) previous: Vec2,
    /// Zero for pinned points
    pub(crate) inv_mass: f32,
}

impl SoftPoint {
    fn new(position: Vec2) -> Self {
        Self {
            position,
            previous: position,
            inv_mass: 1.0,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.inv_mass == 0.0
    }

    /// Displacement over the last step
    pub fn velocity(&self) -> Vec2 {
        self.position - self.previous
    }
}

#[derive(Debug, Clone, Copy)]
struct Spring {
    a: usize,
    b: usize,
    rest_length: f32,
    stiffness: f32,
}

#[derive(Debug, Clone)]
pub struct SoftBody {
    id: SoftBodyId,
    points: Vec<SoftPoint>,
    springs: Vec<Spring>,
    target_area: f32,
    pressure: f32,
    /// +1 for counter-clockwise rings, -1 for clockwise
    winding: f32,
    /// Positions at the end of the last finite step
    last_finite: Vec<Vec2>,
    diverged: bool,
}

impl SoftBody {
    pub(crate) fn new(id: SoftBodyId, def: &SoftBodyDef) -> PhysicsResult<Self> {
        def.validate()?;
        let n = def.points.len();
        let points: Vec<SoftPoint> = def.points.iter().copied().map(SoftPoint::new).collect();

        let mut springs = Vec::with_capacity(n + n / 2);
        let spring = |a: usize, b: usize, stiffness: f32| Spring {
            a,
            b,
            rest_length: def.points[a].distance(def.points[b]),
            stiffness,
        };
        for i in 0..n {
            springs.push(spring(i, (i + 1) % n, def.stiffness));
        }
        for i in 0..n / 2 {
            springs.push(spring(i, (i + n / 2) % n, def.stiffness * SPOKE_STIFFNESS_SCALE));
        }

        let signed_area = polygon_area(def.points.iter().copied());
        Ok(Self {
            id,
            points,
            springs,
            target_area: signed_area.abs(),
            pressure: def.pressure,
            winding: if signed_area < 0.0 { -1.0 } else { 1.0 },
            last_finite: def.points.clone(),
            diverged: false,
        })
    }

    pub fn id(&self) -> SoftBodyId {
        self.id
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn point(&self, index: usize) -> Option<Vec2> {
        self.points.get(index).map(|p| p.position)
    }

    pub fn points(&self) -> &[SoftPoint] {
        &self.points
    }

    pub fn positions(&self) -> Vec<Vec2> {
        self.points.iter().map(|p| p.position).collect()
    }

    /// Current enclosed area
    pub fn area(&self) -> f32 {
        polygon_area(self.points.iter().map(|p| p.position)).abs()
    }

    pub fn target_area(&self) -> f32 {
        self.target_area
    }

    pub fn pressure(&self) -> f32 {
        self.pressure
    }

    /// True when the last step went non-finite and the ring was restored
    pub fn has_diverged(&self) -> bool {
        self.diverged
    }

    /// Teleport a point and drop its Verlet velocity. Callers reject
    /// non-finite positions first.
    pub(crate) fn set_point(&mut self, index: usize, position: Vec2) -> bool {
        match self.points.get_mut(index) {
            Some(p) => {
                p.position = position;
                p.previous = position;
                self.last_finite[index] = position;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_pinned(&mut self, index: usize, pinned: bool) -> bool {
        match self.points.get_mut(index) {
            Some(p) => {
                p.inv_mass = if pinned { 0.0 } else { 1.0 };
                p.previous = p.position;
                true
            }
            None => false,
        }
    }

    fn bounds(&self) -> Aabb {
        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        for p in &self.points {
            min = min.min(p.position);
            max = max.max(p.position);
        }
        Aabb::new(min, max)
    }

    /// Advance one step against the rigid bodies as they were at the start
    /// of the world step
    pub(crate) fn step(&mut self, dt: f32, gravity: Vec2, bodies: &[Body], config: &SoftBodyConfig) {
        self.integrate(dt, gravity, config.damping);
        for _ in 0..config.iterations {
            self.relax_springs();
        }
        self.apply_pressure(config.pressure_scale);
        self.collide_rigid(bodies, config);
        if self.recover_non_finite() {
            return;
        }
        self.clamp_to_bounds(config.bounds);
        for (last, p) in self.last_finite.iter_mut().zip(&self.points) {
            *last = p.position;
        }
    }

    /// Put every point back where the last finite step left it, at rest.
    /// Clamping would turn NaN into a corner of the bounds instead.
    fn recover_non_finite(&mut self) -> bool {
        self.diverged = self
            .points
            .iter()
            .any(|p| !p.position.is_finite() || !p.previous.is_finite());
        if self.diverged {
            warn!(soft_body = %self.id, "Soft body state became non-finite, restoring last finite ring");
            for (p, &last) in self.points.iter_mut().zip(&self.last_finite) {
                p.position = last;
                p.previous = last;
            }
        }
        self.diverged
    }

    fn integrate(&mut self, dt: f32, gravity: Vec2, damping: f32) {
        let accel = gravity * dt * dt;
        for p in self.points.iter_mut().filter(|p| !p.is_pinned()) {
            let velocity = (p.position - p.previous) * damping;
            p.previous = p.position;
            p.position += velocity + accel;
        }
    }

    fn relax_springs(&mut self) {
        for spring in &self.springs {
            let (p1, p2) = (self.points[spring.a], self.points[spring.b]);
            let w = p1.inv_mass + p2.inv_mass;
            if w == 0.0 {
                continue;
            }
            let delta = p2.position - p1.position;
            let dist = delta.length();
            if dist < MIN_SPRING_LENGTH {
                continue;
            }
            let correction = delta * ((dist - spring.rest_length) / dist) * spring.stiffness;
            self.points[spring.a].position += correction * (p1.inv_mass / w);
            self.points[spring.b].position -= correction * (p2.inv_mass / w);
        }
    }

    fn apply_pressure(&mut self, pressure_scale: f32) {
        let n = self.points.len();
        let push = (self.target_area - self.area()) * self.pressure * pressure_scale;
        if push == 0.0 {
            return;
        }
        // Normals from the pre-pressure ring so every point sees the same shape
        let snapshot: Vec<Vec2> = self.positions();
        for (i, p) in self.points.iter_mut().enumerate() {
            if p.is_pinned() {
                continue;
            }
            let tangent = snapshot[(i + 1) % n] - snapshot[(i + n - 1) % n];
            let normal = Vec2::new(tangent.y, -tangent.x) * self.winding;
            let len = normal.length();
            if len > MIN_SPRING_LENGTH {
                p.position += normal / len * push;
            }
        }
    }

    fn collide_rigid(&mut self, bodies: &[Body], config: &SoftBodyConfig) {
        let radius = config.point_radius;
        let ring = self.bounds().fattened(radius);
        for body in bodies.iter().filter(|b| !b.is_sensor) {
            if !body.shape.compute_aabb(&body.pose).overlaps(&ring) {
                continue;
            }
            for (index, p) in self.points.iter_mut().enumerate() {
                if p.is_pinned() {
                    continue;
                }
                let Some((normal, depth)) = point_push_out(p.position, body, radius) else {
                    continue;
                };
                trace!(soft_body = %self.id, point = index, body = %body.id, depth, "soft point contact");
                p.position += normal * depth;
                p.previous = p.position - (p.position - p.previous) * config.collision_damping;
            }
        }
    }

    fn clamp_to_bounds(&mut self, bounds: f32) {
        let limit = Vec2::splat(bounds);
        for p in &mut self.points {
            p.position = p.position.clamp(-limit, limit);
            p.previous = p.previous.clamp(-limit, limit);
        }
    }
}

/// Direction and depth that moves a point of `radius` out of a rigid shape
fn point_push_out(point: Vec2, body: &Body, radius: f32) -> Option<(Vec2, f32)> {
    match body.shape {
        Shape::Circle { radius: r } => {
            let delta = point - body.pose.position;
            let reach = r + radius;
            let dist_sq = delta.length_squared();
            if dist_sq >= reach * reach {
                return None;
            }
            let dist = dist_sq.sqrt();
            let normal = if dist > MIN_SPRING_LENGTH { delta / dist } else { Vec2::Y };
            Some((normal, reach - dist))
        }
        Shape::Box {
            half_width,
            half_height,
        } => {
            let local = inv_rotate(point - body.pose.position, body.pose.rotation);
            let hx = half_width + radius;
            let hy = half_height + radius;
            if local.x <= -hx || local.x >= hx || local.y <= -hy || local.y >= hy {
                return None;
            }
            let faces = [
                (local.x + hx, Vec2::NEG_X),
                (hx - local.x, Vec2::X),
                (local.y + hy, Vec2::NEG_Y),
                (hy - local.y, Vec2::Y),
            ];
            let (depth, normal) = faces
                .into_iter()
                .fold((f32::MAX, Vec2::Y), |best, (d, n)| if d < best.0 { (d, n) } else { best });
            Some((rotate(normal, body.pose.rotation), depth))
        }
    }
}
