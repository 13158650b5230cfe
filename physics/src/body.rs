//! Rigid body state and creation parameters

use crate::collision::Aabb;
use crate::error::{PhysicsError, PhysicsResult};
use crate::math::rotate;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable handle to a rigid body, valid for the lifetime of its world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl BodyId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a body participates in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Never moves, infinite mass
    Static,
    /// Moved only by its velocity, infinite mass
    Kinematic,
    /// Fully simulated
    Dynamic,
}

impl BodyType {
    /// Decode the numeric body type used by the C ABI
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(BodyType::Static),
            1 => Some(BodyType::Kinematic),
            2 => Some(BodyType::Dynamic),
            _ => None,
        }
    }
}

/// Collision shape, expressed in the body's local frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Shape {
    Circle { radius: f32 },
    Box { half_width: f32, half_height: f32 },
}

impl Shape {
    /// Axis-aligned box from full width and height
    pub fn rect(width: f32, height: f32) -> Self {
        Shape::Box {
            half_width: width * 0.5,
            half_height: height * 0.5,
        }
    }

    /// Decode the numeric shape used by the C ABI. Circles take half the
    /// smaller extent as their radius.
    pub fn from_raw(raw: i32, width: f32, height: f32) -> Option<Self> {
        match raw {
            0 => Some(Shape::Circle {
                radius: width.min(height) * 0.5,
            }),
            1 => Some(Shape::rect(width, height)),
            _ => None,
        }
    }

    /// Rotational inertia for a given mass
    pub fn inertia(&self, mass: f32) -> f32 {
        match *self {
            Shape::Circle { radius } => 0.5 * mass * radius * radius,
            Shape::Box {
                half_width,
                half_height,
            } => {
                let w = half_width * 2.0;
                let h = half_height * 2.0;
                mass * (w * w + h * h) / 12.0
            }
        }
    }

    /// Tight world-space bounds at a given pose
    pub fn compute_aabb(&self, pose: &Pose) -> Aabb {
        match *self {
            Shape::Circle { radius } => Aabb::from_center_half_extents(pose.position, Vec2::splat(radius)),
            Shape::Box {
                half_width,
                half_height,
            } => {
                let (sin, cos) = pose.rotation.sin_cos();
                let ex = half_width * cos.abs() + half_height * sin.abs();
                let ey = half_width * sin.abs() + half_height * cos.abs();
                Aabb::from_center_half_extents(pose.position, Vec2::new(ex, ey))
            }
        }
    }

    fn validate(&self) -> PhysicsResult<()> {
        let ok = match *self {
            Shape::Circle { radius } => radius.is_finite() && radius > 0.0,
            Shape::Box {
                half_width,
                half_height,
            } => half_width.is_finite() && half_height.is_finite() && half_width > 0.0 && half_height > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(PhysicsError::InvalidDefinition(format!(
                "shape extents must be positive and finite: {self:?}"
            )))
        }
    }
}

/// Surface response parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub restitution: f32,
    pub friction: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            restitution: 0.2,
            friction: 0.4,
        }
    }
}

impl Material {
    /// Friction and restitution for a touching pair
    pub fn mix(a: &Material, b: &Material) -> Material {
        Material {
            restitution: a.restitution.max(b.restitution),
            friction: (a.friction * b.friction).max(0.0).sqrt(),
        }
    }
}

/// Category and mask bits controlling which bodies may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub category_bits: u32,
    pub mask_bits: u32,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: u32::MAX,
        }
    }
}

impl Filter {
    pub fn new(category_bits: u32, mask_bits: u32) -> Self {
        Self {
            category_bits,
            mask_bits,
        }
    }

    /// Each side's mask must accept the other side's category
    #[inline]
    pub fn should_collide(&self, other: &Filter) -> bool {
        (self.mask_bits & other.category_bits) != 0 && (other.mask_bits & self.category_bits) != 0
    }
}

/// Position and rotation of a body. Laid out as three floats so pose
/// buffers can be copied across the C boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec2,
    pub rotation: f32,
}

impl Pose {
    pub fn new(position: Vec2, rotation: f32) -> Self {
        Self { position, rotation }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }

    /// Local point to world space
    #[inline]
    pub fn transform_point(&self, local: Vec2) -> Vec2 {
        self.position + rotate(local, self.rotation)
    }
}

/// Everything needed to create a body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub shape: Shape,
    pub position: Vec2,
    pub rotation: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub material: Material,
    pub filter: Filter,
    /// Overrides the default unit mass of dynamic bodies
    pub mass: Option<f32>,
    pub gravity_scale: f32,
    /// Sensors count overlaps but produce no contact response
    pub is_sensor: bool,
    /// Fast-moving hint: the broadphase bounds are swept along the velocity
    pub is_bullet: bool,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            shape: Shape::Circle { radius: 1.0 },
            position: Vec2::ZERO,
            rotation: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            material: Material::default(),
            filter: Filter::default(),
            mass: None,
            gravity_scale: 1.0,
            is_sensor: false,
            is_bullet: false,
        }
    }
}

impl BodyDef {
    pub fn new(body_type: BodyType, shape: Shape) -> Self {
        Self {
            body_type,
            shape,
            ..Default::default()
        }
    }

    pub fn dynamic(shape: Shape) -> Self {
        Self::new(BodyType::Dynamic, shape)
    }

    pub fn fixed(shape: Shape) -> Self {
        Self::new(BodyType::Static, shape)
    }

    pub fn kinematic(shape: Shape) -> Self {
        Self::new(BodyType::Kinematic, shape)
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_velocity(mut self, linear: Vec2, angular: f32) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn with_gravity_scale(mut self, gravity_scale: f32) -> Self {
        self.gravity_scale = gravity_scale;
        self
    }

    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    pub fn bullet(mut self) -> Self {
        self.is_bullet = true;
        self
    }

    pub(crate) fn validate(&self) -> PhysicsResult<()> {
        self.shape.validate()?;
        if !self.position.is_finite() || !self.rotation.is_finite() {
            return Err(PhysicsError::InvalidDefinition("pose must be finite".into()));
        }
        if !self.linear_velocity.is_finite() || !self.angular_velocity.is_finite() {
            return Err(PhysicsError::InvalidDefinition("velocity must be finite".into()));
        }
        if let Some(mass) = self.mass {
            if !(mass > 0.0) || !mass.is_finite() {
                return Err(PhysicsError::InvalidDefinition(format!(
                    "mass must be positive, got {mass}"
                )));
            }
        }
        Ok(())
    }
}

/// A simulated rigid body
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) id: BodyId,
    pub(crate) body_type: BodyType,
    pub(crate) shape: Shape,
    pub(crate) pose: Pose,
    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,
    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,
    pub(crate) material: Material,
    pub(crate) filter: Filter,
    pub(crate) gravity_scale: f32,
    pub(crate) is_sensor: bool,
    pub(crate) is_bullet: bool,
    pub(crate) sleep_time: f32,
    pub(crate) awake: bool,
    /// Fattened bounds currently stored in the broadphase
    pub(crate) aabb: Aabb,
    pub(crate) proxy: Option<usize>,
    pub(crate) collision_count: u32,
    pub(crate) last_finite_pose: Pose,
    pub(crate) diverged: bool,
}

impl Body {
    pub(crate) fn from_def(id: BodyId, def: &BodyDef) -> Self {
        let pose = Pose::new(def.position, def.rotation);
        let mut body = Self {
            id,
            body_type: def.body_type,
            shape: def.shape,
            pose,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            force: Vec2::ZERO,
            torque: 0.0,
            mass: 0.0,
            inv_mass: 0.0,
            inertia: 0.0,
            inv_inertia: 0.0,
            material: def.material,
            filter: def.filter,
            gravity_scale: def.gravity_scale,
            is_sensor: def.is_sensor,
            is_bullet: def.is_bullet,
            sleep_time: 0.0,
            awake: true,
            aabb: def.shape.compute_aabb(&pose),
            proxy: None,
            collision_count: 0,
            last_finite_pose: pose,
            diverged: false,
        };
        body.set_mass(def.mass.unwrap_or(1.0));
        if body.body_type != BodyType::Static {
            body.linear_velocity = def.linear_velocity;
            body.angular_velocity = def.angular_velocity;
        }
        body
    }

    /// Recompute mass properties. Only dynamic bodies carry finite mass.
    pub(crate) fn set_mass(&mut self, mass: f32) {
        if self.body_type == BodyType::Dynamic {
            self.mass = mass;
            self.inv_mass = 1.0 / mass;
            self.inertia = self.shape.inertia(mass);
            self.inv_inertia = if self.inertia > 0.0 { 1.0 / self.inertia } else { 0.0 };
        } else {
            self.mass = 0.0;
            self.inv_mass = 0.0;
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }
    }

    pub(crate) fn wake(&mut self) {
        if self.body_type != BodyType::Static {
            self.awake = true;
            self.sleep_time = 0.0;
        }
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn position(&self) -> Vec2 {
        self.pose.position
    }

    pub fn rotation(&self) -> f32 {
        self.pose.rotation
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn is_bullet(&self) -> bool {
        self.is_bullet
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    /// Collisions touched during the last step
    pub fn collision_count(&self) -> u32 {
        self.collision_count
    }

    /// Whether the last step had to reset this body after a non-finite update
    pub fn has_diverged(&self) -> bool {
        self.diverged
    }

    /// Velocity of a world point attached to this body
    #[inline]
    pub fn velocity_at(&self, world_point: Vec2) -> Vec2 {
        let r = world_point - self.pose.position;
        self.linear_velocity + r.perp() * self.angular_velocity
    }

    /// Tight bounds handed to the broadphase, swept along the velocity for bullets
    pub(crate) fn broadphase_aabb(&self, dt: f32) -> Aabb {
        let aabb = self.shape.compute_aabb(&self.pose);
        if self.is_bullet && dt > 0.0 && self.linear_velocity.is_finite() {
            aabb.union(&aabb.translated(self.linear_velocity * dt))
        } else {
            aabb
        }
    }
}

/// Borrow two distinct bodies mutably
pub(crate) fn pair_mut(bodies: &mut [Body], a: usize, b: usize) -> (&mut Body, &mut Body) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = bodies.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = bodies.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}
