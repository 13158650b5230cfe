//! Narrow phase collision detection for generating contact manifolds

use super::Manifold;
use crate::body::{Body, Pose, Shape};
use crate::math::{inv_rotate, normalize_or, rotate};
use glam::Vec2;
use tracing::trace;

/// Separation difference needed before the second box becomes the reference
const REFERENCE_FACE_TOLERANCE: f32 = 0.05;

/// Filter-checked shape test between two bodies. Pairs whose
/// category/mask bits reject each other never reach the shape tests.
pub fn collide_bodies(a: &Body, b: &Body) -> Option<Manifold> {
    if !a.filter.should_collide(&b.filter) {
        return None;
    }
    collide(&a.shape, &a.pose, &b.shape, &b.pose)
}

/// Test two shapes and build a manifold whose normal points from A to B
pub fn collide(shape_a: &Shape, pose_a: &Pose, shape_b: &Shape, pose_b: &Pose) -> Option<Manifold> {
    let manifold = match (*shape_a, *shape_b) {
        (Shape::Circle { radius: ra }, Shape::Circle { radius: rb }) => {
            circle_circle(pose_a.position, ra, pose_b.position, rb)
        }
        (
            Shape::Circle { radius },
            Shape::Box {
                half_width,
                half_height,
            },
        ) => circle_box(pose_a.position, radius, pose_b, Vec2::new(half_width, half_height)),
        (
            Shape::Box {
                half_width,
                half_height,
            },
            Shape::Circle { radius },
        ) => circle_box(pose_b.position, radius, pose_a, Vec2::new(half_width, half_height))
            .map(Manifold::flipped),
        (
            Shape::Box {
                half_width: wa,
                half_height: ha,
            },
            Shape::Box {
                half_width: wb,
                half_height: hb,
            },
        ) => box_box(pose_a, Vec2::new(wa, ha), pose_b, Vec2::new(wb, hb)),
    };

    if let Some(m) = &manifold {
        trace!(
            normal = ?m.normal,
            penetration = m.penetration,
            points = m.points().len(),
            "narrow phase hit"
        );
    }
    manifold
}

/// Two circles; coincident centres resolve along +Y. Touching is not overlapping.
fn circle_circle(pos_a: Vec2, radius_a: f32, pos_b: Vec2, radius_b: f32) -> Option<Manifold> {
    let delta = pos_b - pos_a;
    let distance_sq = delta.length_squared();
    let radius_sum = radius_a + radius_b;

    if distance_sq >= radius_sum * radius_sum {
        return None;
    }

    let distance = distance_sq.sqrt();
    let normal = if distance > f32::EPSILON {
        delta / distance
    } else {
        Vec2::Y
    };

    let penetration = radius_sum - distance;
    let mut manifold = Manifold::new(normal);
    manifold.push(pos_a + normal * (radius_a - penetration * 0.5), penetration);
    Some(manifold)
}

/// Circle (A) against an oriented box (B)
fn circle_box(circle_pos: Vec2, radius: f32, box_pose: &Pose, half: Vec2) -> Option<Manifold> {
    // Transform circle to the box's local frame
    let local = inv_rotate(circle_pos - box_pose.position, box_pose.rotation);
    let closest = local.clamp(-half, half);
    let delta = local - closest;
    let distance_sq = delta.length_squared();

    let (local_normal, penetration, local_surface) = if distance_sq > f32::EPSILON {
        if distance_sq >= radius * radius {
            return None;
        }
        let distance = distance_sq.sqrt();
        (delta / distance, radius - distance, closest)
    } else {
        // Centre inside the box: push out through the nearest face
        let dx = half.x - local.x.abs();
        let dy = half.y - local.y.abs();
        if dx < dy {
            let sign = if local.x < 0.0 { -1.0 } else { 1.0 };
            (
                Vec2::new(sign, 0.0),
                radius + dx,
                Vec2::new(sign * half.x, local.y),
            )
        } else {
            let sign = if local.y < 0.0 { -1.0 } else { 1.0 };
            (
                Vec2::new(0.0, sign),
                radius + dy,
                Vec2::new(local.x, sign * half.y),
            )
        }
    };

    // Box face normal points toward the circle; the manifold runs circle -> box
    let box_normal = rotate(local_normal, box_pose.rotation);
    let surface = box_pose.transform_point(local_surface);
    let deepest = circle_pos - box_normal * radius;

    let mut manifold = Manifold::new(-box_normal);
    manifold.push((surface + deepest) * 0.5, penetration);
    Some(manifold)
}

/// Local-frame box polygon, counter-clockwise. Edge `i` runs from vertex
/// `i` to vertex `i + 1` and has outward normal `i`.
struct BoxPolygon {
    vertices: [Vec2; 4],
    normals: [Vec2; 4],
}

impl BoxPolygon {
    fn new(pose: &Pose, half: Vec2) -> Self {
        let local = [
            Vec2::new(-half.x, -half.y),
            Vec2::new(half.x, -half.y),
            Vec2::new(half.x, half.y),
            Vec2::new(-half.x, half.y),
        ];
        let local_normals = [Vec2::NEG_Y, Vec2::X, Vec2::Y, Vec2::NEG_X];
        Self {
            vertices: local.map(|v| pose.transform_point(v)),
            normals: local_normals.map(|n| rotate(n, pose.rotation)),
        }
    }

    /// Face of `self` with the largest separation from `other`
    fn max_separation(&self, other: &BoxPolygon) -> (usize, f32) {
        let mut best_edge = 0;
        let mut best_separation = f32::MIN;
        for i in 0..4 {
            let n = self.normals[i];
            let v = self.vertices[i];
            let separation = other
                .vertices
                .iter()
                .map(|&w| n.dot(w - v))
                .fold(f32::MAX, f32::min);
            if separation > best_separation {
                best_separation = separation;
                best_edge = i;
            }
        }
        (best_edge, best_separation)
    }

    /// Edge most anti-parallel to a reference normal
    fn incident_edge(&self, reference_normal: Vec2) -> usize {
        let mut edge = 0;
        let mut min_dot = f32::MAX;
        for (i, n) in self.normals.iter().enumerate() {
            let d = reference_normal.dot(*n);
            if d < min_dot {
                min_dot = d;
                edge = i;
            }
        }
        edge
    }
}

/// Keep the part of a segment behind the plane `dot(normal, x) = offset`
fn clip_segment(points: [Vec2; 2], normal: Vec2, offset: f32) -> Option<[Vec2; 2]> {
    let d0 = normal.dot(points[0]) - offset;
    let d1 = normal.dot(points[1]) - offset;

    let mut out = [Vec2::ZERO; 2];
    let mut count = 0;
    if d0 <= 0.0 {
        out[count] = points[0];
        count += 1;
    }
    if d1 <= 0.0 {
        out[count] = points[1];
        count += 1;
    }
    if d0 * d1 < 0.0 && count < 2 {
        let t = d0 / (d0 - d1);
        out[count] = points[0] + (points[1] - points[0]) * t;
        count += 1;
    }
    (count == 2).then_some(out)
}

/// Separating axis test over the four face normals followed by
/// reference/incident face clipping
fn box_box(pose_a: &Pose, half_a: Vec2, pose_b: &Pose, half_b: Vec2) -> Option<Manifold> {
    let poly_a = BoxPolygon::new(pose_a, half_a);
    let poly_b = BoxPolygon::new(pose_b, half_b);

    let (edge_a, separation_a) = poly_a.max_separation(&poly_b);
    if separation_a >= 0.0 {
        return None;
    }
    let (edge_b, separation_b) = poly_b.max_separation(&poly_a);
    if separation_b >= 0.0 {
        return None;
    }

    let (reference, incident, edge, flip) = if separation_b > separation_a + REFERENCE_FACE_TOLERANCE {
        (&poly_b, &poly_a, edge_b, true)
    } else {
        (&poly_a, &poly_b, edge_a, false)
    };

    let normal = reference.normals[edge];
    let v1 = reference.vertices[edge];
    let v2 = reference.vertices[(edge + 1) % 4];
    let tangent = normalize_or(v2 - v1, normal.perp());

    let incident_index = incident.incident_edge(normal);
    let incident_points = [
        incident.vertices[incident_index],
        incident.vertices[(incident_index + 1) % 4],
    ];

    let front_offset = normal.dot(v1);
    let side_offset_1 = -tangent.dot(v1);
    let side_offset_2 = tangent.dot(v2);

    let manifold_normal = if flip { -normal } else { normal };
    let mut manifold = Manifold::new(manifold_normal);

    let clipped = clip_segment(incident_points, -tangent, side_offset_1)
        .and_then(|points| clip_segment(points, tangent, side_offset_2));

    if let Some(points) = clipped {
        for p in points {
            let separation = normal.dot(p) - front_offset;
            if separation <= 0.0 {
                // Midpoint between the incident point and the reference face
                manifold.push(p - normal * (separation * 0.5), -separation);
            }
        }
    }

    if manifold.is_empty() {
        // Deepest incident vertex
        let (deepest, separation) = incident
            .vertices
            .iter()
            .map(|&p| (p, normal.dot(p) - front_offset))
            .fold((incident.vertices[0], f32::MAX), |best, cur| if cur.1 < best.1 { cur } else { best });
        manifold.push(deepest - normal * (separation * 0.5), (-separation).max(0.0));
    }

    Some(manifold)
}
