//! Small 2D helpers on top of glam

use glam::{Mat2, Mat3, Vec2, Vec3};

/// Rotate a vector by an angle in radians
#[inline]
pub fn rotate(v: Vec2, angle: f32) -> Vec2 {
    Vec2::from_angle(angle).rotate(v)
}

/// Rotate a vector by the inverse of an angle
#[inline]
pub fn inv_rotate(v: Vec2, angle: f32) -> Vec2 {
    Vec2::from_angle(-angle).rotate(v)
}

/// 2D cross product of two vectors (scalar z component)
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b)
}

/// Cross product of a scalar (angular velocity) with a vector: `w x r`
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    v.perp() * s
}

/// Solve `k * x = b` for a 2x2 system, returning zero when singular
pub fn solve2(k: Mat2, b: Vec2) -> Vec2 {
    let det = k.determinant();
    if det == 0.0 || !det.is_finite() {
        return Vec2::ZERO;
    }
    k.inverse() * b
}

/// Solve `k * x = b` for a 3x3 system, returning zero when singular
pub fn solve3(k: Mat3, b: Vec3) -> Vec3 {
    let det = k.determinant();
    if det == 0.0 || !det.is_finite() {
        return Vec3::ZERO;
    }
    k.inverse() * b
}

/// Normalize, falling back to `fallback` when the vector is degenerate
#[inline]
pub fn normalize_or(v: Vec2, fallback: Vec2) -> Vec2 {
    let len_sq = v.length_squared();
    if len_sq > 1e-12 && len_sq.is_finite() {
        v / len_sq.sqrt()
    } else {
        fallback
    }
}

/// Signed area of a closed polygon using the shoelace formula
pub fn polygon_area<I>(points: I) -> f32
where
    I: IntoIterator<Item = Vec2>,
    I::IntoIter: Clone,
{
    let iter = points.into_iter();
    let first = iter.clone().next();
    let mut sum = 0.0;
    let mut prev: Option<Vec2> = None;
    for p in iter {
        if let Some(q) = prev {
            sum += cross(q, p);
        }
        prev = Some(p);
    }
    if let (Some(last), Some(first)) = (prev, first) {
        sum += cross(last, first);
    }
    sum * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_quarter_turn() {
        let v = rotate(Vec2::X, std::f32::consts::FRAC_PI_2);
        assert!((v - Vec2::Y).length() < 1e-6);
        let back = inv_rotate(v, std::f32::consts::FRAC_PI_2);
        assert!((back - Vec2::X).length() < 1e-6);
    }

    #[test]
    fn test_cross_helpers() {
        assert_eq!(cross(Vec2::X, Vec2::Y), 1.0);
        // w x r for w = 1 and r = +X points along +Y
        assert!((cross_sv(1.0, Vec2::X) - Vec2::Y).length() < 1e-6);
    }

    #[test]
    fn test_solve2_singular_is_zero() {
        let k = Mat2::from_cols(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(solve2(k, Vec2::ONE), Vec2::ZERO);

        let k = Mat2::from_cols(Vec2::new(2.0, 0.0), Vec2::new(0.0, 4.0));
        assert!((solve2(k, Vec2::new(2.0, 4.0)) - Vec2::ONE).length() < 1e-6);
    }

    #[test]
    fn test_polygon_area_square() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        assert!((polygon_area(square) - 4.0).abs() < 1e-6);
        let reversed = [square[3], square[2], square[1], square[0]];
        assert!((polygon_area(reversed) + 4.0).abs() < 1e-6);
    }
}
