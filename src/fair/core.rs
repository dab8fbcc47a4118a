use std::ops::{Add, Div, Mul, Neg, Sub};

// ─────────────────────────────────────────────────────────────────────────────
// Vec3
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn from_array(arr: [f64; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Component by axis index (0 = x, 1 = y, anything else = z).
    #[must_use]
    pub const fn axis(self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    #[must_use]
    pub const fn length_squared(self) -> f64 {
        self.dot(self)
    }

    #[must_use]
    pub const fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[must_use]
    pub const fn cross(self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len.is_finite() && len > 0.0 {
            Some(Self::new(self.x / len, self.y / len, self.z / len))
        } else {
            None
        }
    }

    /// Linear interpolation between two vectors.
    /// Returns `self * (1 - t) + rhs * t`.
    #[must_use]
    pub fn lerp(self, rhs: Self, t: f64) -> Self {
        Self::new(
            self.x + (rhs.x - self.x) * t,
            self.y + (rhs.y - self.y) * t,
            self.z + (rhs.z - self.z) * t,
        )
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    #[must_use]
    pub fn distance(self, rhs: Self) -> f64 {
        (self - rhs).length()
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(arr: [f64; 3]) -> Self {
        Self::from_array(arr)
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        v.to_array()
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Mul<Vec3> for f64 {
    type Output = Vec3;
    fn mul(self, rhs: Vec3) -> Self::Output {
        Vec3::new(self * rhs.x, self * rhs.y, self * rhs.z)
    }
}

impl Div<f64> for Vec3 {
    type Output = Self;
    fn div(self, rhs: f64) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tolerance
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub eps: f64,
}

impl Tolerance {
    /// Zero-length/degenerate vectors and edges.
    pub const ZERO_LENGTH: Self = Self { eps: 1e-12 };

    /// Relative tolerance when comparing mirrored matrix entries.
    pub const SYMMETRY: Self = Self { eps: 1e-10 };
}

// ─────────────────────────────────────────────────────────────────────────────
// Triangle helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Angle at `apex` between the rays towards `a` and `b`, in radians.
///
/// Returns `None` when either ray is degenerate.
#[must_use]
pub fn corner_angle(apex: Vec3, a: Vec3, b: Vec3) -> Option<f64> {
    let u = (a - apex).normalized()?;
    let v = (b - apex).normalized()?;
    Some(u.dot(v).clamp(-1.0, 1.0).acos())
}

/// Cotangent of the angle at `apex`, `None` for degenerate corners.
#[must_use]
pub fn corner_cotangent(apex: Vec3, a: Vec3, b: Vec3) -> Option<f64> {
    let u = a - apex;
    let v = b - apex;
    let sin = u.cross(v).length();
    if sin <= Tolerance::ZERO_LENGTH.eps {
        return None;
    }
    Some(u.dot(v) / sin)
}

#[must_use]
pub fn triangle_area(a: Vec3, b: Vec3, c: Vec3) -> f64 {
    0.5 * (b - a).cross(c - a).length()
}

/// Area of a planar or mildly non-planar polygon (fan around its centroid).
#[must_use]
pub fn polygon_area(points: &[Vec3]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let c = centroid(points);
    let n = points.len();
    (0..n)
        .map(|i| triangle_area(c, points[i], points[(i + 1) % n]))
        .sum()
}

#[must_use]
pub fn centroid(points: &[Vec3]) -> Vec3 {
    if points.is_empty() {
        return Vec3::ZERO;
    }
    let sum = points.iter().fold(Vec3::ZERO, |acc, p| acc + *p);
    sum / points.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn corner_angle_right_angle() {
        let angle = corner_angle(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0));
        assert!((angle.unwrap() - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn cotangent_of_degenerate_corner_is_none() {
        let a = Vec3::new(1.0, 0.0, 0.0);
        assert!(corner_cotangent(Vec3::ZERO, a, a * 2.0).is_none());
        let cot = corner_cotangent(Vec3::ZERO, a, Vec3::new(1.0, 1.0, 0.0)).unwrap();
        assert!((cot - 1.0).abs() < 1e-12);
    }

    #[test]
    fn polygon_area_of_unit_square() {
        let square = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        assert!((polygon_area(&square) - 1.0).abs() < 1e-12);
    }
}
