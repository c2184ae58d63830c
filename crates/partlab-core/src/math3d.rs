//! 3-D math primitives
//!
//! Just enough vector/matrix/rotation/placement support for the geometric
//! expression functions: construction, composition, inversion.

use crate::error::{Error, Result};
use std::fmt;
use std::ops::Mul;

/// A 3-D vector
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit-length copy; zero vectors are returned unchanged
    pub fn normalized(&self) -> Vector3 {
        let len = self.length();
        if len == 0.0 {
            *self
        } else {
            Vector3::new(self.x / len, self.y / len, self.z / len)
        }
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A 4x4 homogeneous transform matrix, row-major
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Matrix4 {
    pub m: [[f64; 4]; 4],
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix4 {
    pub fn identity() -> Self {
        let mut m = [[0.0; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self { m }
    }

    /// Fill from up to 16 row-major entries; missing entries keep identity
    pub fn from_entries(entries: &[f64]) -> Self {
        let mut mat = Self::identity();
        for (i, &v) in entries.iter().take(16).enumerate() {
            mat.m[i / 4][i % 4] = v;
        }
        mat
    }

    /// Translation matrix
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut mat = Self::identity();
        mat.m[0][3] = x;
        mat.m[1][3] = y;
        mat.m[2][3] = z;
        mat
    }

    /// Non-uniform scale matrix
    pub fn scale(v: Vector3) -> Self {
        let mut mat = Self::identity();
        mat.m[0][0] = v.x;
        mat.m[1][1] = v.y;
        mat.m[2][2] = v.z;
        mat
    }

    /// Determinant of the upper-left 3x3 block
    ///
    /// Homogeneous transforms have a unit bottom row, so the 3x3 block
    /// decides invertibility.
    pub fn determinant3(&self) -> f64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Full 4x4 determinant by cofactor expansion
    pub fn determinant(&self) -> f64 {
        let m = &self.m;
        let mut det = 0.0;
        for col in 0..4 {
            det += m[0][col] * self.cofactor(0, col);
        }
        det
    }

    fn cofactor(&self, row: usize, col: usize) -> f64 {
        let mut sub = [[0.0; 3]; 3];
        let mut sr = 0;
        for r in 0..4 {
            if r == row {
                continue;
            }
            let mut sc = 0;
            for c in 0..4 {
                if c == col {
                    continue;
                }
                sub[sr][sc] = self.m[r][c];
                sc += 1;
            }
            sr += 1;
        }
        let det3 = sub[0][0] * (sub[1][1] * sub[2][2] - sub[1][2] * sub[2][1])
            - sub[0][1] * (sub[1][0] * sub[2][2] - sub[1][2] * sub[2][0])
            + sub[0][2] * (sub[1][0] * sub[2][1] - sub[1][1] * sub[2][0]);
        if (row + col) % 2 == 0 {
            det3
        } else {
            -det3
        }
    }

    /// Invert, failing on a singular matrix
    pub fn inverse(&self) -> Result<Matrix4> {
        let det = self.determinant();
        if det.abs() <= f64::EPSILON {
            return Err(Error::SingularMatrix);
        }
        let mut inv = Matrix4::identity();
        for r in 0..4 {
            for c in 0..4 {
                // Adjugate: transposed cofactors
                inv.m[r][c] = self.cofactor(c, r) / det;
            }
        }
        Ok(inv)
    }

    /// Transform a point
    pub fn apply(&self, v: Vector3) -> Vector3 {
        let m = &self.m;
        Vector3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z + m[0][3],
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z + m[1][3],
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z + m[2][3],
        )
    }
}

impl Mul for Matrix4 {
    type Output = Matrix4;

    fn mul(self, rhs: Matrix4) -> Matrix4 {
        let mut out = Matrix4 { m: [[0.0; 4]; 4] };
        for r in 0..4 {
            for c in 0..4 {
                out.m[r][c] = (0..4).map(|k| self.m[r][k] * rhs.m[k][c]).sum();
            }
        }
        out
    }
}

impl fmt::Display for Matrix4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matrix(")?;
        for (i, row) in self.m.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({}, {}, {}, {})", row[0], row[1], row[2], row[3])?;
        }
        write!(f, ")")
    }
}

/// A rotation stored as a unit quaternion
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rotation {
    // (x, y, z, w)
    q: [f64; 4],
}

impl Default for Rotation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Rotation {
    pub fn identity() -> Self {
        Self {
            q: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Rotation of `angle_rad` radians about `axis`
    pub fn from_axis_angle(axis: Vector3, angle_rad: f64) -> Self {
        let axis = axis.normalized();
        let half = angle_rad / 2.0;
        let s = half.sin();
        Self {
            q: [axis.x * s, axis.y * s, axis.z * s, half.cos()],
        }
    }

    pub fn inverse(&self) -> Rotation {
        Rotation {
            q: [-self.q[0], -self.q[1], -self.q[2], self.q[3]],
        }
    }

    /// Compose rotations: `self` applied after `other`
    pub fn multiply(&self, other: &Rotation) -> Rotation {
        let [x1, y1, z1, w1] = self.q;
        let [x2, y2, z2, w2] = other.q;
        Rotation {
            q: [
                w1 * x2 + x1 * w2 + y1 * z2 - z1 * y2,
                w1 * y2 - x1 * z2 + y1 * w2 + z1 * x2,
                w1 * z2 + x1 * y2 - y1 * x2 + z1 * w2,
                w1 * w2 - x1 * x2 - y1 * y2 - z1 * z2,
            ],
        }
    }

    /// Expand to a rotation matrix
    pub fn to_matrix(&self) -> Matrix4 {
        let [x, y, z, w] = self.q;
        let mut m = Matrix4::identity();
        m.m[0][0] = 1.0 - 2.0 * (y * y + z * z);
        m.m[0][1] = 2.0 * (x * y - z * w);
        m.m[0][2] = 2.0 * (x * z + y * w);
        m.m[1][0] = 2.0 * (x * y + z * w);
        m.m[1][1] = 1.0 - 2.0 * (x * x + z * z);
        m.m[1][2] = 2.0 * (y * z - x * w);
        m.m[2][0] = 2.0 * (x * z - y * w);
        m.m[2][1] = 2.0 * (y * z + x * w);
        m.m[2][2] = 1.0 - 2.0 * (x * x + y * y);
        m
    }

    /// Recover from the rotation part of a matrix (Shepperd's method)
    pub fn from_matrix(m: &Matrix4) -> Rotation {
        let t = m.m[0][0] + m.m[1][1] + m.m[2][2];
        let q = if t > 0.0 {
            let s = (t + 1.0).sqrt() * 2.0;
            [
                (m.m[2][1] - m.m[1][2]) / s,
                (m.m[0][2] - m.m[2][0]) / s,
                (m.m[1][0] - m.m[0][1]) / s,
                0.25 * s,
            ]
        } else if m.m[0][0] > m.m[1][1] && m.m[0][0] > m.m[2][2] {
            let s = (1.0 + m.m[0][0] - m.m[1][1] - m.m[2][2]).sqrt() * 2.0;
            [
                0.25 * s,
                (m.m[0][1] + m.m[1][0]) / s,
                (m.m[0][2] + m.m[2][0]) / s,
                (m.m[2][1] - m.m[1][2]) / s,
            ]
        } else if m.m[1][1] > m.m[2][2] {
            let s = (1.0 + m.m[1][1] - m.m[0][0] - m.m[2][2]).sqrt() * 2.0;
            [
                (m.m[0][1] + m.m[1][0]) / s,
                0.25 * s,
                (m.m[1][2] + m.m[2][1]) / s,
                (m.m[0][2] - m.m[2][0]) / s,
            ]
        } else {
            let s = (1.0 + m.m[2][2] - m.m[0][0] - m.m[1][1]).sqrt() * 2.0;
            [
                (m.m[0][2] + m.m[2][0]) / s,
                (m.m[1][2] + m.m[2][1]) / s,
                0.25 * s,
                (m.m[1][0] - m.m[0][1]) / s,
            ]
        };
        Rotation { q }
    }

    pub fn apply(&self, v: Vector3) -> Vector3 {
        self.to_matrix().apply(v)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rotation({}, {}, {}, {})",
            self.q[0], self.q[1], self.q[2], self.q[3]
        )
    }
}

/// A position plus a rotation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Placement {
    pub position: Vector3,
    pub rotation: Rotation,
}

impl Placement {
    pub fn new(position: Vector3, rotation: Rotation) -> Self {
        Self { position, rotation }
    }

    pub fn to_matrix(&self) -> Matrix4 {
        let mut m = self.rotation.to_matrix();
        m.m[0][3] = self.position.x;
        m.m[1][3] = self.position.y;
        m.m[2][3] = self.position.z;
        m
    }

    pub fn from_matrix(m: &Matrix4) -> Self {
        Self {
            position: Vector3::new(m.m[0][3], m.m[1][3], m.m[2][3]),
            rotation: Rotation::from_matrix(m),
        }
    }

    pub fn inverse(&self) -> Placement {
        let rot = self.rotation.inverse();
        let pos = rot.apply(Vector3::new(
            -self.position.x,
            -self.position.y,
            -self.position.z,
        ));
        Placement {
            position: pos,
            rotation: rot,
        }
    }

    /// Compose placements: `self` applied after `other`
    pub fn multiply(&self, other: &Placement) -> Placement {
        Placement::from_matrix(&(self.to_matrix() * other.to_matrix()))
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Placement({}, {})", self.position, self.rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_matrix_identity_mul() {
        let m = Matrix4::translation(1.0, 2.0, 3.0);
        assert_eq!(m * Matrix4::identity(), m);
    }

    #[test]
    fn test_matrix_inverse() {
        let m = Matrix4::translation(1.0, 2.0, 3.0) * Matrix4::scale(Vector3::new(2.0, 2.0, 2.0));
        let inv = m.inverse().unwrap();
        let id = m * inv;
        for r in 0..4 {
            for c in 0..4 {
                assert_close(id.m[r][c], if r == c { 1.0 } else { 0.0 });
            }
        }
    }

    #[test]
    fn test_singular_matrix() {
        let m = Matrix4::scale(Vector3::new(1.0, 1.0, 0.0));
        assert!(m.inverse().is_err());
    }

    #[test]
    fn test_rotation_roundtrip() {
        let r = Rotation::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2);
        let v = r.apply(Vector3::new(1.0, 0.0, 0.0));
        assert_close(v.x, 0.0);
        assert_close(v.y, 1.0);

        let back = Rotation::from_matrix(&r.to_matrix());
        let v2 = back.apply(Vector3::new(1.0, 0.0, 0.0));
        assert_close(v2.y, 1.0);
    }

    #[test]
    fn test_placement_inverse() {
        let p = Placement::new(
            Vector3::new(5.0, 0.0, 0.0),
            Rotation::from_axis_angle(Vector3::new(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2),
        );
        let composed = p.multiply(&p.inverse());
        assert_close(composed.position.length(), 0.0);
    }
}
