// q_shared.rs — shared math, planes and contents codes

pub type Vec3 = [f32; 3];
pub type Vec4 = [f32; 4];

// ============================================================
// Contents codes (leaf contents, hull clip-node terminals)
// ============================================================

pub const CONTENTS_EMPTY: i32 = -1;
pub const CONTENTS_SOLID: i32 = -2;
pub const CONTENTS_WATER: i32 = -3;
pub const CONTENTS_SLIME: i32 = -4;
pub const CONTENTS_LAVA: i32 = -5;
pub const CONTENTS_SKY: i32 = -6;

// ============================================================
// MATHLIB — Vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Dot product of a point (implicit w = 1) with a packed `[normal, -dist]` plane.
#[inline]
pub fn plane_diff(p: &Vec3, plane: &Vec4) -> f32 {
    p[0] * plane[0] + p[1] * plane[1] + p[2] * plane[2] + plane[3]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn vector_length(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Radius of the sphere around the origin enclosing the box.
pub fn radius_from_bounds(mins: &Vec3, maxs: &Vec3) -> f32 {
    let mut corner = [0.0f32; 3];
    for i in 0..3 {
        corner[i] = if mins[i].abs() > maxs[i].abs() {
            mins[i].abs()
        } else {
            maxs[i].abs()
        };
    }
    vector_length(&corner)
}

// ============================================================
// Plane
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PlaneType {
    #[default]
    X = 0,
    Y = 1,
    Z = 2,
    AnyX = 3,
    AnyY = 4,
    AnyZ = 5,
}

impl PlaneType {
    /// Map the on-disk type code. Unknown codes fall back to the axis the
    /// normal is closest to.
    pub fn from_disk(code: i32, normal: &Vec3) -> Self {
        match code {
            0 => PlaneType::X,
            1 => PlaneType::Y,
            2 => PlaneType::Z,
            3 => PlaneType::AnyX,
            4 => PlaneType::AnyY,
            5 => PlaneType::AnyZ,
            _ => {
                let ax = normal[0].abs();
                let ay = normal[1].abs();
                let az = normal[2].abs();
                if ax >= ay && ax >= az {
                    PlaneType::AnyX
                } else if ay >= az {
                    PlaneType::AnyY
                } else {
                    PlaneType::AnyZ
                }
            }
        }
    }

    /// Axial planes can be tested against a single coordinate.
    #[inline]
    pub fn is_axial(self) -> bool {
        (self as u8) < 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: PlaneType,
    pub signbits: u8,
}

impl Plane {
    pub fn new(normal: Vec3, dist: f32, plane_type: PlaneType) -> Self {
        Self {
            normal,
            dist,
            plane_type,
            signbits: signbits_for_normal(&normal),
        }
    }

    /// Signed distance of `p` from the plane.
    #[inline]
    pub fn diff(&self, p: &Vec3) -> f32 {
        if self.plane_type.is_axial() {
            p[self.plane_type as usize] - self.dist
        } else {
            dot_product(&self.normal, p) - self.dist
        }
    }

    /// The plane packed as `[normal, -dist]`.
    #[inline]
    pub fn to_vec4(&self) -> Vec4 {
        [self.normal[0], self.normal[1], self.normal[2], -self.dist]
    }
}

/// Bit j is set when component j of the normal is negative.
pub fn signbits_for_normal(normal: &Vec3) -> u8 {
    let mut bits: u8 = 0;
    for j in 0..3 {
        if normal[j] < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}
