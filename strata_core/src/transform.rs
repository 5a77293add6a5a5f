// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Decomposed 2D transform with a lazily cached matrix.
//!
//! A [`Transform`] is described by position, pivot, scale, skew and rotation.
//! The corresponding [`Affine`] is derived on first read after a mutation and
//! cached until the next mutation. The optional [`Spatial3d`] part adds a z
//! offset and rotations about the x and y axes for the 3D resolution path.

use core::cell::Cell;
use core::f64::consts::{PI, TAU};

use kurbo::{Affine, Vec2};
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::transform3d::Transform3d;

/// Normalizes an angle in radians into the half-open range (−π, π].
#[must_use]
pub fn normalize_angle(radians: f64) -> f64 {
    let a = radians % TAU;
    if a <= -PI {
        a + TAU
    } else if a > PI {
        a - TAU
    } else {
        a
    }
}

/// The 3D part of a node's transform.
///
/// All-zero values (the default) mean the node lives entirely in the z = 0
/// plane and only ever takes the 2D resolution path.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Spatial3d {
    /// Translation along z.
    pub z: f64,
    /// Pivot z coordinate for the x/y rotations.
    pub pivot_z: f64,
    /// Rotation about the x axis, radians.
    pub rotation_x: f64,
    /// Rotation about the y axis, radians.
    pub rotation_y: f64,
}

impl Spatial3d {
    /// Returns `true` if this adds nothing to the 2D transform.
    #[must_use]
    pub fn is_trivial(&self) -> bool {
        self.z == 0.0 && self.rotation_x == 0.0 && self.rotation_y == 0.0
    }
}

/// A node transform decomposed into position, pivot, scale, skew and
/// rotation.
///
/// The matrix maps local coordinates into the parent's coordinate space:
/// the pivot is moved to the origin, the node is scaled, skewed and rotated,
/// then translated to `position`.
#[derive(Clone, Debug)]
pub struct Transform {
    position: Vec2,
    pivot: Vec2,
    scale: Vec2,
    skew: Vec2,
    rotation: f64,
    spatial: Spatial3d,
    matrix: Cell<Affine>,
    dirty: Cell<bool>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.pivot == other.pivot
            && self.scale == other.scale
            && self.skew == other.skew
            && self.rotation == other.rotation
            && self.spatial == other.spatial
    }
}

impl Transform {
    /// Creates an identity transform.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            position: Vec2::ZERO,
            pivot: Vec2::ZERO,
            scale: Vec2::new(1.0, 1.0),
            skew: Vec2::ZERO,
            rotation: 0.0,
            spatial: Spatial3d {
                z: 0.0,
                pivot_z: 0.0,
                rotation_x: 0.0,
                rotation_y: 0.0,
            },
            matrix: Cell::new(Affine::IDENTITY),
            dirty: Cell::new(false),
        }
    }

    /// Returns the position in parent space.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Returns the pivot in local space.
    #[must_use]
    pub fn pivot(&self) -> Vec2 {
        self.pivot
    }

    /// Returns the per-axis scale.
    #[must_use]
    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    /// Returns the per-axis skew angles, radians.
    #[must_use]
    pub fn skew(&self) -> Vec2 {
        self.skew
    }

    /// Returns the rotation in (−π, π].
    #[must_use]
    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Returns the 3D part.
    #[must_use]
    pub fn spatial(&self) -> Spatial3d {
        self.spatial
    }

    /// Sets the position. Returns `true` if the value changed.
    pub fn set_position(&mut self, position: Vec2) -> bool {
        if self.position == position {
            return false;
        }
        self.position = position;
        self.invalidate();
        true
    }

    /// Sets the pivot. Returns `true` if the value changed.
    pub fn set_pivot(&mut self, pivot: Vec2) -> bool {
        if self.pivot == pivot {
            return false;
        }
        self.pivot = pivot;
        self.invalidate();
        true
    }

    /// Sets the scale. Returns `true` if the value changed.
    pub fn set_scale(&mut self, scale: Vec2) -> bool {
        if self.scale == scale {
            return false;
        }
        self.scale = scale;
        self.invalidate();
        true
    }

    /// Sets the skew angles. Returns `true` if the value changed.
    pub fn set_skew(&mut self, skew: Vec2) -> bool {
        let skew = Vec2::new(normalize_angle(skew.x), normalize_angle(skew.y));
        if self.skew == skew {
            return false;
        }
        self.skew = skew;
        self.invalidate();
        true
    }

    /// Sets the rotation, normalized into (−π, π]. Returns `true` if the
    /// stored value changed.
    pub fn set_rotation(&mut self, radians: f64) -> bool {
        let rotation = normalize_angle(radians);
        if self.rotation == rotation {
            return false;
        }
        self.rotation = rotation;
        self.invalidate();
        true
    }

    /// Sets the 3D part. Returns `true` if the value changed.
    pub fn set_spatial(&mut self, spatial: Spatial3d) -> bool {
        let spatial = Spatial3d {
            rotation_x: normalize_angle(spatial.rotation_x),
            rotation_y: normalize_angle(spatial.rotation_y),
            ..spatial
        };
        if self.spatial == spatial {
            return false;
        }
        self.spatial = spatial;
        true
    }

    /// Returns `true` while the cached matrix is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Returns `true` if either scale axis is zero, which makes the matrix
    /// singular.
    #[must_use]
    pub fn has_zero_scale(&self) -> bool {
        self.scale.x == 0.0 || self.scale.y == 0.0
    }

    /// Returns `true` if the 3D part is non-trivial.
    #[must_use]
    pub fn is_3d(&self) -> bool {
        !self.spatial.is_trivial()
    }

    /// Returns the local-to-parent matrix, recomputing it if stale.
    #[must_use]
    pub fn matrix(&self) -> Affine {
        if self.dirty.get() {
            self.matrix.set(self.compute_matrix());
            self.dirty.set(false);
        }
        self.matrix.get()
    }

    /// Returns the local-to-parent matrix including the 3D part.
    ///
    /// The x/y rotations happen about `(pivot.x, pivot.y, pivot_z)` in local
    /// space, before the 2D transform; the z offset is applied last.
    #[must_use]
    pub fn matrix_3d(&self) -> Transform3d {
        let flat = Transform3d::from_affine(self.matrix());
        if self.spatial.is_trivial() {
            return flat;
        }
        let s = self.spatial;
        let (px, py) = (self.pivot.x, self.pivot.y);
        Transform3d::from_translation(0.0, 0.0, s.z)
            * flat
            * Transform3d::from_translation(px, py, s.pivot_z)
            * Transform3d::from_rotation_y(s.rotation_y)
            * Transform3d::from_rotation_x(s.rotation_x)
            * Transform3d::from_translation(-px, -py, -s.pivot_z)
    }

    fn invalidate(&mut self) {
        self.dirty.set(true);
    }

    fn compute_matrix(&self) -> Affine {
        let Vec2 { x, y } = self.position;
        let Vec2 { x: px, y: py } = self.pivot;
        let Vec2 { x: sx, y: sy } = self.scale;

        if self.skew == Vec2::ZERO && self.rotation == 0.0 {
            return Affine::new([sx, 0.0, 0.0, sy, x - px * sx, y - py * sy]);
        }

        let (kx, ky) = (self.skew.x, self.skew.y);
        let skewed = Affine::new([
            sx * ky.cos(),
            sx * ky.sin(),
            -sy * kx.sin(),
            sy * kx.cos(),
            0.0,
            0.0,
        ]);
        let linear = if self.rotation == 0.0 {
            skewed
        } else {
            Affine::rotate(self.rotation) * skewed
        };
        let [a, b, c, d, _, _] = linear.as_coeffs();
        Affine::new([a, b, c, d, x - a * px - c * py, y - b * px - d * py])
    }
}
