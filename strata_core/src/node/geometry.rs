// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Leaf geometry: positioned, colored, textured vertices and index triples.

use alloc::vec;
use alloc::vec::Vec;

use kurbo::{Affine, Point, Rect};
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use super::resource::TextureId;
use crate::error::InvalidGeometryError;

/// The largest vertex count a 16-bit index buffer can address.
pub const MAX_VERTICES: usize = 65_535;

/// A single vertex as uploaded to the GPU.
///
/// `color` is RGBA in `0.0..=1.0`; whether it is premultiplied is a property
/// of the owning [`Geometry`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position in the owning node's local space (or, once batched, in the
    /// space of the current render target).
    pub position: [f32; 2],
    /// RGBA color.
    pub color: [f32; 4],
    /// Texture coordinates.
    pub uv: [f32; 2],
}

impl Vertex {
    /// Opaque white, the "untinted" color.
    pub const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

    /// Creates a vertex.
    #[must_use]
    pub const fn new(position: [f32; 2], color: [f32; 4], uv: [f32; 2]) -> Self {
        Self {
            position,
            color,
            uv,
        }
    }
}

/// The visual payload of a leaf node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    /// Vertex data in local space.
    pub vertices: Vec<Vertex>,
    /// Triangle list; every three indices form one triangle.
    pub indices: Vec<u16>,
    /// Texture sampled by the geometry, if any.
    pub texture: Option<TextureId>,
    /// Whether vertex colors (and the texture) carry premultiplied alpha.
    pub premultiplied_alpha: bool,
}

impl Geometry {
    /// Creates untextured geometry with premultiplied alpha.
    #[must_use]
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u16>) -> Self {
        Self {
            vertices,
            indices,
            texture: None,
            premultiplied_alpha: true,
        }
    }

    /// Creates an axis-aligned quad covering `(0, 0)..(width, height)`.
    #[must_use]
    pub fn quad(width: f32, height: f32, color: [f32; 4]) -> Self {
        let vertices = vec![
            Vertex::new([0.0, 0.0], color, [0.0, 0.0]),
            Vertex::new([width, 0.0], color, [1.0, 0.0]),
            Vertex::new([0.0, height], color, [0.0, 1.0]),
            Vertex::new([width, height], color, [1.0, 1.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 1, 3, 2])
    }

    /// Sets the texture.
    #[must_use]
    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    /// Sets whether colors are premultiplied.
    #[must_use]
    pub fn with_premultiplied_alpha(mut self, premultiplied_alpha: bool) -> Self {
        self.premultiplied_alpha = premultiplied_alpha;
        self
    }

    /// Checks that the geometry describes at least one drawable triangle.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidGeometryError`] found.
    pub fn validate(&self) -> Result<(), InvalidGeometryError> {
        let vertex_count = self.vertices.len();
        if vertex_count == 0 {
            return Err(InvalidGeometryError::NoVertices);
        }
        if vertex_count > MAX_VERTICES {
            return Err(InvalidGeometryError::TooManyVertices { vertex_count });
        }
        if self.indices.is_empty() || self.indices.len() % 3 != 0 {
            return Err(InvalidGeometryError::IncompleteTriangles {
                len: self.indices.len(),
            });
        }
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&i| usize::from(i) >= vertex_count)
        {
            return Err(InvalidGeometryError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
        if self
            .vertices
            .iter()
            .any(|v| !v.position[0].is_finite() || !v.position[1].is_finite())
        {
            return Err(InvalidGeometryError::NonFinitePosition);
        }
        let area: f64 = self.triangles().map(|t| triangle_area(&t).abs()).sum();
        if area == 0.0 {
            return Err(InvalidGeometryError::ZeroArea);
        }
        Ok(())
    }

    /// Returns `true` if any vertex color differs from opaque white.
    ///
    /// Untinted geometry can be drawn with a cheaper shader variant, so the
    /// flag is part of the batch signature.
    #[must_use]
    pub fn is_tinted(&self) -> bool {
        self.vertices.iter().any(|v| v.color != Vertex::WHITE)
    }

    /// Returns the axis-aligned bounds of the vertices mapped through
    /// `matrix`.
    #[must_use]
    pub fn bounds(&self, matrix: Affine) -> Rect {
        let mut points = self.vertices.iter().map(|v| matrix * to_point(v));
        let Some(first) = points.next() else {
            return Rect::ZERO;
        };
        points.fold(Rect::from_points(first, first), |r, p| r.union_pt(p))
    }

    /// Returns `true` if `p` (in local space) lies inside any triangle.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        self.triangles().any(|t| triangle_contains(&t, p))
    }

    fn triangles(&self) -> impl Iterator<Item = [Point; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                to_point(&self.vertices[usize::from(tri[0])]),
                to_point(&self.vertices[usize::from(tri[1])]),
                to_point(&self.vertices[usize::from(tri[2])]),
            ]
        })
    }
}

fn to_point(v: &Vertex) -> Point {
    Point::new(f64::from(v.position[0]), f64::from(v.position[1]))
}

/// Twice the signed area.
fn triangle_area(t: &[Point; 3]) -> f64 {
    (t[1] - t[0]).cross(t[2] - t[0])
}

fn triangle_contains(t: &[Point; 3], p: Point) -> bool {
    let d0 = (t[1] - t[0]).cross(p - t[0]);
    let d1 = (t[2] - t[1]).cross(p - t[1]);
    let d2 = (t[0] - t[2]).cross(p - t[2]);
    let has_neg = d0 < 0.0 || d1 < 0.0 || d2 < 0.0;
    let has_pos = d0 > 0.0 || d1 > 0.0 || d2 > 0.0;
    !(has_neg && has_pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_is_valid() {
        assert_eq!(Geometry::quad(10.0, 5.0, Vertex::WHITE).validate(), Ok(()));
    }

    #[test]
    fn zero_width_quad_is_rejected() {
        let err = Geometry::quad(0.0, 5.0, Vertex::WHITE).validate();
        assert_eq!(err, Err(InvalidGeometryError::ZeroArea));
    }

    #[test]
    fn empty_geometry_is_rejected() {
        let g = Geometry::new(Vec::new(), Vec::new());
        assert_eq!(g.validate(), Err(InvalidGeometryError::NoVertices));
    }

    #[test]
    fn partial_triangle_is_rejected() {
        let mut g = Geometry::quad(1.0, 1.0, Vertex::WHITE);
        g.indices.pop();
        assert_eq!(
            g.validate(),
            Err(InvalidGeometryError::IncompleteTriangles { len: 5 })
        );
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut g = Geometry::quad(1.0, 1.0, Vertex::WHITE);
        g.indices[4] = 9;
        assert_eq!(
            g.validate(),
            Err(InvalidGeometryError::IndexOutOfRange {
                index: 9,
                vertex_count: 4
            })
        );
    }

    #[test]
    fn nan_position_is_rejected() {
        let mut g = Geometry::quad(1.0, 1.0, Vertex::WHITE);
        g.vertices[2].position[1] = f32::NAN;
        assert_eq!(g.validate(), Err(InvalidGeometryError::NonFinitePosition));
    }

    #[test]
    fn tint_detection() {
        assert!(!Geometry::quad(1.0, 1.0, Vertex::WHITE).is_tinted());
        assert!(Geometry::quad(1.0, 1.0, [1.0, 0.0, 0.0, 1.0]).is_tinted());
    }

    #[test]
    fn bounds_follow_matrix() {
        let g = Geometry::quad(10.0, 20.0, Vertex::WHITE);
        let r = g.bounds(Affine::translate((5.0, 5.0)));
        assert_eq!(r, Rect::new(5.0, 5.0, 15.0, 25.0));
    }

    #[test]
    fn contains_point() {
        let g = Geometry::quad(10.0, 10.0, Vertex::WHITE);
        assert!(g.contains(Point::new(5.0, 5.0)));
        assert!(!g.contains(Point::new(15.0, 5.0)));
    }
}
