//! Geometric embedding of the unit tree into a user-supplied bounding box.
//!
//! Integer octant coordinates map linearly onto a box given by its
//! min/max corner per axis. Root corner `k` takes the min or max bound on
//! each axis according to `(k >> axis) & 1`, i.e. corners are numbered
//! along the z-filling curve.

use crate::octant::Octant;

/// Axis-aligned bounding box of the root tree.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// The unit square/cube.
    pub fn unit() -> Self {
        Self { min: [0.0; 3], max: [1.0; 3] }
    }

    /// Build from the host's flat limits array
    /// `[x_min, y_min, z_min, x_max, y_max, z_max]`.
    pub fn from_limits(limits: [f64; 6]) -> Self {
        Self {
            min: [limits[0], limits[1], limits[2]],
            max: [limits[3], limits[4], limits[5]],
        }
    }

    /// Physical coordinates of root corner `corner` (z-order numbering):
    /// axis `a` takes the min bound when bit `a` of `corner` is 0 and the
    /// max bound otherwise.
    pub fn root_corner<const D: usize>(&self, corner: usize) -> [f64; 3] {
        debug_assert!(corner < Octant::<D>::NUM_CORNERS);
        let mut out = [0.0; 3];
        for axis in 0..D {
            out[axis] = if (corner >> axis) & 1 == 0 { self.min[axis] } else { self.max[axis] };
        }
        out
    }

    /// Physical coordinates of corner `corner` of `oct`.
    ///
    /// Always returns three components; the third is 0 in 2D so the host
    /// never reads uninitialized data when it embeds planar meshes in
    /// three dimensions.
    pub fn vertex_coordinates<const D: usize>(&self, oct: &Octant<D>, corner: usize) -> [f64; 3] {
        debug_assert!(corner < Octant::<D>::NUM_CORNERS);
        let h = oct.len();
        let scale = Octant::<D>::ROOT_LEN as f64;
        let mut out = [0.0; 3];
        for axis in 0..D {
            let c = oct.coords[axis] + ((corner >> axis) & 1) as i32 * h;
            let frac = c as f64 / scale;
            out[axis] = self.min[axis] + frac * (self.max[axis] - self.min[axis]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octant::{Octant3, Quadrant};

    #[test]
    fn root_corners_follow_bit_pattern() {
        let bb = BoundingBox::from_limits([0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(bb.root_corner::<3>(0), [0.0, 1.0, 2.0]);
        assert_eq!(bb.root_corner::<3>(5), [10.0, 1.0, 12.0]);
        assert_eq!(bb.root_corner::<3>(7), [10.0, 11.0, 12.0]);
    }

    #[test]
    fn quadrant_vertices_interpolate() {
        let bb = BoundingBox::from_limits([0.0, 0.0, 0.0, 2.0, 4.0, 0.0]);
        let c3 = Quadrant::root().children()[3];
        assert_eq!(bb.vertex_coordinates(&c3, 0), [1.0, 2.0, 0.0]);
        assert_eq!(bb.vertex_coordinates(&c3, 3), [2.0, 4.0, 0.0]);
    }

    #[test]
    fn octant_vertices_cover_cube() {
        let bb = BoundingBox::unit();
        let root = Octant3::root();
        assert_eq!(bb.vertex_coordinates(&root, 0), [0.0, 0.0, 0.0]);
        assert_eq!(bb.vertex_coordinates(&root, 7), [1.0, 1.0, 1.0]);
    }
}
