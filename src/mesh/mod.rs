//! Flat mesh connectivity extracted from a balanced forest and its ghost
//! layer.
//!
//! All adjacency is expressed as indices into the combined cell space:
//! local octants occupy `[0, local_num)` and ghosts
//! `[local_num, local_num + ghost_num)`. Rows exist for every cell, but
//! only local rows are filled — a ghost's adjacency belongs to its owning
//! rank — so ghost rows keep the `-1` sentinel.
//!
//! Face entries use the standard encoding for a single Cartesian tree
//! (orientation 0): a same-size neighbor stores the neighbor's connecting
//! face `nf`; a double-size neighbor stores `B*(1 + h) + nf` with `h` the
//! subface this cell occupies; two/four half-size neighbors store
//! `nf - B`, with the cell entry pointing into the half-face table.
//! `B` is 8 in 2D and 24 in 3D. A cell on the domain boundary references
//! itself with its own face number.

mod edges;

use crate::error::ForestError;
use crate::forest::Forest;
use crate::ghost::GhostLayer;
use crate::octant::Octant;

/// Sentinel for "no neighbor / never written".
pub const NO_NEIGHBOR: i64 = -1;

/// Flat adjacency tables over the combined local+ghost cell space.
#[derive(Debug, Clone)]
pub struct MeshConnectivity {
    /// Spatial dimension (2 or 3).
    pub dim: usize,
    /// Locally owned cell count.
    pub local_num: usize,
    /// Ghost cell count.
    pub ghost_num: usize,
    /// Global octant count.
    pub global_num: u64,
    /// Global index of each rank's first octant.
    pub global_first: Vec<u64>,
    /// Refinement level per combined cell.
    pub cell_levels: Vec<i8>,
    /// Lower-corner coordinates per combined cell, `dim` entries each.
    pub cell_coords: Vec<i32>,
    /// Neighbor (or half-table) index per cell face.
    pub cell_to_cell: Vec<i64>,
    /// Face code per cell face (see module docs).
    pub cell_to_face: Vec<i8>,
    /// Half-size face neighbors, `2^(dim-1)` entries per hanging face.
    pub cell_to_half: Vec<i64>,
    /// Diagonal neighbor index per cell corner, or -1.
    pub cell_to_corner: Vec<i64>,
    /// Edge-only neighbor (or half-edge-table) index per cell edge
    /// (3D only, 12 entries per cell; empty in 2D).
    pub cell_to_cell_by_edge: Vec<i64>,
    /// Edge code per cell edge (3D only).
    pub cell_to_edge: Vec<i8>,
    /// Half-size edge neighbors, 2 entries per hanging edge (3D only).
    pub cell_to_half_by_edge: Vec<i64>,
}

impl MeshConnectivity {
    /// Extract the full connectivity of `forest` against `ghosts`.
    ///
    /// The forest must satisfy the 2:1 invariant at least as strongly as
    /// the ghost layer's pattern; for complete corner (and 3D edge)
    /// tables the ghost layer should be built with full connectivity.
    pub fn extract<const D: usize>(
        forest: &Forest<D>,
        ghosts: &GhostLayer<D>,
    ) -> Result<Self, ForestError> {
        let local = forest.octants();
        let l = local.len();
        let n = l + ghosts.num_ghosts();
        let faces = Octant::<D>::NUM_FACES;
        let corners = Octant::<D>::NUM_CORNERS;
        let half_stride = 1usize << (D - 1);
        let code_base = (faces * half_stride) as i32;

        let find = |oct: &Octant<D>| -> Option<usize> {
            forest.bsearch(oct).or_else(|| ghosts.bsearch(oct).map(|gi| l + gi))
        };

        let mut cell_to_cell = vec![NO_NEIGHBOR; n * faces];
        let mut cell_to_face = vec![-1i8; n * faces];
        let mut cell_to_half: Vec<i64> = Vec::new();

        for (li, q) in local.iter().enumerate() {
            for f in 0..faces {
                let row = li * faces + f;
                let neighbor = q.face_neighbor(f);
                if !neighbor.is_inside_root() {
                    cell_to_cell[row] = li as i64;
                    cell_to_face[row] = f as i8;
                    continue;
                }
                let nf = (f ^ 1) as i32;

                if let Some(idx) = find(&neighbor) {
                    cell_to_cell[row] = idx as i64;
                    cell_to_face[row] = nf as i8;
                    continue;
                }

                if q.level > 0 {
                    let big = neighbor.ancestor(q.level - 1);
                    if let Some(idx) = find(&big) {
                        let h = subface_index(q, f) as i32;
                        cell_to_cell[row] = idx as i64;
                        cell_to_face[row] = (code_base * (1 + h) + nf) as i8;
                        continue;
                    }
                }

                if q.level >= Octant::<D>::MAX_REFINE_LEVEL {
                    return Err(ForestError::NeighborNotFound { local_index: li, face: f });
                }
                let axis = f / 2;
                let touching_bit = 1 - f % 2;
                let mut halves = [0i64; 4];
                let mut found = 0usize;
                for (id, child) in neighbor.children().into_iter().enumerate() {
                    if (id >> axis) & 1 != touching_bit {
                        continue;
                    }
                    match find(&child) {
                        Some(idx) => {
                            halves[found] = idx as i64;
                            found += 1;
                        }
                        None => {
                            return Err(ForestError::NeighborNotFound { local_index: li, face: f });
                        }
                    }
                }
                debug_assert_eq!(found, half_stride);
                let half_idx = cell_to_half.len() / half_stride;
                cell_to_half.extend_from_slice(&halves[..half_stride]);
                cell_to_cell[row] = half_idx as i64;
                cell_to_face[row] = (nf - code_base) as i8;
            }
        }

        let mut cell_to_corner = vec![NO_NEIGHBOR; n * corners];
        for (li, q) in local.iter().enumerate() {
            for c in 0..corners {
                let diag = q.corner_neighbor(c);
                if !diag.is_inside_root() {
                    continue;
                }
                let row = li * corners + c;
                if let Some(idx) = find(&diag) {
                    cell_to_corner[row] = idx as i64;
                    continue;
                }
                if q.level > 0 {
                    if let Some(idx) = find(&diag.ancestor(q.level - 1)) {
                        cell_to_corner[row] = idx as i64;
                        continue;
                    }
                }
                if q.level < Octant::<D>::MAX_REFINE_LEVEL {
                    let near = diag.children()[c ^ (corners - 1)];
                    if let Some(idx) = find(&near) {
                        cell_to_corner[row] = idx as i64;
                    }
                }
            }
        }

        let mut cell_levels = Vec::with_capacity(n);
        let mut cell_coords = Vec::with_capacity(n * D);
        for q in local.iter().chain(ghosts.octants()) {
            cell_levels.push(q.level as i8);
            cell_coords.extend_from_slice(&q.coords);
        }

        let mut mesh = Self {
            dim: D,
            local_num: l,
            ghost_num: ghosts.num_ghosts(),
            global_num: forest.global_num(),
            global_first: forest.global_first().to_vec(),
            cell_levels,
            cell_coords,
            cell_to_cell,
            cell_to_face,
            cell_to_half,
            cell_to_corner,
            cell_to_cell_by_edge: Vec::new(),
            cell_to_edge: Vec::new(),
            cell_to_half_by_edge: Vec::new(),
        };
        if D == 3 {
            edges::fill_edge_tables(forest, ghosts, &mut mesh);
        }
        log::debug!(
            "extracted connectivity: {} local, {} ghost, {} half faces, {} half edges",
            mesh.local_num,
            mesh.ghost_num,
            mesh.num_half_faces(),
            mesh.num_half_edges()
        );
        Ok(mesh)
    }

    /// Total combined cell count (local + ghost).
    pub fn num_cells(&self) -> usize {
        self.local_num + self.ghost_num
    }

    /// Faces per cell.
    pub fn faces_per_cell(&self) -> usize {
        2 * self.dim
    }

    /// Entries per half-face record.
    pub fn half_stride(&self) -> usize {
        1 << (self.dim - 1)
    }

    /// Number of hanging-face records.
    pub fn num_half_faces(&self) -> usize {
        self.cell_to_half.len() / self.half_stride()
    }

    /// Number of hanging-edge records (0 in 2D).
    pub fn num_half_edges(&self) -> usize {
        self.cell_to_half_by_edge.len() / 2
    }

    /// The half-face record referenced by a hanging face entry.
    pub fn half_face(&self, slot: usize) -> &[i64] {
        let s = self.half_stride();
        &self.cell_to_half[slot * s..(slot + 1) * s]
    }

    /// The half-edge record referenced by a hanging edge entry.
    pub fn half_edge(&self, slot: usize) -> &[i64] {
        &self.cell_to_half_by_edge[slot * 2..slot * 2 + 2]
    }
}

/// Subface this cell occupies on its double-size neighbor's face:
/// z-order over the face's tangential axes.
fn subface_index<const D: usize>(q: &Octant<D>, face: usize) -> usize {
    let axis = face / 2;
    let h = q.len();
    let mut sub = 0usize;
    let mut bit = 0;
    for t in (0..D).filter(|&t| t != axis) {
        if q.coords[t] & h != 0 {
            sub |= 1 << bit;
        }
        bit += 1;
    }
    sub
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octant::Quadrant;

    #[test]
    fn subface_positions() {
        // Children 2 and 3 of the root sit on its +y boundary; across a
        // -y face their subfaces are ordered by x.
        let kids = Quadrant::root().children();
        assert_eq!(subface_index(&kids[2], 2), 0);
        assert_eq!(subface_index(&kids[3], 2), 1);
        // Across an x face the subface is ordered by y.
        assert_eq!(subface_index(&kids[1], 0), 0);
        assert_eq!(subface_index(&kids[3], 0), 1);
    }
}
