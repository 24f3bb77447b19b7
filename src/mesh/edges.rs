//! Edge adjacency extraction (3D).
//!
//! An edge can be shared by up to four octants of mixed sizes, and its two
//! adjoining faces may independently be conforming or not, so edge-only
//! neighbors need their own traversal. Every geometric edge is visited
//! exactly once: cell edges are grouped by their carrying axis line, then
//! by the maximal dyadic segment present on that line. Each geometric edge
//! yields 1–4 sides, one per transverse quadrant around the line; a side
//! is either a full-size cell whose edge spans the whole segment or a
//! hanging pair of half-size cells covering it.
//!
//! Sides pair up exactly when they sit in diagonally opposite transverse
//! quadrants — equivalently, when they share neither adjoining face — so
//! at most two pairs exist and processing stops there. Every write is
//! mirrored into both sides' rows, and ghost sides never write (their
//! adjacency belongs to their owner), which makes the result independent
//! of which cell discovers the edge first.

use hashbrown::HashMap;
use itertools::Itertools;

use super::MeshConnectivity;
use crate::forest::Forest;
use crate::ghost::GhostLayer;
use crate::octant::transverse_axes;

const EDGES_PER_CELL: usize = 12;
/// Edge-code offset marking the hanging child aligned with the query edge.
const HANGING_ALIGNED: i8 = 24;
/// Edge-code offset marking the hanging child's sibling.
const HANGING_SIBLING: i8 = 48;

/// One cell edge lying on an axis line.
#[derive(Debug, Clone, Copy)]
struct EdgeEntry {
    /// Axial start of the edge segment.
    start: i32,
    /// Segment length (the cell length).
    len: i32,
    /// Combined cell index.
    cell: usize,
    /// Edge number within the cell (0..12).
    edge: u8,
    /// Transverse quadrant of the cell relative to the line (0..4).
    pos: u8,
}

/// One side of a geometric edge.
#[derive(Debug, Clone, Copy)]
struct EdgeSide {
    pos: u8,
    edge: u8,
    hanging: bool,
    /// Cell indices; `cells[1]` is meaningful only for hanging sides,
    /// ordered by ascending axial coordinate.
    cells: [usize; 2],
}

pub(super) fn fill_edge_tables<const D: usize>(
    forest: &Forest<D>,
    ghosts: &GhostLayer<D>,
    mesh: &mut MeshConnectivity,
) {
    if D != 3 {
        return;
    }
    let local_num = forest.local_num();
    let n = local_num + ghosts.num_ghosts();
    mesh.cell_to_cell_by_edge = vec![super::NO_NEIGHBOR; n * EDGES_PER_CELL];
    mesh.cell_to_edge = vec![-1i8; n * EDGES_PER_CELL];
    mesh.cell_to_half_by_edge = Vec::new();

    // Group every cell edge by its carrying line (axis, transverse coords).
    let mut lines: HashMap<(u8, i32, i32), Vec<EdgeEntry>> = HashMap::new();
    for (ci, q) in forest.octants().iter().chain(ghosts.octants()).enumerate() {
        let h = q.len();
        for e in 0..EDGES_PER_CELL {
            let axis = e / 4;
            let (t0, t1) = transverse_axes(axis);
            let b0 = (e & 1) as i32;
            let b1 = ((e >> 1) & 1) as i32;
            let u = q.coords[t0] + b0 * h;
            let v = q.coords[t1] + b1 * h;
            // The edge sits at the cell's min corner along an axis exactly
            // when the cell extends to the positive side of the line.
            let pos = ((1 - b0) | ((1 - b1) << 1)) as u8;
            lines.entry((axis as u8, u, v)).or_default().push(EdgeEntry {
                start: q.coords[axis],
                len: h,
                cell: ci,
                edge: e as u8,
                pos,
            });
        }
    }

    // Canonical processing order makes half-edge slot numbering
    // independent of hash iteration.
    for key in lines.keys().copied().sorted_unstable() {
        let entries = &lines[&key];
        let present: hashbrown::HashSet<(i32, i32)> =
            entries.iter().map(|en| (en.start, en.len)).collect();

        // Attach each entry to the maximal dyadic segment containing it.
        let mut groups: HashMap<(i32, i32), Vec<EdgeEntry>> = HashMap::new();
        for en in entries {
            let (mut s, mut len) = (en.start, en.len);
            loop {
                let parent = (s & !(2 * len - 1), 2 * len);
                if present.contains(&parent) {
                    (s, len) = parent;
                } else {
                    break;
                }
            }
            groups.entry((s, len)).or_default().push(*en);
        }

        for gk in groups.keys().copied().sorted_unstable() {
            if let Some(sides) = collect_sides(&groups[&gk], gk) {
                process_edge(&sides, local_num, mesh);
            }
        }
    }
}

/// Assemble the 1–4 sides of one geometric edge, ordered by quadrant.
fn collect_sides(entries: &[EdgeEntry], (gs, glen): (i32, i32)) -> Option<Vec<EdgeSide>> {
    let mut sides = Vec::with_capacity(4);
    for pos in 0..4u8 {
        let mut at_pos: Vec<&EdgeEntry> = entries.iter().filter(|en| en.pos == pos).collect();
        match at_pos.len() {
            0 => {}
            1 => {
                let en = at_pos[0];
                if en.start != gs || en.len != glen {
                    // Lone half segment: only possible on an unbalanced
                    // forest, where edge tables are undefined.
                    return None;
                }
                sides.push(EdgeSide {
                    pos,
                    edge: en.edge,
                    hanging: false,
                    cells: [en.cell, usize::MAX],
                });
            }
            2 => {
                at_pos.sort_by_key(|en| en.start);
                let (lo, hi) = (at_pos[0], at_pos[1]);
                if lo.len * 2 != glen || hi.len * 2 != glen || lo.edge != hi.edge {
                    return None;
                }
                sides.push(EdgeSide {
                    pos,
                    edge: lo.edge,
                    hanging: true,
                    cells: [lo.cell, hi.cell],
                });
            }
            _ => return None,
        }
    }
    Some(sides)
}

fn process_edge(sides: &[EdgeSide], local_num: usize, mesh: &mut MeshConnectivity) {
    // Boundary or conforming-pair edges: no edge-only neighbor, each
    // non-ghost side records itself.
    if sides.len() <= 2 {
        for side in sides {
            let count = if side.hanging { 2 } else { 1 };
            for &cell in &side.cells[..count] {
                if cell < local_num {
                    let row = cell * EDGES_PER_CELL + side.edge as usize;
                    mesh.cell_to_cell_by_edge[row] = cell as i64;
                    mesh.cell_to_edge[row] = side.edge as i8;
                }
            }
        }
        return;
    }

    // Sides pair iff they are diagonal across the line; at most 2 pairs.
    let mut pairs = 0;
    for i in 0..sides.len() {
        for j in (i + 1)..sides.len() {
            if sides[i].pos ^ sides[j].pos != 3 {
                continue;
            }
            write_pair(&sides[i], &sides[j], local_num, mesh);
            pairs += 1;
            if pairs == 2 {
                return;
            }
        }
    }
}

fn write_pair(a: &EdgeSide, b: &EdgeSide, local_num: usize, mesh: &mut MeshConnectivity) {
    let row = |cell: usize, edge: u8| cell * EDGES_PER_CELL + edge as usize;
    match (a.hanging, b.hanging) {
        (false, false) => {
            if a.cells[0] < local_num {
                let r = row(a.cells[0], a.edge);
                mesh.cell_to_cell_by_edge[r] = b.cells[0] as i64;
                mesh.cell_to_edge[r] = b.edge as i8;
            }
            if b.cells[0] < local_num {
                let r = row(b.cells[0], b.edge);
                mesh.cell_to_cell_by_edge[r] = a.cells[0] as i64;
                mesh.cell_to_edge[r] = a.edge as i8;
            }
        }
        (true, true) => {
            // Axially aligned halves see each other directly.
            for m in 0..2 {
                if a.cells[m] < local_num {
                    let r = row(a.cells[m], a.edge);
                    mesh.cell_to_cell_by_edge[r] = b.cells[m] as i64;
                    mesh.cell_to_edge[r] = b.edge as i8;
                }
                if b.cells[m] < local_num {
                    let r = row(b.cells[m], b.edge);
                    mesh.cell_to_cell_by_edge[r] = a.cells[m] as i64;
                    mesh.cell_to_edge[r] = a.edge as i8;
                }
            }
        }
        (false, true) => write_hanging(a, b, local_num, mesh),
        (true, false) => write_hanging(b, a, local_num, mesh),
    }
}

/// `full` is a full-size side facing the hanging pair `hang`.
fn write_hanging(full: &EdgeSide, hang: &EdgeSide, local_num: usize, mesh: &mut MeshConnectivity) {
    let row = |cell: usize, edge: u8| cell * EDGES_PER_CELL + edge as usize;
    if full.cells[0] < local_num {
        let slot = mesh.cell_to_half_by_edge.len() / 2;
        mesh.cell_to_half_by_edge.push(hang.cells[0] as i64);
        mesh.cell_to_half_by_edge.push(hang.cells[1] as i64);
        let r = row(full.cells[0], full.edge);
        mesh.cell_to_cell_by_edge[r] = slot as i64;
        mesh.cell_to_edge[r] = hang.edge as i8 - HANGING_ALIGNED;
    }
    if hang.cells[0] < local_num {
        let r = row(hang.cells[0], hang.edge);
        mesh.cell_to_cell_by_edge[r] = full.cells[0] as i64;
        mesh.cell_to_edge[r] = HANGING_ALIGNED + full.edge as i8;
    }
    if hang.cells[1] < local_num {
        let r = row(hang.cells[1], hang.edge);
        mesh.cell_to_cell_by_edge[r] = full.cells[0] as i64;
        mesh.cell_to_edge[r] = HANGING_SIBLING + full.edge as i8;
    }
}
