//! Seeded default layout: a small randomized grid of intersections

use petgraph::algo::connected_components;
use petgraph::graph::UnGraph;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::intersection::IntersectionNode;
use super::road_network::{RoadNetwork, RoadSegment};
use super::types::{Arm, Axis, IntersectionId, INTERSECTION_SEPARATION};

/// (row, col) in the layout grid; row grows northward, col eastward
type Cell = (usize, usize);

/// Build a random 2x2 to 3x3 grid of intersections.
///
/// Up to two cells are dropped while keeping the grid connected, an L-shaped
/// gap is patched by re-adding its missing corner, and the final count is
/// forced even. Alternate intersections get semaphores; each one draws its
/// own priority axis. The same seed always yields the same network.
pub fn default_network(seed: u64) -> RoadNetwork {
    let mut rng = StdRng::seed_from_u64(seed);

    let rows = rng.random_range(2..=3usize);
    let cols = rng.random_range(2..=3usize);

    let all_cells: Vec<Cell> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .collect();

    let min_count = (rows * cols).saturating_sub(2).max(2);
    let count = rng.random_range(min_count..=rows * cols);

    let mut cells: BTreeSet<Cell> = all_cells.iter().copied().collect();
    if count < all_cells.len() {
        let mut candidates = all_cells.clone();
        candidates.shuffle(&mut rng);
        for cell in candidates {
            if cells.len() <= count {
                break;
            }
            let mut trial = cells.clone();
            trial.remove(&cell);
            if cells_connected(&trial) {
                cells = trial;
            }
        }
    }

    fill_missing_corners(&mut cells, rows, cols);
    make_even(&mut cells, rows, cols);

    let offset_x = -((cols - 1) as f64) * INTERSECTION_SEPARATION / 2.0;
    let offset_y = -((rows - 1) as f64) * INTERSECTION_SEPARATION / 2.0;
    let total = cells.len();

    let mut nodes = Vec::with_capacity(total);
    let mut ids: BTreeMap<Cell, IntersectionId> = BTreeMap::new();
    for (i, (r, c)) in cells.iter().enumerate() {
        let id = IntersectionId::new(i);
        let has_semaphore = if total > 2 { i % 2 == 0 } else { true };
        let priority_axis = if rng.random_bool(0.5) { Axis::NS } else { Axis::EW };
        nodes.push(IntersectionNode::new(
            id,
            offset_x + *c as f64 * INTERSECTION_SEPARATION,
            offset_y + *r as f64 * INTERSECTION_SEPARATION,
            has_semaphore,
            priority_axis,
        ));
        ids.insert((*r, *c), id);
    }

    let mut roads = Vec::new();
    for (&(r, c), &id) in &ids {
        if let Some(&east) = ids.get(&(r, c + 1)) {
            roads.push(RoadSegment::new(id, Arm::E, east, Arm::W));
        }
        if let Some(&north) = ids.get(&(r + 1, c)) {
            roads.push(RoadSegment::new(id, Arm::N, north, Arm::S));
        }
    }

    RoadNetwork::assemble(nodes, roads)
}

/// True when the occupied cells form one 4-connected group.
fn cells_connected(cells: &BTreeSet<Cell>) -> bool {
    if cells.len() <= 1 {
        return true;
    }
    let mut graph: UnGraph<Cell, ()> = UnGraph::new_undirected();
    let index: HashMap<Cell, _> = cells.iter().map(|cell| (*cell, graph.add_node(*cell))).collect();
    for &(r, c) in cells {
        for neighbor in [(r, c + 1), (r + 1, c)] {
            if let Some(&other) = index.get(&neighbor) {
                graph.add_edge(index[&(r, c)], other, ());
            }
        }
    }
    connected_components(&graph) == 1
}

/// Re-add the fourth corner of any 2x2 block that has exactly three cells.
fn fill_missing_corners(cells: &mut BTreeSet<Cell>, rows: usize, cols: usize) {
    let snapshot: Vec<Cell> = cells.iter().copied().collect();
    for (r, c) in snapshot {
        let r = r as isize;
        let c = c as isize;
        for (dr, dc) in [(1, 1), (1, -1), (-1, 1), (-1, -1)] {
            let side_a = (r, c + dc);
            let side_b = (r + dr, c);
            let corner = (r + dr, c + dc);
            let occupied = |cell: (isize, isize)| {
                in_bounds(cell, rows, cols) && cells.contains(&(cell.0 as usize, cell.1 as usize))
            };
            if occupied(side_a) && occupied(side_b) && in_bounds(corner, rows, cols) && !occupied(corner) {
                cells.insert((corner.0 as usize, corner.1 as usize));
            }
        }
    }
}

/// Add an adjacent free cell, or drop a corner from a full grid, so the
/// intersection count is even.
fn make_even(cells: &mut BTreeSet<Cell>, rows: usize, cols: usize) {
    if cells.len() % 2 == 0 {
        return;
    }

    let snapshot: Vec<Cell> = cells.iter().copied().collect();
    for (r, c) in snapshot {
        let (r, c) = (r as isize, c as isize);
        for neighbor in [(r - 1, c), (r + 1, c), (r, c - 1), (r, c + 1)] {
            let free = (neighbor.0 as usize, neighbor.1 as usize);
            if in_bounds(neighbor, rows, cols) && !cells.contains(&free) {
                cells.insert(free);
                return;
            }
        }
    }

    if cells.len() > 2 {
        let corners = [(0, 0), (0, cols - 1), (rows - 1, 0), (rows - 1, cols - 1)];
        for corner in corners {
            if !cells.contains(&corner) {
                continue;
            }
            let mut trial = cells.clone();
            trial.remove(&corner);
            if cells_connected(&trial) {
                *cells = trial;
                return;
            }
        }
    }
}

fn in_bounds(cell: (isize, isize), rows: usize, cols: usize) -> bool {
    cell.0 >= 0 && cell.1 >= 0 && (cell.0 as usize) < rows && (cell.1 as usize) < cols
}
