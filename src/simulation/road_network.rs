//! Road network graph for multi-intersection layouts
//!
//! Intersections are petgraph nodes and road segments undirected edges.
//! The `(intersection, arm)` lookup is built once at construction so queries
//! never walk the raw segment list.

use anyhow::{bail, Result};
use ordered_float::OrderedFloat;
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::intersection::IntersectionNode;
use super::types::{Arm, IntersectionId, Position, ROAD_HALF_WIDTH, TERMINAL_ARM_LENGTH};

/// An undirected road connecting two intersection arms.
///
/// Cars leaving `from_id` through `from_arm` arrive at `to_id` on `to_arm`,
/// and the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoadSegment {
    pub from_id: IntersectionId,
    pub from_arm: Arm,
    pub to_id: IntersectionId,
    pub to_arm: Arm,
}

impl RoadSegment {
    pub fn new(from_id: IntersectionId, from_arm: Arm, to_id: IntersectionId, to_arm: Arm) -> Self {
        Self {
            from_id,
            from_arm,
            to_id,
            to_arm,
        }
    }
}

/// Graph of intersections connected by road segments
#[derive(Debug, Clone)]
pub struct RoadNetwork {
    /// Topology only; edge weights are the segments themselves
    graph: UnGraph<IntersectionId, RoadSegment>,

    /// Maps intersection IDs to their node indices in the graph
    node_index: HashMap<IntersectionId, NodeIndex>,

    /// Intersections in id order, so every sweep is deterministic
    intersections: BTreeMap<IntersectionId, IntersectionNode>,

    roads: Vec<RoadSegment>,

    /// (int_id, arm) -> (other_id, other_arm), both directions
    connections: HashMap<(IntersectionId, Arm), (IntersectionId, Arm)>,

    pub road_half_width: f64,
    pub terminal_arm_length: f64,
}

impl RoadNetwork {
    /// Build a network, rejecting layouts that could never be simulated:
    /// duplicate ids, self-referential segments, segments naming unknown
    /// intersections and arms claimed by more than one segment.
    pub fn new(intersections: Vec<IntersectionNode>, roads: Vec<RoadSegment>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for node in &intersections {
            if !seen.insert(node.id) {
                bail!("Duplicate intersection {}", node.id);
            }
        }

        let mut used_arms = BTreeSet::new();
        for road in &roads {
            if road.from_id == road.to_id {
                bail!(
                    "Road {}:{} -> {}:{} connects an intersection to itself",
                    road.from_id,
                    road.from_arm,
                    road.to_id,
                    road.to_arm
                );
            }
            for id in [road.from_id, road.to_id] {
                if !seen.contains(&id) {
                    bail!("Road references unknown intersection {}", id);
                }
            }
            for end in [(road.from_id, road.from_arm), (road.to_id, road.to_arm)] {
                if !used_arms.insert(end) {
                    bail!("Arm {}:{} is used by more than one road", end.0, end.1);
                }
            }
        }

        Ok(Self::assemble(intersections, roads))
    }

    /// Build without validation; callers guarantee the layout is sound.
    pub(crate) fn assemble(intersections: Vec<IntersectionNode>, roads: Vec<RoadSegment>) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut node_index = HashMap::new();
        let mut nodes = BTreeMap::new();

        for node in intersections {
            let index = graph.add_node(node.id);
            node_index.insert(node.id, index);
            nodes.insert(node.id, node);
        }

        let mut connections = HashMap::new();
        for road in &roads {
            if let (Some(a), Some(b)) = (node_index.get(&road.from_id), node_index.get(&road.to_id)) {
                graph.add_edge(*a, *b, *road);
            }
            connections.insert((road.from_id, road.from_arm), (road.to_id, road.to_arm));
            connections.insert((road.to_id, road.to_arm), (road.from_id, road.from_arm));
        }

        Self {
            graph,
            node_index,
            intersections: nodes,
            roads,
            connections,
            road_half_width: ROAD_HALF_WIDTH,
            terminal_arm_length: TERMINAL_ARM_LENGTH,
        }
    }

    pub fn intersection(&self, id: IntersectionId) -> Option<&IntersectionNode> {
        self.intersections.get(&id)
    }

    pub fn intersection_mut(&mut self, id: IntersectionId) -> Option<&mut IntersectionNode> {
        self.intersections.get_mut(&id)
    }

    /// All intersections in id order
    pub fn intersections(&self) -> impl Iterator<Item = &IntersectionNode> {
        self.intersections.values()
    }

    pub fn intersections_mut(&mut self) -> impl Iterator<Item = &mut IntersectionNode> {
        self.intersections.values_mut()
    }

    pub fn intersection_ids(&self) -> Vec<IntersectionId> {
        self.intersections.keys().copied().collect()
    }

    pub fn first_intersection_id(&self) -> Option<IntersectionId> {
        self.intersections.keys().next().copied()
    }

    pub fn roads(&self) -> &[RoadSegment] {
        &self.roads
    }

    pub fn intersection_count(&self) -> usize {
        self.intersections.len()
    }

    pub fn road_count(&self) -> usize {
        self.roads.len()
    }

    /// If `arm` of `id` leads to another intersection, where it arrives
    pub fn connected_arm(&self, id: IntersectionId, arm: Arm) -> Option<(IntersectionId, Arm)> {
        self.connections.get(&(id, arm)).copied()
    }

    pub fn is_terminal(&self, id: IntersectionId, arm: Arm) -> bool {
        !self.connections.contains_key(&(id, arm))
    }

    /// Every dead-end arm across the network; the only legal spawn points
    pub fn terminal_arms(&self) -> Vec<(IntersectionId, Arm)> {
        self.intersections
            .keys()
            .flat_map(|id| Arm::ALL.iter().map(move |arm| (*id, *arm)))
            .filter(|(id, arm)| self.is_terminal(*id, *arm))
            .collect()
    }

    /// Intersections sharing a road with `id`
    pub fn neighbors(&self, id: IntersectionId) -> Vec<IntersectionId> {
        let Some(index) = self.node_index.get(&id) else {
            return Vec::new();
        };
        let mut out: Vec<IntersectionId> = self
            .graph
            .neighbors(*index)
            .map(|n| self.graph[n])
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// True when every intersection can reach every other by road
    pub fn is_connected(&self) -> bool {
        self.graph.node_count() <= 1 || connected_components(&self.graph) == 1
    }

    /// Position and entry heading for a car `distance` metres out on `arm`,
    /// in the right-hand lane `lane_offset` from the centreline.
    pub fn arm_spawn_position(
        &self,
        id: IntersectionId,
        arm: Arm,
        distance: f64,
        lane_offset: f64,
    ) -> Option<(Position, Position)> {
        let node = self.intersections.get(&id)?;
        let c = node.center;
        let position = match arm {
            Arm::W => Position::new(c.x - distance, c.y - lane_offset),
            Arm::E => Position::new(c.x + distance, c.y + lane_offset),
            Arm::N => Position::new(c.x - lane_offset, c.y + distance),
            Arm::S => Position::new(c.x + lane_offset, c.y - distance),
        };
        Some((position, arm.entry_heading()))
    }

    /// Far endpoint when leaving `id` through `arm`: the neighbouring
    /// centre for a connected arm, the end of the stub for a terminal one.
    pub fn arm_exit_position(&self, id: IntersectionId, arm: Arm) -> Option<Position> {
        if let Some((other_id, _)) = self.connected_arm(id, arm) {
            return self.intersections.get(&other_id).map(|n| n.center);
        }
        let c = self.intersections.get(&id)?.center;
        let length = self.terminal_arm_length;
        Some(match arm {
            Arm::E => Position::new(c.x + length, c.y),
            Arm::W => Position::new(c.x - length, c.y),
            Arm::N => Position::new(c.x, c.y + length),
            Arm::S => Position::new(c.x, c.y - length),
        })
    }

    /// World bounds `((min_x, max_x), (min_y, max_y))`, widened in the
    /// narrow dimension to match the screen aspect ratio.
    pub fn get_bounds(&self, screen_width: f64, screen_height: f64, base_margin: f64) -> ((f64, f64), (f64, f64)) {
        if self.intersections.is_empty() {
            return ((-100.0, 100.0), (-100.0, 100.0));
        }

        let xs = self.intersections.values().map(|n| n.center.x);
        let ys = self.intersections.values().map(|n| n.center.y);
        let min_x = xs.clone().fold(f64::INFINITY, f64::min);
        let max_x = xs.fold(f64::NEG_INFINITY, f64::max);
        let min_y = ys.clone().fold(f64::INFINITY, f64::min);
        let max_y = ys.fold(f64::NEG_INFINITY, f64::max);

        let net_width = if max_x > min_x { max_x - min_x } else { 1.0 };
        let net_height = if max_y > min_y { max_y - min_y } else { 1.0 };
        let screen_aspect = screen_width / screen_height.max(1.0);
        let net_aspect = net_width / net_height;

        let (margin_x, margin_y) = if net_aspect < screen_aspect {
            let target_width = net_height * screen_aspect;
            (base_margin + (target_width - net_width) / 2.0, base_margin)
        } else {
            let target_height = net_width / screen_aspect;
            (base_margin, base_margin + (target_height - net_height) / 2.0)
        };

        (
            (min_x - margin_x, max_x + margin_x),
            (min_y - margin_y, max_y + margin_y),
        )
    }

    /// `(intersections, distinct columns, distinct rows)`
    pub fn grid_info(&self) -> (usize, usize, usize) {
        let cols: BTreeSet<OrderedFloat<f64>> = self
            .intersections
            .values()
            .map(|n| OrderedFloat(n.center.x))
            .collect();
        let rows: BTreeSet<OrderedFloat<f64>> = self
            .intersections
            .values()
            .map(|n| OrderedFloat(n.center.y))
            .collect();
        (self.intersections.len(), cols.len(), rows.len())
    }
}
