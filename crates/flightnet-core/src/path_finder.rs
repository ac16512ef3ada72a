//! Shortest-path distance from every point to the nearest semaphore.
//!
//! The graph is rebuilt from scratch on every topology change. Graph nodes
//! are equivalence ids, so coincident points of different segments collapse
//! into one node (single hop only, like the topology model).

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use crate::geometry::distance_3d;
use crate::models::NodeType;
use crate::topology::{PointId, Topology};

#[derive(Debug, Clone, Copy)]
struct Cost(f64);

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathFinder {
    /// Point id -> graph node id
    node_of: HashMap<PointId, PointId>,
    adjacency: HashMap<PointId, Vec<(PointId, f64)>>,
    semaphores: HashSet<PointId>,
    /// Graph node id -> distance to the nearest semaphore
    distances: HashMap<PointId, f64>,
}

impl PathFinder {
    pub fn new(topology: &Topology) -> Self {
        let mut finder = Self::default();
        finder.build_graph(topology);
        finder.compute_distances();
        finder
    }

    fn node(&self, point: PointId) -> PointId {
        self.node_of.get(&point).copied().unwrap_or(point)
    }

    fn build_graph(&mut self, topology: &Topology) {
        for segment in topology.segments() {
            for point in topology.segment_points(segment.id) {
                self.node_of.insert(point.id, topology.resolve_equivalence_id(point.id));
                if point.marker == Some(NodeType::Semaphore) {
                    self.semaphores.insert(point.id);
                }
            }
        }

        let mut visited: HashSet<PointId> = HashSet::new();
        for segment in topology.segments() {
            for (index, point) in segment.points.iter().enumerate() {
                let Some(p) = topology.point(*point) else {
                    continue;
                };
                let node = self.node(p.id);
                let mut bound: Vec<PointId> = p.bound.iter().copied().collect();
                if !bound.is_empty()
                    && (visited.contains(&node) || bound.iter().any(|b| visited.contains(&self.node(*b))))
                {
                    // Neighbours were already recorded through a coincident point.
                    continue;
                }

                let mut connected = Vec::new();
                self.connected_points(topology, &segment.points, index, &mut bound, &visited, &mut connected);
                for other in connected {
                    let Some(other_point) = topology.point(other) else {
                        continue;
                    };
                    let weight = distance_3d(&p.position, &other_point.position);
                    self.add_edge(node, self.node(other), weight);
                }
                visited.insert(node);
            }
        }
    }

    /// Previous and next points of `points[index]`, followed by those of every
    /// bound point. A neighbour with an already visited bound point is
    /// replaced by that bound point.
    fn connected_points(
        &self,
        topology: &Topology,
        points: &[PointId],
        index: usize,
        bound: &mut Vec<PointId>,
        visited: &HashSet<PointId>,
        out: &mut Vec<PointId>,
    ) {
        let neighbours = [index.checked_add(1), index.checked_sub(1)];
        for neighbour in neighbours.into_iter().flatten() {
            let Some(id) = points.get(neighbour).copied() else {
                continue;
            };
            let traversed = topology
                .bound_points(id)
                .find(|b| visited.contains(&self.node(*b)));
            out.push(traversed.unwrap_or(id));
        }

        if let Some(bound_point) = bound.pop() {
            let Some(segment) = topology.point(bound_point).and_then(|p| topology.segment(p.segment)) else {
                return;
            };
            if let Some(position) = segment.points.iter().position(|id| *id == bound_point) {
                self.connected_points(topology, &segment.points, position, bound, visited, out);
            }
        }
    }

    fn add_edge(&mut self, a: PointId, b: PointId, weight: f64) {
        if a == b {
            return;
        }
        for (from, to) in [(a, b), (b, a)] {
            let edges = self.adjacency.entry(from).or_default();
            match edges.iter_mut().find(|(id, _)| *id == to) {
                Some(edge) => edge.1 = edge.1.min(weight),
                None => edges.push((to, weight)),
            }
        }
    }

    /// Multi-source Dijkstra from every semaphore node.
    fn compute_distances(&mut self) {
        let mut heap: BinaryHeap<Reverse<(Cost, PointId)>> = BinaryHeap::new();
        let sources: HashSet<PointId> = self.semaphores.iter().map(|p| self.node(*p)).collect();
        for source in sources {
            self.distances.insert(source, 0.0);
            heap.push(Reverse((Cost(0.0), source)));
        }

        while let Some(Reverse((Cost(cost), node))) = heap.pop() {
            if self.distances.get(&node).is_some_and(|best| cost > *best) {
                continue;
            }
            let Some(edges) = self.adjacency.get(&node) else {
                continue;
            };
            for (next, weight) in edges {
                let candidate = cost + weight;
                if self.distances.get(next).map_or(true, |best| candidate < *best) {
                    self.distances.insert(*next, candidate);
                    heap.push(Reverse((Cost(candidate), *next)));
                }
            }
        }
    }

    /// Distance in meters to the nearest semaphore. `None` for semaphores
    /// themselves and for points with no path to one.
    pub fn distance_to_nearest_semaphore(&self, point: PointId) -> Option<f64> {
        if self.semaphores.contains(&point) {
            return None;
        }
        self.distances.get(&self.node(point)).copied()
    }

    /// Operator-facing label, e.g. `"125 m"`, or empty.
    pub fn label(&self, point: PointId) -> String {
        self.distance_to_nearest_semaphore(point)
            .map(|d| format!("{} m", d.round() as i64))
            .unwrap_or_default()
    }

    /// Labels for every point of the topology.
    pub fn labels(&self) -> BTreeMap<PointId, String> {
        self.node_of.keys().map(|id| (*id, self.label(*id))).collect()
    }
}
