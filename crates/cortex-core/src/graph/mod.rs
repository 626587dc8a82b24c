//! Graph engine
//!
//! Bounded breadth-first traversal over memory edges plus in-degree
//! centrality. Edge-type, direction, and strength filters are applied when
//! the adjacency maps are built, so traversal itself only walks.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{CortexError, Result};
use crate::model::{Edge, RelationType};

/// Default BFS depth bound
pub const DEFAULT_MAX_DEPTH: u32 = 2;

/// Upper limit on the depth bound
pub const MAX_DEPTH_LIMIT: u32 = 10;

// ============================================================================
// OPTIONS
// ============================================================================

/// Which edge ends a traversal step may cross
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Follow edges source -> target
    Outgoing,
    /// Follow edges target -> source
    Incoming,
    /// Follow both ends
    #[default]
    Both,
}

impl std::str::FromStr for Direction {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "outgoing" => Ok(Direction::Outgoing),
            "incoming" => Ok(Direction::Incoming),
            "both" => Ok(Direction::Both),
            other => Err(CortexError::InvalidInput(format!(
                "unknown direction: {other}"
            ))),
        }
    }
}

/// Traversal options
#[derive(Debug, Clone)]
pub struct TraverseOptions {
    /// Depth bound, 0..=10
    pub max_depth: u32,
    pub direction: Direction,
    /// Only edges of these types participate; None means all types
    pub relation_types: Option<HashSet<RelationType>>,
    /// Only edges at least this strong participate
    pub min_strength: f64,
}

impl Default for TraverseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            direction: Direction::Both,
            relation_types: None,
            min_strength: 0.0,
        }
    }
}

impl TraverseOptions {
    /// Reject out-of-range depth and strength before any work happens.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth > MAX_DEPTH_LIMIT {
            return Err(CortexError::InvalidInput(format!(
                "max depth {} outside 0..={MAX_DEPTH_LIMIT}",
                self.max_depth
            )));
        }
        if !(0.0..=1.0).contains(&self.min_strength) {
            return Err(CortexError::InvalidInput(format!(
                "min strength {} outside [0, 1]",
                self.min_strength
            )));
        }
        Ok(())
    }
}

// ============================================================================
// GRAPH
// ============================================================================

/// A traversal hit: a reached memory, how deep, and the edges walked.
#[derive(Debug, Clone)]
pub struct TraversalHit {
    pub memory_id: String,
    pub depth: u32,
    /// Edges from the start node to this node, in walk order
    pub path: Vec<Edge>,
}

/// Adjacency view over a set of edges, filters applied at build time
pub struct MemoryGraph {
    /// node id -> edges leaving it (after filters)
    out_adjacency: HashMap<String, Vec<Edge>>,
    /// node id -> edges entering it (after filters)
    in_adjacency: HashMap<String, Vec<Edge>>,
}

impl MemoryGraph {
    /// Build adjacency maps, keeping only edges whose relation type is in
    /// the requested set (when given) and whose strength clears the floor.
    pub fn build(
        edges: &[Edge],
        relation_types: Option<&HashSet<RelationType>>,
        min_strength: f64,
    ) -> MemoryGraph {
        let mut out_adjacency: HashMap<String, Vec<Edge>> = HashMap::new();
        let mut in_adjacency: HashMap<String, Vec<Edge>> = HashMap::new();

        for edge in edges {
            if let Some(types) = relation_types {
                if !types.contains(&edge.relation_type) {
                    continue;
                }
            }
            if edge.strength < min_strength {
                continue;
            }
            out_adjacency
                .entry(edge.source_id.clone())
                .or_default()
                .push(edge.clone());
            in_adjacency
                .entry(edge.target_id.clone())
                .or_default()
                .push(edge.clone());
        }

        MemoryGraph {
            out_adjacency,
            in_adjacency,
        }
    }

    /// Breadth-first traversal from `start`, lazily yielding hits in BFS
    /// order. The visited set is seeded with `start`, so cycles cannot
    /// re-yield a node and the start node itself never appears.
    pub fn traverse(&self, start: &str, options: &TraverseOptions) -> Traversal<'_> {
        let mut visited = HashSet::new();
        visited.insert(start.to_string());

        let mut queue = VecDeque::new();
        queue.push_back((start.to_string(), 0_u32, Vec::new()));

        Traversal {
            graph: self,
            options: options.clone(),
            visited,
            queue,
        }
    }

    /// Normalized in-degree per node: incoming edge count divided by the
    /// maximum in-degree, or 0.0 for every node when there are no edges.
    /// Nodes absent from the map have centrality 0.
    pub fn centrality(&self) -> HashMap<String, f64> {
        let max_in_degree = self
            .in_adjacency
            .values()
            .map(Vec::len)
            .max()
            .unwrap_or(0);

        if max_in_degree == 0 {
            return HashMap::new();
        }

        self.in_adjacency
            .iter()
            .map(|(id, edges)| (id.clone(), edges.len() as f64 / max_in_degree as f64))
            .collect()
    }
}

/// Lazy BFS sequence produced by [`MemoryGraph::traverse`]
pub struct Traversal<'g> {
    graph: &'g MemoryGraph,
    options: TraverseOptions,
    visited: HashSet<String>,
    queue: VecDeque<(String, u32, Vec<Edge>)>,
}

impl Traversal<'_> {
    /// Neighbors of a node under the configured direction. Bidirectional
    /// edges are walkable from either end regardless of direction.
    fn neighbors(&self, node: &str) -> Vec<(String, Edge)> {
        let mut result = Vec::new();

        if matches!(self.options.direction, Direction::Outgoing | Direction::Both) {
            if let Some(edges) = self.graph.out_adjacency.get(node) {
                for edge in edges {
                    result.push((edge.target_id.clone(), edge.clone()));
                }
            }
        }
        if matches!(self.options.direction, Direction::Incoming | Direction::Both) {
            if let Some(edges) = self.graph.in_adjacency.get(node) {
                for edge in edges {
                    result.push((edge.source_id.clone(), edge.clone()));
                }
            }
        }
        if self.options.direction != Direction::Both {
            // Bidirectional edges walk against the grain too
            let reverse = match self.options.direction {
                Direction::Outgoing => self.graph.in_adjacency.get(node),
                Direction::Incoming => self.graph.out_adjacency.get(node),
                Direction::Both => None,
            };
            if let Some(edges) = reverse {
                for edge in edges.iter().filter(|e| e.bidirectional) {
                    let other = if edge.source_id == node {
                        edge.target_id.clone()
                    } else {
                        edge.source_id.clone()
                    };
                    result.push((other, edge.clone()));
                }
            }
        }

        result
    }
}

impl Iterator for Traversal<'_> {
    type Item = TraversalHit;

    fn next(&mut self) -> Option<TraversalHit> {
        while let Some((node, depth, path)) = self.queue.pop_front() {
            if depth < self.options.max_depth {
                for (neighbor, edge) in self.neighbors(&node) {
                    if self.visited.insert(neighbor.clone()) {
                        let mut next_path = path.clone();
                        next_path.push(edge);
                        self.queue.push_back((neighbor, depth + 1, next_path));
                    }
                }
            }
            if depth > 0 {
                return Some(TraversalHit {
                    memory_id: node,
                    depth,
                    path,
                });
            }
        }
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================
