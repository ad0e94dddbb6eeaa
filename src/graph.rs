use fnv::FnvHashMap;
use petgraph::algo::dijkstra;
use petgraph::graph::{NodeIndex, UnGraph};

/// Undirected assembly graph over dense contig ids. Node `i` of the
/// underlying petgraph graph is contig `i`. Self-loops are dropped
/// and parallel edges collapsed when edges are added, so the graph
/// is always simple.
#[derive(Debug, Clone)]
pub struct AssemblyGraph {
    graph: UnGraph<(), ()>,
}

impl AssemblyGraph {
    pub fn new(node_count: usize) -> Self {
        let mut graph =
            UnGraph::with_capacity(node_count, node_count.saturating_mul(2));
        for _ in 0..node_count {
            graph.add_node(());
        }
        AssemblyGraph { graph }
    }

    /// Panics if either endpoint is out of range.
    pub fn from_edges<I>(node_count: usize, edges: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut graph = Self::new(node_count);
        for (a, b) in edges {
            graph.add_edge(a, b);
        }
        graph
    }

    /// Add an edge between two contigs. Returns false if the edge is
    /// a self-loop or already present.
    pub fn add_edge(&mut self, a: usize, b: usize) -> bool {
        assert!(
            a < self.node_count() && b < self.node_count(),
            "edge ({}, {}) out of range",
            a,
            b
        );
        if a == b {
            return false;
        }
        let (a, b) = (NodeIndex::new(a), NodeIndex::new(b));
        if self.graph.contains_edge(a, b) {
            return false;
        }
        self.graph.add_edge(a, b, ());
        true
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Neighbors of a contig, in ascending id order.
    pub fn neighbors(&self, contig: usize) -> Vec<usize> {
        let mut neighbors: Vec<usize> = self
            .graph
            .neighbors(NodeIndex::new(contig))
            .map(|n| n.index())
            .collect();
        neighbors.sort_unstable();
        neighbors
    }

    pub fn degree(&self, contig: usize) -> usize {
        self.graph.neighbors(NodeIndex::new(contig)).count()
    }

    pub fn is_isolated(&self, contig: usize) -> bool {
        self.graph
            .neighbors(NodeIndex::new(contig))
            .next()
            .is_none()
    }

    /// Number of contigs without any edge.
    pub fn isolated_count(&self) -> usize {
        (0..self.node_count())
            .filter(|&c| self.is_isolated(c))
            .count()
    }

    /// Hop distance from `source` to every contig reachable from it.
    pub fn distances_from(&self, source: usize) -> FnvHashMap<usize, usize> {
        dijkstra(&self.graph, NodeIndex::new(source), None, |_| 1usize)
            .into_iter()
            .map(|(node, dist)| (node.index(), dist))
            .collect()
    }

    pub fn shortest_path_len(&self, from: usize, to: usize) -> Option<usize> {
        let target = NodeIndex::new(to);
        dijkstra(&self.graph, NodeIndex::new(from), Some(target), |_| 1usize)
            .get(&target)
            .copied()
    }

    /// Mean shortest path length from `source` to each of `targets`,
    /// counting the contigs on the path (both ends included), so a
    /// neighbor is at length 2. A target that cannot be reached makes
    /// the mean infinite; an empty target list gives 0.
    pub fn mean_path_length(&self, source: usize, targets: &[usize]) -> f64 {
        if targets.is_empty() {
            return 0.0;
        }
        let distances = self.distances_from(source);
        let mut total = 0.0;
        for target in targets {
            match distances.get(target) {
                Some(&d) => total += (d + 1) as f64,
                None => return f64::INFINITY,
            }
        }
        total / targets.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(n: usize) -> AssemblyGraph {
        AssemblyGraph::from_edges(n, (1..n).map(|i| (i - 1, i)))
    }

    #[test]
    fn edges_are_simplified() {
        let mut graph = AssemblyGraph::new(3);
        assert!(graph.add_edge(0, 1));
        assert!(!graph.add_edge(1, 0));
        assert!(!graph.add_edge(2, 2));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.neighbors(1), vec![0]);
        assert!(graph.is_isolated(2));
        assert_eq!(graph.isolated_count(), 1);
    }

    #[test]
    fn path_distances() {
        let graph = path_graph(5);
        assert_eq!(graph.shortest_path_len(0, 4), Some(4));
        assert_eq!(graph.shortest_path_len(2, 2), Some(0));
        assert_eq!(graph.neighbors(2), vec![1, 3]);
        assert_eq!(graph.degree(0), 1);
        // Paths 0-1 and 0-1-2-3 hold 2 and 4 contigs.
        assert_eq!(graph.mean_path_length(0, &[1, 3]), 3.0);
        assert_eq!(graph.mean_path_length(2, &[2]), 1.0);
    }

    #[test]
    fn unreachable_targets_are_infinitely_far() {
        let graph = AssemblyGraph::from_edges(4, vec![(0, 1), (2, 3)]);
        assert_eq!(graph.shortest_path_len(0, 3), None);
        assert!(graph.mean_path_length(0, &[1, 3]).is_infinite());
        assert_eq!(graph.mean_path_length(0, &[]), 0.0);
    }
}
