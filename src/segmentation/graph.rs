//! s-t min-cut on a pixel graph (Dinic's max-flow)
//!
//! Nodes are pixels. Every node may carry a capacity from the source and a
//! capacity to the sink; neighbouring nodes are joined by a pair of directed
//! edges. After [`FlowGraph::max_flow`] the nodes still reachable from the
//! source in the residual graph form the source segment.

#![allow(clippy::indexing_slicing)]

use std::collections::VecDeque;

const EPS: f64 = 1e-9;

/// Flow network with an implicit source and sink
#[derive(Debug, Clone)]
pub struct FlowGraph {
    node_count: usize,
    heads: Vec<usize>,
    capacity: Vec<f64>,
    adjacency: Vec<Vec<usize>>,
    level: Vec<i32>,
    flow: f64,
}

impl FlowGraph {
    /// Graph with no nodes, reserving room for `nodes` and `edges`
    #[must_use]
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        let mut adjacency = Vec::with_capacity(nodes + 2);
        // source and sink
        adjacency.push(Vec::new());
        adjacency.push(Vec::new());
        Self {
            node_count: 0,
            heads: Vec::with_capacity(2 * edges),
            capacity: Vec::with_capacity(2 * edges),
            adjacency,
            level: Vec::new(),
            flow: 0.0,
        }
    }

    const SOURCE: usize = 0;
    const SINK: usize = 1;

    fn internal(node: usize) -> usize {
        node + 2
    }

    /// Append one node and return its index
    pub fn add_node(&mut self) -> usize {
        self.adjacency.push(Vec::new());
        self.node_count += 1;
        self.node_count - 1
    }

    /// Append `count` nodes and return the index of the first
    pub fn add_nodes(&mut self, count: usize) -> usize {
        let first = self.node_count;
        for _ in 0..count {
            self.add_node();
        }
        first
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    fn push_edge(&mut self, from: usize, to: usize, cap: f64, rev_cap: f64) {
        let forward = self.heads.len();
        self.heads.push(to);
        self.capacity.push(cap);
        self.adjacency[from].push(forward);
        self.heads.push(from);
        self.capacity.push(rev_cap);
        self.adjacency[to].push(forward + 1);
    }

    /// Set source and sink capacities for `node`
    ///
    /// Only the difference matters for the cut; the common part is counted
    /// as flow directly.
    pub fn add_term_weights(&mut self, node: usize, source_weight: f64, sink_weight: f64) {
        let shared = source_weight.min(sink_weight);
        self.flow += shared;
        let v = Self::internal(node);
        let from_source = source_weight - shared;
        let to_sink = sink_weight - shared;
        if from_source > EPS {
            self.push_edge(Self::SOURCE, v, from_source, 0.0);
        }
        if to_sink > EPS {
            self.push_edge(v, Self::SINK, to_sink, 0.0);
        }
    }

    /// Join `i` and `j` with capacity `weight` from i to j and `rev_weight` back
    pub fn add_edge(&mut self, i: usize, j: usize, weight: f64, rev_weight: f64) {
        self.push_edge(Self::internal(i), Self::internal(j), weight, rev_weight);
    }

    fn build_levels(&mut self) -> bool {
        self.level.clear();
        self.level.resize(self.adjacency.len(), -1);
        self.level[Self::SOURCE] = 0;

        let mut queue = VecDeque::from([Self::SOURCE]);
        while let Some(v) = queue.pop_front() {
            for &e in &self.adjacency[v] {
                let to = self.heads[e];
                if self.capacity[e] > EPS && self.level[to] < 0 {
                    self.level[to] = self.level[v] + 1;
                    queue.push_back(to);
                }
            }
        }
        self.level[Self::SINK] >= 0
    }

    fn blocking_flow(&mut self) -> f64 {
        let mut next = vec![0usize; self.adjacency.len()];
        let mut path: Vec<usize> = Vec::new();
        let mut total = 0.0;
        let mut v = Self::SOURCE;

        loop {
            if v == Self::SINK {
                let bottleneck = path
                    .iter()
                    .map(|&e| self.capacity[e])
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.capacity[e] -= bottleneck;
                    self.capacity[e ^ 1] += bottleneck;
                }
                total += bottleneck;
                path.clear();
                v = Self::SOURCE;
                continue;
            }

            let mut advanced = false;
            while next[v] < self.adjacency[v].len() {
                let e = self.adjacency[v][next[v]];
                let to = self.heads[e];
                if self.capacity[e] > EPS && self.level[to] == self.level[v] + 1 {
                    path.push(e);
                    v = to;
                    advanced = true;
                    break;
                }
                next[v] += 1;
            }
            if advanced {
                continue;
            }

            // dead end: retreat one edge
            match path.pop() {
                Some(e) => {
                    v = self.heads[e ^ 1];
                    next[v] += 1;
                },
                None => break,
            }
        }
        total
    }

    /// Run max-flow to completion and return the flow value
    pub fn max_flow(&mut self) -> f64 {
        while self.build_levels() {
            self.flow += self.blocking_flow();
        }
        self.flow
    }

    /// Whether `node` ended on the source side of the minimum cut
    ///
    /// Only meaningful after [`FlowGraph::max_flow`].
    #[must_use]
    pub fn in_source_segment(&self, node: usize) -> bool {
        self.level
            .get(Self::internal(node))
            .is_some_and(|&level| level >= 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_node_cut() {
        let mut graph = FlowGraph::with_capacity(2, 1);
        let a = graph.add_node();
        let b = graph.add_node();
        graph.add_term_weights(a, 10.0, 0.0);
        graph.add_term_weights(b, 0.0, 10.0);
        graph.add_edge(a, b, 3.0, 3.0);

        let flow = graph.max_flow();
        assert!((flow - 3.0).abs() < 1e-9);
        assert!(graph.in_source_segment(a));
        assert!(!graph.in_source_segment(b));
    }

    #[test]
    fn test_shared_terminal_capacity_counts_as_flow() {
        let mut graph = FlowGraph::with_capacity(1, 0);
        let a = graph.add_node();
        graph.add_term_weights(a, 5.0, 2.0);
        assert!((graph.max_flow() - 2.0).abs() < 1e-9);
        assert!(graph.in_source_segment(a));
    }

    #[test]
    fn test_chain_cuts_weakest_link() {
        let mut graph = FlowGraph::with_capacity(4, 3);
        let first = graph.add_nodes(4);
        assert_eq!(first, 0);
        assert_eq!(graph.node_count(), 4);

        graph.add_term_weights(0, 100.0, 0.0);
        graph.add_term_weights(3, 0.0, 100.0);
        graph.add_edge(0, 1, 9.0, 9.0);
        graph.add_edge(1, 2, 1.0, 1.0);
        graph.add_edge(2, 3, 9.0, 9.0);

        assert!((graph.max_flow() - 1.0).abs() < 1e-9);
        assert!(graph.in_source_segment(0));
        assert!(graph.in_source_segment(1));
        assert!(!graph.in_source_segment(2));
        assert!(!graph.in_source_segment(3));
    }

    #[test]
    fn test_parallel_paths() {
        let mut graph = FlowGraph::with_capacity(4, 4);
        graph.add_nodes(4);
        graph.add_term_weights(0, 10.0, 0.0);
        graph.add_term_weights(3, 0.0, 10.0);
        graph.add_edge(0, 1, 2.0, 0.0);
        graph.add_edge(0, 2, 3.0, 0.0);
        graph.add_edge(1, 3, 4.0, 0.0);
        graph.add_edge(2, 3, 1.0, 0.0);

        assert!((graph.max_flow() - 3.0).abs() < 1e-9);
    }
}
