//! Bounded A* search over an explicit node/link graph.
//!
//! The graph stores a payload per node and per link; the caller supplies the
//! f-cost (accumulated cost plus heuristic) at solve time, so the same graph
//! can serve different heuristics.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A link between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct AStarLink<L> {
    /// The two linked nodes.
    pub nodes: [usize; 2],
    /// Cost of traversing the link.
    pub cost: f64,
    /// Link payload.
    pub data: L,
}

impl<L> AStarLink<L> {
    /// The node at the other end of the link from `node`.
    #[inline]
    pub fn other(&self, node: usize) -> usize {
        if self.nodes[0] == node {
            self.nodes[1]
        } else {
            self.nodes[0]
        }
    }
}

/// Undirected graph with node payloads `N` and link payloads `L`.
#[derive(Debug, Clone, Default)]
pub struct AStarGraph<N, L> {
    nodes: Vec<N>,
    neighbors: Vec<Vec<usize>>,
    links: Vec<AStarLink<L>>,
}

impl<N: Default + Clone, L> AStarGraph<N, L> {
    /// A graph with `num_nodes` default-initialized nodes and no links.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            nodes: vec![N::default(); num_nodes],
            neighbors: vec![Vec::new(); num_nodes],
            links: Vec::new(),
        }
    }
}

impl<N, L> AStarGraph<N, L> {
    /// Number of nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of links.
    #[inline]
    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    /// Payload of `node`.
    #[inline]
    pub fn node(&self, node: usize) -> &N {
        &self.nodes[node]
    }

    /// Replace the payload of `node`.
    #[inline]
    pub fn set_node(&mut self, node: usize, data: N) {
        self.nodes[node] = data;
    }

    /// Link `link`.
    #[inline]
    pub fn link(&self, link: usize) -> &AStarLink<L> {
        &self.links[link]
    }

    /// Links touching `node`, in insertion order.
    #[inline]
    pub fn node_links(&self, node: usize) -> &[usize] {
        &self.neighbors[node]
    }

    /// Link `a` and `b`; returns the new link index.
    pub fn add_link(&mut self, a: usize, b: usize, cost: f64, data: L) -> usize {
        let index = self.links.len();
        self.links.push(AStarLink {
            nodes: [a, b],
            cost,
            data,
        });
        self.neighbors[a].push(index);
        self.neighbors[b].push(index);
        index
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    node: usize,
    f_cost: f64,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f_cost == other.f_cost
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .f_cost
            .partial_cmp(&self.f_cost)
            .unwrap_or(Ordering::Equal)
    }
}

/// Reusable search state for one graph.
///
/// After a successful [`solve`](Self::solve) the path can be walked back
/// from the destination with [`path_back`](Self::path_back).
#[derive(Debug, Clone, Default)]
pub struct AStarSolver {
    g_costs: Vec<f64>,
    g_steps: Vec<usize>,
    prev_nodes: Vec<Option<usize>>,
    prev_links: Vec<Option<usize>>,
    done: Vec<bool>,
    open: BinaryHeap<OpenEntry>,
    steps: usize,
}

impl AStarSolver {
    /// Create a solver; buffers are sized on each solve.
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self, num_nodes: usize) {
        self.g_costs.clear();
        self.g_costs.resize(num_nodes, f64::MAX);
        self.g_steps.clear();
        self.g_steps.resize(num_nodes, 0);
        self.prev_nodes.clear();
        self.prev_nodes.resize(num_nodes, None);
        self.prev_links.clear();
        self.prev_links.resize(num_nodes, None);
        self.done.clear();
        self.done.resize(num_nodes, false);
        self.open.clear();
        self.steps = 0;
    }

    /// Search a path from `src` to `dst`.
    ///
    /// `f_cost(link, g_curr, next, dst)` returns the priority of reaching
    /// `next` through `link` from a node with accumulated cost `g_curr`; it is
    /// called with `link = None` for the start node. Nodes more than
    /// `max_steps` links away from `src` are not expanded (`0` means
    /// unbounded).
    ///
    /// Returns the number of links on the path found, `Some(0)` when
    /// `src == dst`.
    pub fn solve<N, L, F>(
        &mut self,
        graph: &AStarGraph<N, L>,
        src: usize,
        dst: usize,
        max_steps: usize,
        mut f_cost: F,
    ) -> Option<usize>
    where
        F: FnMut(Option<&AStarLink<L>>, f64, usize, usize) -> f64,
    {
        self.reset(graph.num_nodes());
        self.g_costs[src] = 0.0;
        if src == dst {
            return Some(0);
        }

        self.open.push(OpenEntry {
            node: src,
            f_cost: f_cost(None, 0.0, src, dst),
        });

        while let Some(OpenEntry { node: curr, .. }) = self.open.pop() {
            // Nodes are pushed again on every improvement; later copies are stale.
            if self.done[curr] {
                continue;
            }
            self.done[curr] = true;

            if max_steps > 0 && self.g_steps[curr] > max_steps {
                continue;
            }
            if curr == dst {
                self.steps = self.g_steps[curr];
                return Some(self.steps);
            }

            for &link_index in graph.node_links(curr) {
                let link = graph.link(link_index);
                let next = link.other(curr);
                if self.done[next] {
                    continue;
                }
                let g = self.g_costs[curr] + link.cost;
                if self.prev_nodes[next].is_none() || g < self.g_costs[next] {
                    self.prev_nodes[next] = Some(curr);
                    self.prev_links[next] = Some(link_index);
                    self.g_costs[next] = g;
                    self.g_steps[next] = self.g_steps[curr] + 1;
                    self.open.push(OpenEntry {
                        node: next,
                        f_cost: f_cost(Some(link), self.g_costs[curr], next, dst),
                    });
                }
            }
        }
        None
    }

    /// Links of the last path found, from `dst` back to the source, each
    /// paired with the node it leaves from.
    pub fn path_back(&self, dst: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut node = dst;
        std::iter::from_fn(move || {
            let link = self.prev_links.get(node).copied().flatten()?;
            let prev = self.prev_nodes[node]?;
            node = prev;
            Some((link, prev))
        })
        .take(self.steps)
    }

    /// Accumulated cost of reaching `node` in the last search.
    #[inline]
    pub fn g_cost(&self, node: usize) -> f64 {
        self.g_costs[node]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 0 - 1 - 2
    /// |       |
    /// 3 ----- 4
    fn ring() -> AStarGraph<f64, &'static str> {
        let mut graph = AStarGraph::new(5);
        graph.add_link(0, 1, 1.0, "a");
        graph.add_link(1, 2, 1.0, "b");
        graph.add_link(0, 3, 1.0, "c");
        graph.add_link(3, 4, 5.0, "d");
        graph.add_link(4, 2, 1.0, "e");
        graph
    }

    fn dijkstra_cost(link: Option<&AStarLink<&str>>, g: f64, _: usize, _: usize) -> f64 {
        link.map_or(0.0, |l| g + l.cost)
    }

    #[test]
    fn test_shortest_path() {
        let graph = ring();
        let mut solver = AStarSolver::new();
        assert_eq!(solver.solve(&graph, 0, 2, 0, dijkstra_cost), Some(2));
        let labels: Vec<_> = solver.path_back(2).map(|(l, _)| graph.link(l).data).collect();
        assert_eq!(labels, vec!["b", "a"]);
        assert_eq!(solver.g_cost(2), 2.0);

        assert_eq!(solver.solve(&graph, 0, 4, 0, dijkstra_cost), Some(3));
        let nodes: Vec<_> = solver.path_back(4).map(|(_, n)| n).collect();
        assert_eq!(nodes, vec![2, 1, 0]);
    }

    #[test]
    fn test_step_limit() {
        let graph = ring();
        let mut solver = AStarSolver::new();
        // The cheapest path to node 4 takes three links.
        assert_eq!(solver.solve(&graph, 0, 4, 2, dijkstra_cost), None);
        assert_eq!(solver.solve(&graph, 0, 4, 3, dijkstra_cost), Some(3));
    }

    #[test]
    fn test_same_node_and_unreachable() {
        let mut graph = ring();
        graph.set_node(0, 1.5);
        assert_eq!(*graph.node(0), 1.5);
        let mut solver = AStarSolver::new();
        assert_eq!(solver.solve(&graph, 3, 3, 0, dijkstra_cost), Some(0));
        assert_eq!(solver.path_back(3).count(), 0);

        let lonely: AStarGraph<(), ()> = AStarGraph::new(2);
        assert_eq!(lonely.num_links(), 0);
        assert_eq!(
            AStarSolver::new().solve(&lonely, 0, 1, 0, |_, _, _, _| 0.0),
            None
        );
    }
}
