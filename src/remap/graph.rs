//! Face adjacency graphs used to detect paths crossing island inner cuts.

use nalgebra::Point3;

use crate::geometry::math::centroid;
use crate::mesh::PolyMesh;

use super::astar::{AStarGraph, AStarLink, AStarSolver};
use super::islands::IslandStore;

/// What a graph link crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeKind {
    /// Plain adjacency between two faces of the island.
    #[default]
    Ordinary,
    /// The mesh edge is an inner cut of the island.
    InnerCut(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
    Unset,
    CenterComputed,
    Complete,
}

/// Graph over the faces of one island (or of the whole mesh).
///
/// Nodes are island-local face indices carrying the face center; links join
/// faces sharing an edge, cost the distance between their centers and record
/// whether that edge is an inner cut.
#[derive(Debug, Clone)]
pub struct IslandGraph {
    graph: AStarGraph<Point3<f64>, EdgeKind>,
    faces: Vec<usize>,
    local: Vec<Option<usize>>,
}

struct Builder<'a> {
    mesh: &'a PolyMesh,
    island: Option<(&'a IslandStore, usize)>,
    graph: AStarGraph<Point3<f64>, EdgeKind>,
    local: Vec<Option<usize>>,
    status: Vec<NodeStatus>,
    done_edges: Vec<bool>,
    edge_locals: Vec<Option<usize>>,
}

impl Builder<'_> {
    fn process_edge(&mut self, edge: usize, kind: EdgeKind) {
        let edge_to_faces = self.mesh.edge_to_faces();
        self.edge_locals.clear();

        for &face in &edge_to_faces[edge] {
            // Border edges also touch faces of other islands.
            let in_island = self
                .island
                .map_or(true, |(store, island)| store.island_of_face(face) == island);
            let Some(node) = self.local[face].filter(|_| in_island) else {
                self.edge_locals.push(None);
                continue;
            };

            if self.status[node] == NodeStatus::Complete {
                self.edge_locals.push(Some(node));
                continue;
            }
            if self.status[node] == NodeStatus::Unset {
                let center = centroid(
                    self.mesh
                        .face_verts(face)
                        .iter()
                        .map(|&v| *self.mesh.position(v)),
                );
                self.graph.set_node(node, center);
                self.status[node] = NodeStatus::CenterComputed;
            }

            // Links to complete nodes were added while completing them.
            for j in (0..self.edge_locals.len()).rev() {
                let Some(other) = self.edge_locals[j] else {
                    continue;
                };
                if self.status[other] == NodeStatus::Complete {
                    continue;
                }
                let cost = (self.graph.node(other) - self.graph.node(node)).norm();
                self.graph.add_link(other, node, cost, kind);
            }
            self.edge_locals.push(Some(node));
        }

        self.done_edges[edge] = true;
    }
}

impl IslandGraph {
    /// Graph over every face of `mesh`, without inner cuts.
    pub fn whole_mesh(mesh: &PolyMesh) -> Self {
        let faces: Vec<usize> = (0..mesh.num_faces()).collect();
        Self::build(mesh, None, faces)
    }

    /// Graph over the faces of island `island` of `store`.
    pub fn for_island(mesh: &PolyMesh, store: &IslandStore, island: usize) -> Self {
        let faces = store.island(island).faces.clone();
        Self::build(mesh, Some((store, island)), faces)
    }

    fn build(mesh: &PolyMesh, island: Option<(&IslandStore, usize)>, faces: Vec<usize>) -> Self {
        let node_num = faces.len();
        let mut local = vec![None; mesh.num_faces()];
        for (node, &face) in faces.iter().enumerate() {
            local[face] = Some(node);
        }

        let mut builder = Builder {
            mesh,
            island,
            graph: AStarGraph::new(node_num),
            local,
            status: vec![NodeStatus::Unset; node_num],
            done_edges: vec![false; mesh.num_edges()],
            edge_locals: Vec::new(),
        };

        if let Some((store, index)) = island {
            for &cut in store.island(index).inner_cuts.iter().rev() {
                builder.process_edge(cut, EdgeKind::InnerCut(cut));
            }
        }

        for node in (0..node_num).rev() {
            if builder.status[node] == NodeStatus::Complete {
                continue;
            }
            for &edge in mesh.face_edges(faces[node]) {
                if !builder.done_edges[edge] {
                    builder.process_edge(edge, EdgeKind::Ordinary);
                }
            }
            builder.status[node] = NodeStatus::Complete;
        }

        Self {
            graph: builder.graph,
            faces,
            local: builder.local,
        }
    }

    /// The underlying search graph.
    #[inline]
    pub fn graph(&self) -> &AStarGraph<Point3<f64>, EdgeKind> {
        &self.graph
    }

    /// Number of nodes (faces of the island).
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.faces.len()
    }

    /// Node of mesh face `face`, if the face belongs to the graph.
    #[inline]
    pub fn node_of_face(&self, face: usize) -> Option<usize> {
        self.local.get(face).copied().flatten()
    }

    /// Mesh face of `node`.
    #[inline]
    pub fn face_of_node(&self, node: usize) -> usize {
        self.faces[node]
    }

    /// Shortest face path from `from` to `to` (mesh faces), within
    /// `max_steps` links.
    ///
    /// Walking the path back from `to`, returns the face just before the
    /// inner cut closest to `from`, or `None` when the path crosses no cut
    /// (or no path was found).
    pub fn face_before_cut(
        &self,
        solver: &mut AStarSolver,
        from: usize,
        to: usize,
        max_steps: usize,
    ) -> Option<usize> {
        let src = self.node_of_face(from)?;
        let dst = self.node_of_face(to)?;
        let target = *self.graph.node(dst);
        let graph = &self.graph;
        let steps = solver.solve(
            graph,
            src,
            dst,
            max_steps,
            |link: Option<&AStarLink<EdgeKind>>, g_curr, next, _| {
                link.map_or(0.0, |l| g_curr + l.cost) + (graph.node(next) - target).norm()
            },
        )?;
        if steps == 0 {
            return None;
        }

        let mut last_valid = None;
        for (link, prev) in solver.path_back(dst) {
            if let EdgeKind::InnerCut(_) = graph.link(link).data {
                last_valid = Some(prev);
            }
        }
        last_valid.map(|node| self.faces[node])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures;
    use crate::remap::{IslandClassifier, SeamIslands};

    #[test]
    fn test_whole_mesh_links_neighbours() {
        let grid = fixtures::grid(3, 2);
        let graph = IslandGraph::whole_mesh(&grid);
        assert_eq!(graph.num_nodes(), 6);
        // Interior edges of a 3 x 2 grid: 2 per row plus 3 between the rows.
        assert_eq!(graph.graph().num_links(), 7);
        for l in 0..graph.graph().num_links() {
            let link = graph.graph().link(l);
            assert_eq!(link.data, EdgeKind::Ordinary);
            assert!((link.cost - 1.0).abs() < 1e-12);
        }
        assert_eq!(*graph.graph().node(4), Point3::new(1.5, 1.5, 0.0));
    }

    #[test]
    fn test_island_graph_is_local() {
        let strip = fixtures::seam_strip(4);
        let store = SeamIslands.classify(&strip).unwrap();
        let graph = IslandGraph::for_island(&strip, &store, 1);

        assert_eq!(graph.num_nodes(), 2);
        assert_eq!(graph.graph().num_links(), 1);
        assert_eq!(graph.node_of_face(3), Some(1));
        assert_eq!(graph.node_of_face(0), None);
        assert_eq!(graph.face_of_node(0), 2);
    }

    #[test]
    fn test_path_across_inner_cut() {
        // Seam between faces 1 and 4 of a 3 x 3 grid (vertices 5 and 6),
        // plus the one continuing to the border, leaving one island.
        let mut grid = fixtures::grid(3, 3);
        assert!(grid.mark_seam(5, 6));
        assert!(grid.mark_seam(1, 5));
        let store = SeamIslands.classify(&grid).unwrap();
        assert_eq!(store.len(), 1);
        let graph = IslandGraph::for_island(&grid, &store, 0);

        let cuts = (0..graph.graph().num_links())
            .filter(|&l| matches!(graph.graph().link(l).data, EdgeKind::InnerCut(_)))
            .count();
        assert_eq!(cuts, 2);

        let mut solver = AStarSolver::new();
        // Straight up from face 1 to face 7 crosses the cut right away.
        assert_eq!(graph.face_before_cut(&mut solver, 1, 7, 64), Some(1));
        // Sideways along the bottom row crosses nothing.
        assert_eq!(graph.face_before_cut(&mut solver, 2, 1, 64), None);
        assert_eq!(graph.face_before_cut(&mut solver, 4, 4, 64), None);
    }
}
