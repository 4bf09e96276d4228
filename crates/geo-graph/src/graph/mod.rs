use geo::{Coord, EuclideanDistance};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::GraphError;

/// Compressed adjacency list for an undirected, unweighted graph.
///
/// Adapted from the teacher's `graph_rs::graph::csr::Csr`, which stored a
/// weighted `Target<EV>` per edge and kept separate in/out CSRs for a
/// directed graph. [`Geography`] never needs edge weights or direction — a
/// site is simply adjacent to another or it is not — so this keeps only the
/// offset/target arrays and drops the weight and direction bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Csr {
    offsets: Vec<usize>,
    targets: Vec<usize>,
}

impl Csr {
    /// Builds a CSR adjacency list from an edge iterator, automatically
    /// taking the symmetric closure (spec.md §4.1: "the adjacency is the
    /// symmetric closure of an input graph").
    pub fn from_edges(node_count: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Csr {
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); node_count];
        for (a, b) in edges {
            if a == b {
                continue;
            }
            if !adjacency[a].contains(&b) {
                adjacency[a].push(b);
            }
            if !adjacency[b].contains(&a) {
                adjacency[b].push(a);
            }
        }

        let mut offsets = Vec::with_capacity(node_count + 1);
        let mut targets = Vec::new();
        offsets.push(0);
        for mut neighbours in adjacency {
            neighbours.sort_unstable();
            targets.extend(neighbours);
            offsets.push(targets.len());
        }

        Csr { offsets, targets }
    }

    pub fn node_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn edge_count(&self) -> usize {
        self.targets.len() / 2
    }

    pub fn degree(&self, node: usize) -> usize {
        self.offsets[node + 1] - self.offsets[node]
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.targets[self.offsets[node]..self.offsets[node + 1]]
    }

    pub fn is_adjacent(&self, a: usize, b: usize) -> bool {
        self.neighbors(a).contains(&b)
    }
}

/// Immutable geographic substrate over which areas are grown: adjacency plus
/// pairwise distances between sites (spec.md §4.1).
///
/// Loaded once and never mutated afterwards — the sampler only reads from
/// it, across all chains, without synchronization (spec.md §5: "Shared
/// resources. Read-only: graph, features, ...").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geography {
    adjacency: Csr,
    coords: Vec<Coord<f64>>,
    names: Vec<String>,
    /// Row-major flattened `n x n` distance matrix.
    distances: Vec<f64>,
}

impl Geography {
    pub fn new(
        adjacency: Csr,
        coords: Vec<Coord<f64>>,
        names: Vec<String>,
    ) -> Result<Geography, GraphError> {
        let n = adjacency.node_count();
        if coords.len() != n {
            return Err(GraphError::SiteCountMismatch {
                expected: n,
                got: coords.len(),
            });
        }
        if names.len() != n {
            return Err(GraphError::SiteCountMismatch {
                expected: n,
                got: names.len(),
            });
        }

        let mut distances = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = coords[i].euclidean_distance(&coords[j]);
                distances[i * n + j] = d;
                distances[j * n + i] = d;
            }
        }

        debug!(sites = n, edges = adjacency.edge_count(), "built geography");

        Ok(Geography {
            adjacency,
            coords,
            names,
            distances,
        })
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.node_count()
    }

    pub fn name(&self, site: usize) -> &str {
        &self.names[site]
    }

    pub fn coord(&self, site: usize) -> Coord<f64> {
        self.coords[site]
    }

    pub fn is_adjacent(&self, a: usize, b: usize) -> bool {
        self.adjacency.is_adjacent(a, b)
    }

    pub fn distance(&self, a: usize, b: usize) -> f64 {
        let n = self.node_count();
        self.distances[a * n + b]
    }

    /// Returns the boolean mask of sites adjacent to at least one member of
    /// `zone_row` and not already present in `occupied` (spec.md §4.1).
    ///
    /// Runs in `O(deg * |zone_row|)`: only the members of `zone_row` are
    /// scanned, and each contributes exactly its own adjacency list.
    #[instrument(skip(self, zone_row, occupied))]
    pub fn neighbours(&self, zone_row: &[bool], occupied: &[bool]) -> Vec<bool> {
        let n = self.node_count();
        debug_assert_eq!(zone_row.len(), n);
        debug_assert_eq!(occupied.len(), n);

        let mut mask = vec![false; n];
        for (site, &is_member) in zone_row.iter().enumerate() {
            if !is_member {
                continue;
            }
            for &neighbour in self.adjacency.neighbors(site) {
                if !occupied[neighbour] {
                    mask[neighbour] = true;
                }
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_of_four() -> Geography {
        let adjacency = Csr::from_edges(4, [(0, 1), (1, 2), (2, 3)]);
        let coords = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 2.0, y: 0.0 },
            Coord { x: 3.0, y: 0.0 },
        ];
        let names = vec!["a", "b", "c", "d"]
            .into_iter()
            .map(String::from)
            .collect();
        Geography::new(adjacency, coords, names).unwrap()
    }

    #[test]
    fn symmetric_closure() {
        let geo = line_of_four();
        assert!(geo.is_adjacent(0, 1));
        assert!(geo.is_adjacent(1, 0));
        assert!(!geo.is_adjacent(0, 2));
    }

    #[test]
    fn neighbours_of_single_site() {
        let geo = line_of_four();
        let zone_row = vec![false, true, false, false];
        let occupied = zone_row.clone();
        let mask = geo.neighbours(&zone_row, &occupied);
        assert_eq!(mask, vec![true, false, true, false]);
    }

    #[test]
    fn neighbours_excludes_occupied() {
        let geo = line_of_four();
        let zone_row = vec![false, true, false, false];
        let occupied = vec![true, true, false, false];
        let mask = geo.neighbours(&zone_row, &occupied);
        assert_eq!(mask, vec![false, false, true, false]);
    }

    #[test]
    fn distance_matrix_is_symmetric() {
        let geo = line_of_four();
        assert_eq!(geo.distance(0, 3), 3.0);
        assert_eq!(geo.distance(3, 0), geo.distance(0, 3));
        assert_eq!(geo.distance(1, 1), 0.0);
    }
}
