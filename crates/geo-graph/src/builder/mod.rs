use geo::Coord;

use crate::{GraphError, graph::Csr, graph::Geography};

/// Typestate builder for [`Geography`], in the shape of the teacher's
/// `graph_rs::builder::GraphBuilder<State>` (`Uninitialized` ->
/// `FromEdgeList` -> `build()`), generalized from "parse one edge-list
/// string format" to "accept edges plus per-site coordinates and names from
/// whatever the (out-of-scope) feature loader produced".
pub struct Uninitialized;

pub struct WithSites {
    node_count: usize,
    coords: Vec<Coord<f64>>,
    names: Vec<String>,
}

pub struct WithEdges {
    node_count: usize,
    coords: Vec<Coord<f64>>,
    names: Vec<String>,
    edges: Vec<(usize, usize)>,
}

#[derive(Debug)]
pub struct GeographyBuilder<State> {
    state: State,
}

impl Default for GeographyBuilder<Uninitialized> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Uninitialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Uninitialized")
    }
}

impl std::fmt::Debug for WithSites {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WithSites({})", self.node_count)
    }
}

impl std::fmt::Debug for WithEdges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WithEdges({} sites, {} edges)",
            self.node_count,
            self.edges.len()
        )
    }
}

impl GeographyBuilder<Uninitialized> {
    pub fn new() -> Self {
        Self {
            state: Uninitialized,
        }
    }

    pub fn sites(
        self,
        coords: Vec<Coord<f64>>,
        names: Vec<String>,
    ) -> GeographyBuilder<WithSites> {
        GeographyBuilder {
            state: WithSites {
                node_count: coords.len(),
                coords,
                names,
            },
        }
    }
}

impl GeographyBuilder<WithSites> {
    pub fn edges(
        self,
        edges: impl IntoIterator<Item = (usize, usize)>,
    ) -> GeographyBuilder<WithEdges> {
        GeographyBuilder {
            state: WithEdges {
                node_count: self.state.node_count,
                coords: self.state.coords,
                names: self.state.names,
                edges: edges.into_iter().collect(),
            },
        }
    }
}

impl GeographyBuilder<WithEdges> {
    pub fn build(self) -> Result<Geography, GraphError> {
        let adjacency = Csr::from_edges(self.state.node_count, self.state.edges);
        Geography::new(adjacency, self.state.coords, self.state.names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_simple_graph() {
        let geo = GeographyBuilder::new()
            .sites(
                vec![
                    Coord { x: 0.0, y: 0.0 },
                    Coord { x: 1.0, y: 0.0 },
                    Coord { x: 2.0, y: 0.0 },
                ],
                vec!["a".into(), "b".into(), "c".into()],
            )
            .edges([(0, 1), (1, 2)])
            .build()
            .unwrap();

        assert_eq!(geo.node_count(), 3);
        assert!(geo.is_adjacent(0, 1));
        assert!(!geo.is_adjacent(0, 2));
    }
}
