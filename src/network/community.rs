// 🧩 Community Detection - Louvain modularity optimisation
//
// Works on the undirected, weighted view of the payment graph.
// Q = Σ_c [ L_c / m  -  γ · (K_c / 2m)² ]
//   L_c  internal weight of community c (self-loops included)
//   K_c  total weighted degree of c
//   m    total edge weight, γ the resolution
//
// Nodes are visited in index order and neighbour communities in id order, so
// the partition is deterministic for a given graph.

use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use std::collections::BTreeMap;

pub const DEFAULT_RESOLUTION: f64 = 1.1;
const MIN_MODULARITY_GAIN: f64 = 1e-7;

/// Weighted undirected graph with self-loops kept apart from neighbour weights
#[derive(Debug, Clone)]
struct LevelGraph {
    neighbours: Vec<BTreeMap<usize, f64>>,
    self_loops: Vec<f64>,
}

impl LevelGraph {
    fn from_petgraph(graph: &UnGraph<String, f64>) -> Self {
        let n = graph.node_count();
        let mut level = LevelGraph {
            neighbours: vec![BTreeMap::new(); n],
            self_loops: vec![0.0; n],
        };

        for edge in graph.edge_references() {
            let (u, v, w) = (edge.source().index(), edge.target().index(), *edge.weight());
            if u == v {
                level.self_loops[u] += w;
            } else {
                *level.neighbours[u].entry(v).or_insert(0.0) += w;
                *level.neighbours[v].entry(u).or_insert(0.0) += w;
            }
        }
        level
    }

    fn len(&self) -> usize {
        self.self_loops.len()
    }

    /// Weighted degree, a self-loop counts twice
    fn degree(&self, node: usize) -> f64 {
        self.neighbours[node].values().sum::<f64>() + 2.0 * self.self_loops[node]
    }

    fn total_weight(&self) -> f64 {
        let across: f64 = self.neighbours.iter().map(|n| n.values().sum::<f64>()).sum::<f64>() / 2.0;
        across + self.self_loops.iter().sum::<f64>()
    }

    /// Collapse each community into one node
    fn aggregate(&self, community_of: &[usize], count: usize) -> LevelGraph {
        let mut next = LevelGraph {
            neighbours: vec![BTreeMap::new(); count],
            self_loops: vec![0.0; count],
        };

        for u in 0..self.len() {
            let cu = community_of[u];
            next.self_loops[cu] += self.self_loops[u];
            for (&v, &w) in &self.neighbours[u] {
                if v < u {
                    continue;
                }
                let cv = community_of[v];
                if cu == cv {
                    next.self_loops[cu] += w;
                } else {
                    *next.neighbours[cu].entry(cv).or_insert(0.0) += w;
                    *next.neighbours[cv].entry(cu).or_insert(0.0) += w;
                }
            }
        }
        next
    }
}

/// Local-moving phase. Returns (community per node, number of communities, moved anything).
fn one_level(graph: &LevelGraph, m: f64, resolution: f64) -> (Vec<usize>, usize, bool) {
    let n = graph.len();
    let degrees: Vec<f64> = (0..n).map(|u| graph.degree(u)).collect();
    let mut community_of: Vec<usize> = (0..n).collect();
    let mut totals = degrees.clone();
    let mut improved = false;

    loop {
        let mut moves = 0;

        for u in 0..n {
            let current = community_of[u];
            let k_u = degrees[u];

            let mut weights_to: BTreeMap<usize, f64> = BTreeMap::new();
            for (&v, &w) in &graph.neighbours[u] {
                *weights_to.entry(community_of[v]).or_insert(0.0) += w;
            }

            let remove_cost = -weights_to.get(&current).copied().unwrap_or(0.0) / m
                + resolution * (totals[current] - k_u) * k_u / (2.0 * m * m);
            totals[current] -= k_u;

            let mut best = current;
            let mut best_gain = 0.0;
            for (&community, &w) in &weights_to {
                let gain = remove_cost + w / m - resolution * totals[community] * k_u / (2.0 * m * m);
                if gain > best_gain {
                    best_gain = gain;
                    best = community;
                }
            }

            totals[best] += k_u;
            if best != current {
                community_of[u] = best;
                moves += 1;
                improved = true;
            }
        }

        if moves == 0 {
            break;
        }
    }

    // Renumber to 0..count in order of first appearance
    let mut renumber: BTreeMap<usize, usize> = BTreeMap::new();
    let mut next_id = 0;
    for c in community_of.iter_mut() {
        let id = *renumber.entry(*c).or_insert_with(|| {
            next_id += 1;
            next_id - 1
        });
        *c = id;
    }

    (community_of, next_id, improved)
}

fn modularity(graph: &LevelGraph, community_of: &[usize], count: usize, m: f64, resolution: f64) -> f64 {
    let mut internal = vec![0.0; count];
    let mut degree = vec![0.0; count];

    for u in 0..graph.len() {
        let cu = community_of[u];
        internal[cu] += graph.self_loops[u];
        degree[cu] += graph.degree(u);
        for (&v, &w) in &graph.neighbours[u] {
            if v > u && community_of[v] == cu {
                internal[cu] += w;
            }
        }
    }

    internal
        .iter()
        .zip(&degree)
        .map(|(l, k)| l / m - resolution * (k / (2.0 * m)).powi(2))
        .sum()
}

/// Louvain communities as lists of node labels, largest community first
pub fn louvain_communities(graph: &UnGraph<String, f64>, resolution: f64) -> Vec<Vec<String>> {
    let mut level = LevelGraph::from_petgraph(graph);
    let m = level.total_weight();

    // members[c] = original node indices inside super-node c
    let mut members: Vec<Vec<usize>> = (0..graph.node_count()).map(|i| vec![i]).collect();

    if m > 0.0 {
        let identity: Vec<usize> = (0..level.len()).collect();
        let mut current_q = modularity(&level, &identity, level.len(), m, resolution);

        loop {
            let (community_of, count, improved) = one_level(&level, m, resolution);
            let new_q = modularity(&level, &community_of, count, m, resolution);
            if !improved || new_q - current_q <= MIN_MODULARITY_GAIN {
                break;
            }

            let mut merged: Vec<Vec<usize>> = vec![Vec::new(); count];
            for (node, nodes) in members.into_iter().enumerate() {
                merged[community_of[node]].extend(nodes);
            }
            members = merged;
            level = level.aggregate(&community_of, count);
            current_q = new_q;
        }
    }

    let mut communities: Vec<Vec<String>> = members
        .into_iter()
        .map(|nodes| {
            let mut labels: Vec<String> = nodes
                .into_iter()
                .map(|i| graph[petgraph::graph::NodeIndex::new(i)].clone())
                .collect();
            labels.sort();
            labels
        })
        .filter(|c| !c.is_empty())
        .collect();
    communities.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    communities
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn build(edges: &[(&str, &str, f64)]) -> UnGraph<String, f64> {
        let mut graph = UnGraph::new_undirected();
        let mut index = HashMap::new();
        for (a, b, w) in edges {
            let ia = *index.entry(*a).or_insert_with(|| graph.add_node(a.to_string()));
            let ib = *index.entry(*b).or_insert_with(|| graph.add_node(b.to_string()));
            graph.add_edge(ia, ib, *w);
        }
        graph
    }

    #[test]
    fn test_two_triangles_with_weak_bridge() {
        let graph = build(&[
            ("A", "B", 10.0),
            ("B", "C", 10.0),
            ("A", "C", 10.0),
            ("D", "E", 10.0),
            ("E", "F", 10.0),
            ("D", "F", 10.0),
            ("C", "D", 1.0),
        ]);

        let communities = louvain_communities(&graph, DEFAULT_RESOLUTION);

        assert_eq!(communities.len(), 2);
        assert_eq!(communities[0], vec!["A", "B", "C"]);
        assert_eq!(communities[1], vec!["D", "E", "F"]);

        println!("✅ Communities: {:?}", communities);
    }

    #[test]
    fn test_deterministic_partition() {
        let edges = [
            ("A", "B", 3.0),
            ("B", "C", 1.0),
            ("C", "D", 3.0),
            ("D", "A", 1.0),
            ("E", "F", 5.0),
        ];

        let first = louvain_communities(&build(&edges), DEFAULT_RESOLUTION);
        let second = louvain_communities(&build(&edges), DEFAULT_RESOLUTION);

        assert_eq!(first, second);
        let covered: usize = first.iter().map(|c| c.len()).sum();
        assert_eq!(covered, 6);
    }

    #[test]
    fn test_edgeless_graph_keeps_singletons() {
        let mut graph: UnGraph<String, f64> = UnGraph::new_undirected();
        graph.add_node("X".to_string());
        graph.add_node("Y".to_string());

        let communities = louvain_communities(&graph, DEFAULT_RESOLUTION);

        assert_eq!(communities, vec![vec!["X".to_string()], vec!["Y".to_string()]]);
    }

    #[test]
    fn test_modularity_of_singletons_is_negative() {
        let graph = build(&[("A", "B", 1.0), ("B", "C", 1.0)]);
        let level = LevelGraph::from_petgraph(&graph);
        let m = level.total_weight();

        let q = modularity(&level, &[0, 1, 2], 3, m, 1.0);
        assert!(q < 0.0);

        let merged = modularity(&level, &[0, 0, 0], 1, m, 1.0);
        assert!(merged.abs() < 1e-12);
    }
}
