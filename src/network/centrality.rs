// 🎯 Betweenness Centrality - Brandes over weighted shortest paths
//
// Exact when the graph has at most `sample_size` nodes; above that, `sample_size`
// source nodes are drawn with a seeded RNG and the result is scaled by n / k.
// Normalized for directed graphs by 1 / ((n-1)(n-2)) when n > 2.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub const DEFAULT_SAMPLE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralityScore {
    pub company_id: String,
    pub betweenness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentralityConfig {
    pub sample_size: usize,
    pub seed: u64,
}

impl Default for CentralityConfig {
    fn default() -> Self {
        CentralityConfig {
            sample_size: DEFAULT_SAMPLE_SIZE,
            seed: 42,
        }
    }
}

// Min-heap entry on distance
#[derive(Debug, Clone, Copy, PartialEq)]
struct Frontier {
    distance: f64,
    node: usize,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Betweenness per node index
pub fn betweenness_centrality(graph: &DiGraph<String, f64>, config: &CentralityConfig) -> Vec<f64> {
    let n = graph.node_count();
    let mut centrality = vec![0.0; n];
    if n == 0 {
        return centrality;
    }

    let sources: Vec<usize> = if n > config.sample_size && config.sample_size > 0 {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut picked = rand::seq::index::sample(&mut rng, n, config.sample_size).into_vec();
        picked.sort_unstable();
        picked
    } else {
        (0..n).collect()
    };

    for &source in &sources {
        accumulate_from(graph, source, &mut centrality);
    }

    if n > 2 {
        let mut scale = 1.0 / ((n - 1) as f64 * (n - 2) as f64);
        if sources.len() < n {
            scale *= n as f64 / sources.len() as f64;
        }
        for value in centrality.iter_mut() {
            *value *= scale;
        }
    }

    centrality
}

/// Single-source Dijkstra + dependency accumulation (Brandes 2001)
fn accumulate_from(graph: &DiGraph<String, f64>, source: usize, centrality: &mut [f64]) {
    let n = graph.node_count();
    let mut order: Vec<usize> = Vec::with_capacity(n);
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut distance: Vec<Option<f64>> = vec![None; n];
    let mut settled = vec![false; n];

    sigma[source] = 1.0;
    distance[source] = Some(0.0);

    let mut heap = BinaryHeap::new();
    heap.push(Frontier { distance: 0.0, node: source });

    while let Some(Frontier { distance: d, node: v }) = heap.pop() {
        if settled[v] {
            continue;
        }
        settled[v] = true;
        order.push(v);

        for edge in graph.edges(NodeIndex::new(v)) {
            let w = edge.target().index();
            let candidate = d + edge.weight().max(0.0);

            match distance[w] {
                Some(current) if settled[w] || candidate > current => {}
                Some(current) if candidate == current => {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
                _ => {
                    distance[w] = Some(candidate);
                    sigma[w] = sigma[v];
                    predecessors[w] = vec![v];
                    heap.push(Frontier { distance: candidate, node: w });
                }
            }
        }
    }

    let mut delta = vec![0.0; n];
    while let Some(w) = order.pop() {
        for &v in &predecessors[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
        if w != source {
            centrality[w] += delta[w];
        }
    }
}

/// Highest betweenness first, ties by company id
pub fn top_central(graph: &DiGraph<String, f64>, config: &CentralityConfig, top_n: usize) -> Vec<CentralityScore> {
    let scores = betweenness_centrality(graph, config);

    let mut ranked: Vec<CentralityScore> = graph
        .node_indices()
        .map(|i| CentralityScore {
            company_id: graph[i].clone(),
            betweenness: scores[i.index()],
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.betweenness
            .total_cmp(&a.betweenness)
            .then_with(|| a.company_id.cmp(&b.company_id))
    });
    ranked.truncate(top_n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(labels: &[&str]) -> DiGraph<String, f64> {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = labels.iter().map(|l| graph.add_node(l.to_string())).collect();
        for pair in nodes.windows(2) {
            graph.add_edge(pair[0], pair[1], 1.0);
        }
        graph
    }

    #[test]
    fn test_directed_path_middle_node() {
        // A → B → C: only B lies on a shortest path (A→C)
        let graph = path_graph(&["A", "B", "C"]);

        let scores = betweenness_centrality(&graph, &CentralityConfig::default());

        assert_eq!(scores[0], 0.0);
        assert!((scores[1] - 0.5).abs() < 1e-12, "1 path / ((3-1)(3-2))");
        assert_eq!(scores[2], 0.0);

        println!("✅ Betweenness: {:?}", scores);
    }

    #[test]
    fn test_equal_paths_split_credit() {
        // S → X → T and S → Y → T with equal weights
        let mut graph = DiGraph::new();
        let s = graph.add_node("S".to_string());
        let x = graph.add_node("X".to_string());
        let y = graph.add_node("Y".to_string());
        let t = graph.add_node("T".to_string());
        graph.add_edge(s, x, 1.0);
        graph.add_edge(s, y, 1.0);
        graph.add_edge(x, t, 1.0);
        graph.add_edge(y, t, 1.0);

        let scores = betweenness_centrality(&graph, &CentralityConfig::default());

        assert!((scores[x.index()] - scores[y.index()]).abs() < 1e-12);
        assert!((scores[x.index()] - 0.5 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_sampling_is_deterministic() {
        let labels: Vec<String> = (0..30).map(|i| format!("N{:02}", i)).collect();
        let refs: Vec<&str> = labels.iter().map(|s| s.as_str()).collect();
        let graph = path_graph(&refs);
        let config = CentralityConfig { sample_size: 10, seed: 7 };

        let first = betweenness_centrality(&graph, &config);
        let second = betweenness_centrality(&graph, &config);

        assert_eq!(first, second);
        assert!(first.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_top_central_orders_by_score() {
        let graph = path_graph(&["A", "B", "C", "D"]);

        let top = top_central(&graph, &CentralityConfig::default(), 2);

        assert_eq!(top.len(), 2);
        assert!(top[0].betweenness >= top[1].betweenness);
        assert!(top.iter().all(|s| s.company_id == "B" || s.company_id == "C"));
    }
}
