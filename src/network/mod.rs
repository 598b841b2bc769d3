// 🌐 Dependency Graph Analyzer
//
// Read-only analysis over the payment graph behind a `GraphStore`.
// Store failures never escape as errors: they become `GraphOutcome::Degraded`,
// which callers can tell apart from an available-but-empty answer.

pub mod centrality;
pub mod community;
pub mod dependency;

use crate::error::{AnalyticsError, Result};
use crate::graph_store::{DependencyRecord, GraphStore, GraphStoreError, Neighborhood, PaymentEdge};
use centrality::{top_central, CentralityConfig, CentralityScore};
use community::louvain_communities;
use petgraph::graph::{DiGraph, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub dependency_threshold: f64,
    pub dependency_limit: usize,
    /// Default page size for edge listings
    pub edge_limit: usize,
    /// Heaviest edges the ecosystem summary is built from
    pub summary_edge_limit: usize,
    pub resolution: f64,
    pub centrality: CentralityConfig,
    pub top_central: usize,
    pub top_dependencies: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            dependency_threshold: dependency::DEFAULT_THRESHOLD,
            dependency_limit: dependency::DEFAULT_LIMIT,
            edge_limit: 500,
            summary_edge_limit: 200,
            resolution: community::DEFAULT_RESOLUTION,
            centrality: CentralityConfig::default(),
            top_central: 5,
            top_dependencies: 5,
        }
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Answer of a graph query: data, or an explicit "store unreachable" marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum GraphOutcome<T> {
    Available(T),
    Degraded { reason: String },
}

impl<T> GraphOutcome<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, GraphOutcome::Degraded { .. })
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            GraphOutcome::Available(value) => Some(value),
            GraphOutcome::Degraded { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> GraphOutcome<U> {
        match self {
            GraphOutcome::Available(value) => GraphOutcome::Available(f(value)),
            GraphOutcome::Degraded { reason } => GraphOutcome::Degraded { reason },
        }
    }

    /// Degraded becomes `AnalyticsError::DegradedDependency`
    pub fn into_result(self) -> Result<T> {
        match self {
            GraphOutcome::Available(value) => Ok(value),
            GraphOutcome::Degraded { reason } => Err(AnalyticsError::DegradedDependency(reason)),
        }
    }
}

// ============================================================================
// GRAPH BUILDERS
// ============================================================================

/// Directed graph with parallel payments summed into one weighted edge.
/// Nodes are inserted in id order.
pub fn build_directed(edges: &[PaymentEdge]) -> DiGraph<String, f64> {
    let mut weights: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    let mut ids: BTreeSet<&str> = BTreeSet::new();
    for edge in edges {
        ids.insert(edge.source.as_str());
        ids.insert(edge.target.as_str());
        *weights
            .entry((edge.source.as_str(), edge.target.as_str()))
            .or_insert(0.0) += edge.value;
    }

    let mut graph = DiGraph::with_capacity(ids.len(), weights.len());
    let index: BTreeMap<&str, NodeIndex> = ids
        .into_iter()
        .map(|id| (id, graph.add_node(id.to_string())))
        .collect();

    for ((source, target), weight) in weights {
        graph.add_edge(index[source], index[target], weight);
    }
    graph
}

/// Undirected view; A→B and B→A collapse into one edge carrying their sum
pub fn undirected_view(graph: &DiGraph<String, f64>) -> UnGraph<String, f64> {
    let mut pairs: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for edge in graph.edge_references() {
        let (a, b) = (edge.source().index(), edge.target().index());
        let key = if a <= b { (a, b) } else { (b, a) };
        *pairs.entry(key).or_insert(0.0) += *edge.weight();
    }

    let mut undirected = UnGraph::with_capacity(graph.node_count(), pairs.len());
    for node in graph.node_indices() {
        undirected.add_node(graph[node].clone());
    }
    for ((a, b), weight) in pairs {
        undirected.add_edge(NodeIndex::new(a), NodeIndex::new(b), weight);
    }
    undirected
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub node_count: usize,
    pub edge_count: usize,
    /// Largest first
    pub communities: Vec<Vec<String>>,
    pub largest_community_size: usize,
    pub top_central: Vec<CentralityScore>,
    pub threshold: f64,
    pub critical_dependency_count: usize,
    pub top_dependencies: Vec<DependencyRecord>,
}

/// Pure summary over an edge sample and the dependency list for the same store
pub fn summarize(
    edges: &[PaymentEdge],
    dependencies: Vec<DependencyRecord>,
    threshold: f64,
    config: &NetworkConfig,
) -> NetworkSummary {
    let directed = build_directed(edges);
    let communities = louvain_communities(&undirected_view(&directed), config.resolution);
    let largest_community_size = communities.iter().map(|c| c.len()).max().unwrap_or(0);
    let top_central = top_central(&directed, &config.centrality, config.top_central);

    let critical_dependency_count = dependencies.len();
    let top_dependencies = dependencies.into_iter().take(config.top_dependencies).collect();

    NetworkSummary {
        node_count: directed.node_count(),
        edge_count: directed.edge_count(),
        communities,
        largest_community_size,
        top_central,
        threshold,
        critical_dependency_count,
        top_dependencies,
    }
}

// ============================================================================
// ANALYZER
// ============================================================================

#[derive(Clone)]
pub struct GraphAnalyzer {
    store: Arc<dyn GraphStore>,
    config: NetworkConfig,
}

impl GraphAnalyzer {
    pub fn new(store: Arc<dyn GraphStore>, config: NetworkConfig) -> Self {
        GraphAnalyzer { store, config }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn degraded<T>(operation: &str, err: GraphStoreError) -> GraphOutcome<T> {
        warn!(degraded = true, operation, error = %err, "Graph store unavailable");
        GraphOutcome::Degraded { reason: err.to_string() }
    }

    fn outcome<T>(operation: &str, result: std::result::Result<T, GraphStoreError>) -> GraphOutcome<T> {
        match result {
            Ok(value) => GraphOutcome::Available(value),
            Err(err) => Self::degraded(operation, err),
        }
    }

    pub fn nodes(&self) -> GraphOutcome<Vec<String>> {
        Self::outcome("nodes", self.store.nodes())
    }

    /// Heaviest payments first; `None` uses the configured page size
    pub fn edges(&self, limit: Option<usize>) -> GraphOutcome<Vec<PaymentEdge>> {
        let limit = limit.unwrap_or(self.config.edge_limit);
        Self::outcome("edges", self.store.edges(limit))
    }

    /// `NotFound` when the company is not a node of the graph
    pub fn neighborhood(&self, company_id: &str) -> Result<GraphOutcome<Neighborhood>> {
        match self.store.neighborhood(company_id) {
            Ok(Some(neighborhood)) => Ok(GraphOutcome::Available(neighborhood)),
            Ok(None) => Err(AnalyticsError::not_found(format!("company {} is not in the payment graph", company_id))),
            Err(err) => Ok(Self::degraded("neighborhood", err)),
        }
    }

    pub fn critical_dependencies(&self, threshold: Option<f64>, limit: Option<usize>) -> GraphOutcome<Vec<DependencyRecord>> {
        let threshold = threshold.unwrap_or(self.config.dependency_threshold);
        let limit = limit.unwrap_or(self.config.dependency_limit);
        Self::outcome(
            "critical_dependencies",
            self.store.critical_dependencies(threshold, limit),
        )
    }

    /// Communities and centrality over the heaviest `limit` edges, dependencies over the whole graph
    pub fn network_summary(&self, limit: Option<usize>, threshold: Option<f64>) -> GraphOutcome<NetworkSummary> {
        let limit = limit.unwrap_or(self.config.summary_edge_limit);
        let threshold = threshold.unwrap_or(self.config.dependency_threshold);

        let edges = match self.store.edges(limit) {
            Ok(edges) => edges,
            Err(err) => return Self::degraded("network_summary", err),
        };
        let dependencies = match self.store.critical_dependencies(threshold, self.config.dependency_limit) {
            Ok(deps) => deps,
            Err(err) => return Self::degraded("network_summary", err),
        };

        let summary = summarize(&edges, dependencies, threshold, &self.config);
        info!(
            nodes = summary.node_count,
            edges = summary.edge_count,
            communities = summary.communities.len(),
            critical = summary.critical_dependency_count,
            "Network summary computed"
        );
        GraphOutcome::Available(summary)
    }
}
