// Cashflow Insights - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod registry;       // CSV loading: companies + transactions
pub mod cashflow;       // Monthly revenue/expense aggregation
pub mod features;       // Per-company feature vectors
pub mod lifecycle;      // K-means lifecycle classification
pub mod snapshot;       // One-shot profile cache
pub mod kpi;            // KPIs, benchmarks, dashboard sections
pub mod forecast;       // Linear-trend cash-flow forecasts
pub mod graph_store;    // Payment graph backends
pub mod network;        // Dependencies, communities, centrality
pub mod narrative;      // Report contexts + text generators
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{AnalyticsError, Result};
pub use registry::{load_registry, CompanyRecord, Registry, TransactionRecord};
pub use cashflow::{aggregate, CashflowTable, MonthlyCashflowEntry, YearMonth};
pub use features::{build_features, CompanyFeatures};
pub use lifecycle::{classify, ClusteringConfig, CompanyProfile, LifecycleMoment};
pub use snapshot::{PipelineConfig, Snapshot};
pub use kpi::{benchmark, company_details, compute_kpis, dashboard, Benchmark, CompanyDetails, Dashboard, Kpis};
pub use forecast::{forecast_company, ForecastResult, Horizon};
pub use graph_store::{
    DependencyRecord, GraphStore, GraphStoreError, Neighborhood, PaymentEdge,
    SqliteGraphStore, UnavailableGraphStore,
};
pub use network::{GraphAnalyzer, GraphOutcome, NetworkConfig, NetworkSummary};
pub use narrative::{narrate, NarrativeGenerator, NarrativeRequest};
pub use config::AppConfig;
pub use logging::{init_logging, LogFormat};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
