// Cashflow Insights - Web Server
// REST API with Axum over the startup snapshot and the payment graph

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use cashflow_insights::forecast::{forecast_company, Horizon, DEFAULT_HORIZON};
use cashflow_insights::graph_store::connect_store;
use cashflow_insights::kpi::{company_details, dashboard, Dashboard, CompanyDetails};
use cashflow_insights::narrative::{
    diagnosis_request, ecosystem_request, narrate, value_chain_request, ChatCompletionsNarrator,
    NarrativeGenerator, NarrativeRequest,
};
use cashflow_insights::{
    init_logging, load_registry, AnalyticsError, AppConfig, CompanyProfile, DependencyRecord,
    ForecastResult, GraphAnalyzer, GraphOutcome, Neighborhood, NetworkSummary, PaymentEdge,
    Snapshot, TransactionRecord,
};

const MAX_EDGE_LIMIT: usize = 2000;

/// Shared application state
#[derive(Clone)]
struct AppState {
    snapshot: Arc<Snapshot>,
    graph: GraphAnalyzer,
    narrator: Option<Arc<dyn NarrativeGenerator>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Set when the graph store could not answer
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    degraded: bool,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            degraded: false,
        }
    }
}

/// Analytics error rendered with its HTTP status
struct ApiError(AnalyticsError);

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        }
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
            degraded: matches!(self.0, AnalyticsError::DegradedDependency(_)),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

fn respond<T>(outcome: GraphOutcome<T>) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(outcome.into_result()?)))
}

fn invalid(msg: String) -> ApiError {
    ApiError(AnalyticsError::InvalidParameter(msg))
}

fn check_limit(limit: Option<usize>) -> std::result::Result<Option<usize>, ApiError> {
    match limit {
        Some(l) if l == 0 || l > MAX_EDGE_LIMIT => Err(invalid(format!("limit must be in 1..={}, got {}", MAX_EDGE_LIMIT, l))),
        other => Ok(other),
    }
}

fn check_threshold(threshold: Option<f64>) -> std::result::Result<Option<f64>, ApiError> {
    match threshold {
        Some(t) if !(0.0..=1.0).contains(&t) => Err(invalid(format!("threshold must be in 0..=1, got {}", t))),
        other => Ok(other),
    }
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Deserialize)]
struct SectorQuery {
    sector: Option<String>,
}

#[derive(Deserialize)]
struct ForecastQuery {
    n_months: Option<u32>,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct DependencyQuery {
    threshold: Option<f64>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct SummaryQuery {
    limit: Option<usize>,
    threshold: Option<f64>,
}

/// Deterministic context always; generated text when a narrator is configured
#[derive(Serialize)]
struct NarrativeResponse {
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    narrative: Option<String>,
}

async fn render(state: &AppState, request: NarrativeRequest) -> ApiResult<NarrativeResponse> {
    let narrative = match &state.narrator {
        Some(narrator) => Some(narrate(narrator.as_ref(), &request).await?),
        None => None,
    };
    Ok(Json(ApiResponse::ok(NarrativeResponse {
        context: request.context,
        narrative,
    })))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(serde_json::json!({
        "status": "OK",
        "snapshot_id": state.snapshot.id(),
        "built_at": state.snapshot.built_at(),
        "companies": state.snapshot.profiles().len(),
        "graph_available": !state.graph.nodes().is_degraded(),
        "narrator": state.narrator.is_some(),
    })))
}

/// GET /api/dashboard?sector= - KPIs and chart sections
async fn get_dashboard(State(state): State<AppState>, Query(query): Query<SectorQuery>) -> ApiResult<Dashboard> {
    let sector = query.sector.as_deref().filter(|s| !s.is_empty());
    Ok(Json(ApiResponse::ok(dashboard(&state.snapshot, sector))))
}

/// GET /api/companies - Every lifecycle profile
async fn get_companies(State(state): State<AppState>) -> ApiResult<Vec<CompanyProfile>> {
    Ok(Json(ApiResponse::ok(state.snapshot.profiles().to_vec())))
}

/// GET /api/companies/:id - Profile, benchmark and trends
async fn get_company(State(state): State<AppState>, Path(company_id): Path<String>) -> ApiResult<CompanyDetails> {
    Ok(Json(ApiResponse::ok(company_details(&state.snapshot, &company_id)?)))
}

/// GET /api/sectors
async fn get_sectors(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(Json(ApiResponse::ok(state.snapshot.registry().sectors())))
}

/// GET /api/transactions
async fn get_transactions(State(state): State<AppState>) -> ApiResult<Vec<TransactionRecord>> {
    Ok(Json(ApiResponse::ok(state.snapshot.registry().transactions.clone())))
}

/// GET /api/forecast/:id?n_months=
async fn get_forecast(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Query(query): Query<ForecastQuery>,
) -> ApiResult<ForecastResult> {
    let horizon = Horizon::new(query.n_months.unwrap_or(DEFAULT_HORIZON))?;
    Ok(Json(ApiResponse::ok(forecast_company(&state.snapshot, &company_id, horizon)?)))
}

/// GET /api/graph/nodes
async fn get_nodes(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    respond(state.graph.nodes())
}

/// GET /api/graph/edges?limit=
async fn get_edges(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> ApiResult<Vec<PaymentEdge>> {
    let limit = check_limit(query.limit)?;
    respond(state.graph.edges(limit))
}

/// GET /api/graph/neighborhood/:id
async fn get_neighborhood(State(state): State<AppState>, Path(company_id): Path<String>) -> ApiResult<Neighborhood> {
    respond(state.graph.neighborhood(&company_id)?)
}

/// GET /api/graph/dependencies?threshold=&limit=
async fn get_dependencies(
    State(state): State<AppState>,
    Query(query): Query<DependencyQuery>,
) -> ApiResult<Vec<DependencyRecord>> {
    let threshold = check_threshold(query.threshold)?;
    let limit = check_limit(query.limit)?;
    respond(state.graph.critical_dependencies(threshold, limit))
}

async fn compute_summary(state: &AppState, query: SummaryQuery) -> std::result::Result<NetworkSummary, ApiError> {
    let limit = check_limit(query.limit)?;
    let threshold = check_threshold(query.threshold)?;

    let graph = state.graph.clone();
    let outcome = tokio::task::spawn_blocking(move || graph.network_summary(limit, threshold))
        .await
        .map_err(|e| ApiError(AnalyticsError::configuration(format!("summary task failed: {}", e))))?;
    Ok(outcome.into_result()?)
}

/// GET /api/graph/summary?limit=&threshold=
async fn get_summary(State(state): State<AppState>, Query(query): Query<SummaryQuery>) -> ApiResult<NetworkSummary> {
    Ok(Json(ApiResponse::ok(compute_summary(&state, query).await?)))
}

/// GET /api/ai/diagnosis/:id
async fn get_diagnosis(State(state): State<AppState>, Path(company_id): Path<String>) -> ApiResult<NarrativeResponse> {
    let details = company_details(&state.snapshot, &company_id)?;
    render(&state, diagnosis_request(&details)).await
}

/// GET /api/graph-ai/ecosystem-summary?limit=&threshold=
async fn get_ecosystem_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<NarrativeResponse> {
    let summary = compute_summary(&state, query).await?;
    render(&state, ecosystem_request(&summary)).await
}

/// GET /api/graph-ai/company-analysis/:id
async fn get_company_analysis(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> ApiResult<NarrativeResponse> {
    let neighborhood = state.graph.neighborhood(&company_id)?.into_result()?;
    render(&state, value_chain_request(&neighborhood)).await
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_logging(&config.log_level, config.log_format);

    println!("🌐 Cashflow Insights - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Startup pipeline: any failure here is fatal, nothing is served
    let registry = load_registry(&config.companies_csv, &config.transactions_csv)
        .with_context(|| format!("Failed to load registry from {}", config.companies_csv.display()))?;
    let store = connect_store(config.graph_db.as_deref(), &registry);
    let snapshot = Snapshot::initialize(registry, &config.pipeline).context("Profile pipeline failed")?;
    println!("✓ Snapshot {} ready: {} profiles", snapshot.id(), snapshot.profiles().len());

    let narrator: Option<Arc<dyn NarrativeGenerator>> = match &config.llm {
        Some(llm) => {
            let client = ChatCompletionsNarrator::new(llm.api_key.clone(), llm.base_url.clone(), llm.model.clone())?;
            info!(model = %llm.model, "Narrative generator enabled");
            Some(Arc::new(client))
        }
        None => {
            info!("No INSIGHTS_LLM_API_KEY set, narrative endpoints return context only");
            None
        }
    };

    // Create shared state
    let state = AppState {
        snapshot: Arc::new(snapshot),
        graph: GraphAnalyzer::new(store, config.network),
        narrator,
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/dashboard", get(get_dashboard))
        .route("/companies", get(get_companies))
        .route("/companies/:id", get(get_company))
        .route("/sectors", get(get_sectors))
        .route("/transactions", get(get_transactions))
        .route("/forecast/:id", get(get_forecast))
        .route("/graph/nodes", get(get_nodes))
        .route("/graph/edges", get(get_edges))
        .route("/graph/neighborhood/:id", get(get_neighborhood))
        .route("/graph/dependencies", get(get_dependencies))
        .route("/graph/summary", get(get_summary))
        .route("/ai/diagnosis/:id", get(get_diagnosis))
        .route("/graph-ai/ecosystem-summary", get(get_ecosystem_summary))
        .route("/graph-ai/company-analysis/:id", get(get_company_analysis))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/dashboard", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
