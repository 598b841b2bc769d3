// ⚙️ Application Configuration - environment variables (+ optional .env)
//
// INSIGHTS_COMPANIES_CSV      companies file            (data/companies.csv)
// INSIGHTS_TRANSACTIONS_CSV   transactions file         (data/transactions.csv)
// INSIGHTS_GRAPH_DB           SQLite graph database     (unset: in-memory, imported at startup)
// INSIGHTS_REFERENCE_DATE     age reference, YYYY-MM-DD (2024-01-01)
// INSIGHTS_CLUSTER_SEED       k-means seed              (42)
// INSIGHTS_BIND_ADDR          HTTP listen address       (0.0.0.0:8000)
// INSIGHTS_LOG_LEVEL          tracing level             (info)
// INSIGHTS_LOG_FORMAT         pretty | json             (pretty)
// INSIGHTS_LLM_API_KEY        enables narrative reports when set
// INSIGHTS_LLM_BASE_URL       chat-completions host     (https://api.openai.com)
// INSIGHTS_LLM_MODEL          model name                (gpt-4o-mini)

use crate::error::{AnalyticsError, Result};
use crate::logging::LogFormat;
use crate::network::NetworkConfig;
use crate::snapshot::PipelineConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_COMPANIES_CSV: &str = "data/companies.csv";
pub const DEFAULT_TRANSACTIONS_CSV: &str = "data/transactions.csv";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub companies_csv: PathBuf,
    pub transactions_csv: PathBuf,
    pub graph_db: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    pub network: NetworkConfig,
    pub bind_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub llm: Option<LlmConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            companies_csv: PathBuf::from(DEFAULT_COMPANIES_CSV),
            transactions_csv: PathBuf::from(DEFAULT_TRANSACTIONS_CSV),
            graph_db: None,
            pipeline: PipelineConfig::default(),
            network: NetworkConfig::default(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            llm: None,
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = AppConfig::default();

        if let Some(path) = get("INSIGHTS_COMPANIES_CSV") {
            config.companies_csv = PathBuf::from(path);
        }
        if let Some(path) = get("INSIGHTS_TRANSACTIONS_CSV") {
            config.transactions_csv = PathBuf::from(path);
        }
        config.graph_db = get("INSIGHTS_GRAPH_DB").map(PathBuf::from);

        if let Some(raw) = get("INSIGHTS_REFERENCE_DATE") {
            config.pipeline.reference_date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
                AnalyticsError::configuration(format!("INSIGHTS_REFERENCE_DATE '{}': {}", raw, e))
            })?;
        }
        if let Some(raw) = get("INSIGHTS_CLUSTER_SEED") {
            config.pipeline.clustering.seed = raw
                .parse()
                .map_err(|e| AnalyticsError::configuration(format!("INSIGHTS_CLUSTER_SEED '{}': {}", raw, e)))?;
        }

        if let Some(addr) = get("INSIGHTS_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(level) = get("INSIGHTS_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(raw) = get("INSIGHTS_LOG_FORMAT") {
            config.log_format = raw
                .parse()
                .map_err(|e: String| AnalyticsError::configuration(format!("INSIGHTS_LOG_FORMAT: {}", e)))?;
        }

        config.llm = get("INSIGHTS_LLM_API_KEY").map(|api_key| LlmConfig {
            api_key,
            base_url: get("INSIGHTS_LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            model: get("INSIGHTS_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
        });

        Ok(config)
    }
}
