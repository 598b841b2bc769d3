// 📝 Narrative Reports - structured context + pluggable text generator
//
// Context builders are pure: same tables in, same text out.
// Generating prose from that context is delegated to a `NarrativeGenerator`
// (an OpenAI-compatible chat-completions client when the server feature is on).

use crate::error::{AnalyticsError, Result};
use crate::graph_store::Neighborhood;
use crate::kpi::CompanyDetails;
use crate::network::NetworkSummary;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Counterparties listed by name in the value-chain context
const LISTED_COUNTERPARTIES: usize = 5;

// ============================================================================
// REQUEST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeRequest {
    pub system: String,
    pub context: String,
    pub instructions: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl NarrativeRequest {
    /// Context followed by the task, as sent in the user message
    pub fn prompt(&self) -> String {
        format!("Data:\n{}\n\nTask:\n{}", self.context, self.instructions)
    }
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, request: &NarrativeRequest) -> Result<String>;
}

/// Run the generator; blank output counts as a failure
pub async fn narrate(generator: &dyn NarrativeGenerator, request: &NarrativeRequest) -> Result<String> {
    let text = generator.generate(request).await?;
    let text = text.trim();
    if text.is_empty() {
        return Err(AnalyticsError::Narrative("generator returned an empty text".to_string()));
    }
    Ok(text.to_string())
}

// ============================================================================
// CONTEXT BUILDERS
// ============================================================================

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Thousands-grouped integer amount, e.g. 1,234,567
fn amount(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

pub fn diagnosis_context(details: &CompanyDetails) -> String {
    let features = &details.profile.features;
    let bench = &details.benchmark;
    let trend = if details.cashflow_trends.revenue > 0.0 {
        "positive"
    } else {
        "negative or flat"
    };

    let mut context = String::new();
    let _ = writeln!(context, "- Company: {} (sector {})", features.company_id, features.sector);
    let _ = writeln!(context, "- Lifecycle moment: {}", details.profile.lifecycle_moment);
    let _ = writeln!(context, "- Average revenue (6m): {} BRL", amount(bench.company_average_revenue_6m));
    let _ = writeln!(context, "- Average margin (6m): {}", percent(bench.company_average_margin_6m));
    let _ = writeln!(context, "- Revenue trend: {}", trend);
    let _ = writeln!(context, "- Sector average revenue (6m): {} BRL", amount(bench.sector_average_revenue_6m));
    let _ = writeln!(context, "- Sector average margin (6m): {}", percent(bench.sector_average_margin_6m));
    context
}

pub fn diagnosis_request(details: &CompanyDetails) -> NarrativeRequest {
    NarrativeRequest {
        system: "You are a senior financial analyst writing a diagnosis for a business client.".to_string(),
        context: diagnosis_context(details),
        instructions: "Write a concise single-paragraph diagnosis. Start with the company's lifecycle \
                       moment and what it means, compare revenue and margin with the sector average, \
                       then give one strategic recommendation based on the revenue trend."
            .to_string(),
        max_tokens: 250,
        temperature: 0.5,
    }
}

pub fn ecosystem_context(summary: &NetworkSummary) -> String {
    let central: Vec<&str> = summary.top_central.iter().map(|s| s.company_id.as_str()).collect();

    let mut context = String::new();
    let _ = writeln!(context, "- Companies (nodes): {}", summary.node_count);
    let _ = writeln!(context, "- Payment relations (edges): {}", summary.edge_count);
    let _ = writeln!(context, "- Communities detected: {}", summary.communities.len());
    let _ = writeln!(context, "- Largest community: {} companies", summary.largest_community_size);
    let _ = writeln!(context, "- Most central companies (betweenness): {}", central.join(", "));
    let _ = writeln!(
        context,
        "- Critical dependencies (>{:.0}%): {}",
        summary.threshold * 100.0,
        summary.critical_dependency_count
    );

    if !summary.top_dependencies.is_empty() {
        let _ = writeln!(context, "\nMost critical dependencies:");
        for (i, dep) in summary.top_dependencies.iter().enumerate() {
            let _ = writeln!(
                context,
                "- {}. {} depends {:.1}% on {}",
                i + 1,
                dep.dependent_company,
                dep.concentration_pct,
                dep.key_client
            );
        }
    }
    context
}

pub fn ecosystem_request(summary: &NetworkSummary) -> NarrativeRequest {
    NarrativeRequest {
        system: "You are a senior risk analyst specialised in business network analysis.".to_string(),
        context: ecosystem_context(summary),
        instructions: "Write an executive summary of the business ecosystem. Give an overview of its \
                       structure, explain why the most central companies matter, assess the critical \
                       dependency risks and close with one or two strategic recommendations."
            .to_string(),
        max_tokens: 450,
        temperature: 0.4,
    }
}

pub fn value_chain_context(neighborhood: &Neighborhood) -> String {
    let mut context = String::new();
    let _ = writeln!(context, "- Company: {}", neighborhood.company_id);
    let _ = writeln!(context, "- Clients: {}", neighborhood.clients.len());
    let _ = writeln!(context, "- Suppliers: {}", neighborhood.suppliers.len());

    if neighborhood.clients.is_empty() {
        let _ = writeln!(context, "- No clients recorded.");
    } else {
        let listed: Vec<&str> = neighborhood.clients.iter().take(LISTED_COUNTERPARTIES).map(String::as_str).collect();
        let _ = writeln!(context, "- Main clients: {}", listed.join(", "));
    }

    if neighborhood.suppliers.is_empty() {
        let _ = writeln!(context, "- No suppliers recorded.");
    } else {
        let listed: Vec<&str> = neighborhood.suppliers.iter().take(LISTED_COUNTERPARTIES).map(String::as_str).collect();
        let _ = writeln!(context, "- Main suppliers: {}", listed.join(", "));
    }
    context
}

pub fn value_chain_request(neighborhood: &Neighborhood) -> NarrativeRequest {
    NarrativeRequest {
        system: "You are a financial analyst specialised in value-chain analysis.".to_string(),
        context: value_chain_context(neighborhood),
        instructions: "Assess the company's position in its value chain, point out client or supplier \
                       concentration risks and suggest a suitable financial strategy."
            .to_string(),
        max_tokens: 300,
        temperature: 0.4,
    }
}

// ============================================================================
// CHAT COMPLETIONS CLIENT
// ============================================================================

#[cfg(feature = "server")]
pub use client::ChatCompletionsNarrator;

#[cfg(feature = "server")]
mod client {
    use super::{NarrativeGenerator, NarrativeRequest};
    use crate::error::{AnalyticsError, Result};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use tracing::debug;

    /// OpenAI-compatible `/v1/chat/completions` client
    pub struct ChatCompletionsNarrator {
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        model: String,
    }

    impl ChatCompletionsNarrator {
        pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|e| AnalyticsError::configuration(format!("HTTP client: {}", e)))?;

            Ok(ChatCompletionsNarrator {
                client,
                api_key: api_key.into(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                model: model.into(),
            })
        }
    }

    #[derive(Debug, Serialize)]
    struct ChatRequest<'a> {
        model: &'a str,
        messages: Vec<ChatMessage<'a>>,
        max_tokens: u32,
        temperature: f64,
    }

    #[derive(Debug, Serialize)]
    struct ChatMessage<'a> {
        role: &'a str,
        content: &'a str,
    }

    #[derive(Debug, Deserialize)]
    struct ChatResponse {
        choices: Vec<Choice>,
    }

    #[derive(Debug, Deserialize)]
    struct Choice {
        message: ResponseMessage,
    }

    #[derive(Debug, Deserialize)]
    struct ResponseMessage {
        #[serde(default)]
        content: Option<String>,
    }

    #[async_trait]
    impl NarrativeGenerator for ChatCompletionsNarrator {
        async fn generate(&self, request: &NarrativeRequest) -> Result<String> {
            let url = format!("{}/v1/chat/completions", self.base_url);
            let prompt = request.prompt();
            let body = ChatRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage { role: "system", content: &request.system },
                    ChatMessage { role: "user", content: &prompt },
                ],
                max_tokens: request.max_tokens,
                temperature: request.temperature,
            };

            debug!(model = %self.model, max_tokens = request.max_tokens, "Requesting narrative");

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| AnalyticsError::Narrative(format!("request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(AnalyticsError::Narrative(format!("API error {}: {}", status.as_u16(), detail)));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| AnalyticsError::Narrative(format!("unreadable response: {}", e)))?;

            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| AnalyticsError::Narrative("response has no content".to_string()))
        }
    }
}
