//! Supabase lead sink implementation.
//!
//! Provides the `LeadSink` trait and its Supabase REST implementation.
//! The scoring crates never see the transport; anything that can accept a
//! lead row (another database, a webhook) can stand in for Supabase.

use std::future::Future;
use std::time::Duration;

use m5max_model::LeadRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from lead sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Lead rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Sink not available")]
    Unavailable,
}

/// Trait for lead sinks (Supabase, webhooks, etc.)
pub trait LeadSink {
    /// Store a submitted lead.
    fn submit(&self, lead: &LeadRecord) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Check if the sink is reachable.
    fn health_check(&self) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Get the sink name for logging.
    fn name(&self) -> &'static str;
}

/// Supabase sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub base_url: String,
    /// Anon or service key
    pub api_key: String,
    /// Table receiving leads
    pub table_name: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:54321".to_string(),
            api_key: String::new(),
            table_name: "leads".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Supabase REST lead sink.
pub struct SupabaseSink {
    config: SupabaseConfig,
    client: reqwest::Client,
}

impl SupabaseSink {
    /// Create a new Supabase sink.
    pub fn new(config: SupabaseConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.table_name
        )
    }

    /// Build the table row for a lead.
    ///
    /// Column names are snake_case; attribution is flattened into `utm_*`
    /// columns so the table can be filtered by campaign.
    fn build_row(&self, lead: &LeadRecord) -> Result<serde_json::Value, SinkError> {
        let answers =
            serde_json::to_value(&lead.answers).map_err(|e| SinkError::Encoding(e.to_string()))?;

        let mut row = serde_json::json!({
            "name": lead.name,
            "email": lead.email,
            "phone": lead.phone,
            "track": lead.track.as_str(),
            "answers": answers,
            "lead_score": lead.score,
            "audience": lead.audience.map(|a| a.as_str()),
            "created_at": lead.created_at.to_rfc3339(),
        });

        if let Some(attribution) = &lead.attribution {
            let fields = [
                ("utm_source", Some(attribution.utm.source.as_str())),
                ("utm_medium", Some(attribution.utm.medium.as_str())),
                ("utm_campaign", Some(attribution.utm.campaign.as_str())),
                ("utm_content", attribution.utm.content.as_deref()),
                ("utm_term", attribution.utm.term.as_deref()),
                ("gclid", attribution.gclid.as_deref()),
                ("fbclid", attribution.fbclid.as_deref()),
                ("referrer", Some(attribution.referrer.as_str())),
                ("landing_page", Some(attribution.landing_page.as_str())),
            ];
            if let Some(object) = row.as_object_mut() {
                for (column, value) in fields {
                    object.insert(column.to_string(), serde_json::json!(value));
                }
            }
        }

        Ok(row)
    }
}

impl LeadSink for SupabaseSink {
    async fn submit(&self, lead: &LeadRecord) -> Result<(), SinkError> {
        let row = self.build_row(lead)?;

        tracing::debug!(table = %self.config.table_name, score = lead.score, "Submitting lead");

        let response = self
            .client
            .post(self.table_url())
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected { status, body });
        }

        tracing::info!(track = lead.track.as_str(), score = lead.score, "Lead stored");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), SinkError> {
        let response = self
            .client
            .get(format!("{}/rest/v1/", self.config.base_url.trim_end_matches('/')))
            .header("apikey", &self.config.api_key)
            .send()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SinkError::Unavailable)
        }
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}
