//! Settings file for the triage CLI.
//!
//! Every section is optional; missing sections use the built-in defaults.
//!
//! ```json
//! {
//!   "detection": { "weights": { "utm": 40, "context": 30, "behavior": 30 } },
//!   "thresholds": { "autoClassify": 70, "suggest": 40 },
//!   "leadWeights": { "personal": { "eventType": { "cha-revelacao": 20 } } },
//!   "supabase": { "baseUrl": "https://xyz.supabase.co", "tableName": "leads" }
//! }
//! ```

use std::path::Path;

use anyhow::{ensure, Context, Result};
use m5max_backend_supabase::SupabaseConfig;
use m5max_detect::DetectionConfig;
use m5max_leadscore::LeadWeights;
use m5max_model::ConfidenceThresholds;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub detection: DetectionConfig,
    pub thresholds: ConfidenceThresholds,
    pub lead_weights: LeadWeights,
    pub supabase: SupabaseConfig,
}

impl Settings {
    /// Load settings from an optional JSON file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse settings {}", path.display()))?
            }
            None => Self::default(),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        self.detection
            .validate()
            .context("Invalid detection weights")?;
        ensure!(
            self.thresholds.suggest <= self.thresholds.auto_classify,
            "Suggest threshold ({}) is above the auto-classify threshold ({})",
            self.thresholds.suggest,
            self.thresholds.auto_classify
        );
        Ok(())
    }

    /// Apply Supabase overrides from the command line / environment.
    pub fn with_supabase(mut self, url: Option<String>, key: Option<String>) -> Self {
        if let Some(url) = url {
            self.supabase.base_url = url;
        }
        if let Some(key) = key {
            self.supabase.api_key = key;
        }
        self
    }
}
