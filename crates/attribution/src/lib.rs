//! Traffic attribution capture.
//!
//! Turns the landing request of a session (query string, referrer, path)
//! into an immutable `AttributionData` record. Extraction never fails:
//! missing or malformed parameters fall back to direct traffic.
//!
//! Once-per-session semantics live in `m5max-session`; this crate only
//! knows how to read one request.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use m5max_features::{normalize_path, parse_query, split_url};
use m5max_model::{AttributionData, UtmParams};

/// Query parameters required for a complete campaign record.
pub const REQUIRED_UTM_KEYS: [&str; 3] = ["utm_source", "utm_medium", "utm_campaign"];

/// Campaign value used when only a click id is known.
pub const UNKNOWN_CAMPAIGN: &str = "unknown";

/// The first request of a session, as seen by the browser.
#[derive(Debug, Clone, Default)]
pub struct LandingRequest {
    /// Raw query string, with or without the leading `?`
    pub query: String,
    /// `document.referrer`, if any
    pub referrer: Option<String>,
    /// Path of the landing page
    pub path: String,
}

impl LandingRequest {
    pub fn new(path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            referrer: None,
            path: path.into(),
        }
    }

    /// Build a request from a full URL or a path with query.
    pub fn from_url(url: &str) -> Self {
        let (path, query) = split_url(url);
        Self::new(path, query)
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

/// Paid click id found in the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickSource {
    Google,
    Facebook,
}

impl ClickSource {
    /// (utm_source, utm_medium) inferred from the click id.
    pub fn inferred_utm(&self) -> (&'static str, &'static str) {
        match self {
            Self::Google => ("google", "cpc"),
            Self::Facebook => ("facebook", "social"),
        }
    }
}

/// Extract attribution from a landing request.
pub fn extract_attribution(request: &LandingRequest, at: DateTime<Utc>) -> AttributionData {
    let params = parse_query(&request.query);

    let gclid = params.get("gclid").cloned();
    let fbclid = params.get("fbclid").cloned();

    let click_source = if gclid.is_some() {
        Some(ClickSource::Google)
    } else if fbclid.is_some() {
        Some(ClickSource::Facebook)
    } else {
        None
    };

    let utm = extract_utm(&params, click_source);

    let referrer = request
        .referrer
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("direct")
        .to_string();

    tracing::debug!(
        source = %utm.source,
        medium = %utm.medium,
        campaign = %utm.campaign,
        has_gclid = gclid.is_some(),
        has_fbclid = fbclid.is_some(),
        "Extracted attribution"
    );

    AttributionData {
        utm,
        gclid,
        fbclid,
        referrer,
        landing_page: normalize_path(&request.path),
        timestamp: at,
    }
}

/// Build the UTM record from parsed query params.
///
/// A complete utm_source/utm_medium/utm_campaign set wins; otherwise the
/// click id decides; otherwise the visit is direct.
pub fn extract_utm(
    params: &BTreeMap<String, String>,
    click_source: Option<ClickSource>,
) -> UtmParams {
    let complete = REQUIRED_UTM_KEYS.iter().all(|k| params.contains_key(*k));

    if complete {
        return UtmParams {
            source: params["utm_source"].clone(),
            medium: params["utm_medium"].clone(),
            campaign: params["utm_campaign"].clone(),
            content: params.get("utm_content").cloned(),
            term: params.get("utm_term").cloned(),
        };
    }

    match click_source {
        Some(click) => {
            let (source, medium) = click.inferred_utm();
            UtmParams::new(source, medium, UNKNOWN_CAMPAIGN)
        }
        None => UtmParams::direct(),
    }
}
