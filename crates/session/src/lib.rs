//! Session-scoped triage state.
//!
//! `SessionContext` is the explicit, per-visitor replacement for ambient
//! global state. It owns:
//! - the attribution record, captured at most once
//! - navigation tracking (pages, products, last interaction)
//! - the cached triage outcome and the re-detection policy
//! - consent preferences
//!
//! Persistence goes through a `SessionStore` as JSON records.

mod consent;
mod store;

pub use consent::{ConsentPreferences, ConsentPurpose};
pub use store::{MemoryStore, SessionStore, ALL_KEYS, ATTRIBUTION_KEY, CONSENT_KEY, TRIAGE_KEY};

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use m5max_attribution::{extract_attribution, LandingRequest};
use m5max_detect::{detect, DetectionConfig};
use m5max_features::normalize_path;
use m5max_model::{
    AttributionData, Audience, ConfidenceThresholds, DetectionFactors, DetectionMethod,
    DetectionResult, LastInteraction, TriageData, TriageFingerprint, UtmParams,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors from session persistence.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to encode {key}: {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage rejected {key}: {message}")]
    Storage { key: String, message: String },
}

/// Outcome of a triage pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TriagePass {
    pub triage: TriageData,
    /// Present when the engine ran; `None` when the cached triage was reused
    pub detection: Option<DetectionResult>,
}

impl TriagePass {
    pub fn reused(&self) -> bool {
        self.detection.is_none()
    }
}

/// State of one visitor session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    started_at: DateTime<Utc>,
    attribution: Option<AttributionData>,
    current_page: String,
    pages: BTreeSet<String>,
    products: BTreeSet<String>,
    last_interaction: Option<LastInteraction>,
    triage: Option<TriageData>,
    consent: ConsentPreferences,
}

impl SessionContext {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            attribution: None,
            current_page: "/".to_string(),
            pages: BTreeSet::new(),
            products: BTreeSet::new(),
            last_interaction: None,
            triage: None,
            consent: ConsentPreferences::default(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn has_attribution(&self) -> bool {
        self.attribution.is_some()
    }

    pub fn attribution(&self) -> Option<&AttributionData> {
        self.attribution.as_ref()
    }

    /// Capture attribution from the landing request.
    ///
    /// Only the first call extracts and records the landing page as a
    /// visit. Later calls return the stored record and leave the session
    /// untouched; use `visit` for navigation after landing.
    pub fn capture_attribution(
        &mut self,
        request: &LandingRequest,
        at: DateTime<Utc>,
    ) -> &AttributionData {
        if self.attribution.is_some() {
            tracing::debug!("Attribution already captured, skipping");
        } else {
            self.visit(&request.path);
        }
        self.attribution.get_or_insert_with(|| {
            let data = extract_attribution(request, at);
            tracing::info!(
                source = %data.utm.source,
                campaign = %data.utm.campaign,
                landing_page = %data.landing_page,
                "Captured attribution"
            );
            data
        })
    }

    /// Record a page view.
    pub fn visit(&mut self, path: &str) {
        let path = normalize_path(path);
        self.pages.insert(path.clone());
        self.current_page = path;
    }

    /// Record a product detail view.
    pub fn view_product(&mut self, product_id: &str) {
        let id = product_id.trim();
        if !id.is_empty() {
            self.products.insert(id.to_string());
        }
    }

    pub fn interact(&mut self, kind: LastInteraction) {
        self.last_interaction = Some(kind);
    }

    pub fn pages_visited(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Detection inputs as of `now`.
    pub fn factors(&self, now: DateTime<Utc>) -> DetectionFactors {
        let elapsed = (now - self.started_at).num_milliseconds().max(0) as u64;

        let mut factors = DetectionFactors::new(self.current_page.clone())
            .with_products(self.products.iter().cloned())
            .with_engagement(self.pages_visited(), elapsed);
        if let Some(attribution) = &self.attribution {
            factors = factors.with_utm(&attribution.utm);
        }
        factors.last_interaction = self.last_interaction;
        factors
    }

    pub fn triage_data(&self) -> Option<&TriageData> {
        self.triage.as_ref()
    }

    /// Run a triage pass, reusing the cached outcome when allowed.
    ///
    /// The cached triage is kept when the visitor decided it, when it is
    /// already confident enough to skip the wizard, or when neither the
    /// campaign nor the page count changed since it was computed.
    pub fn triage(
        &mut self,
        config: &DetectionConfig,
        thresholds: &ConfidenceThresholds,
        now: DateTime<Utc>,
    ) -> TriagePass {
        let factors = self.factors(now);
        let fingerprint = TriageFingerprint::of(&factors);

        if let Some(cached) = &self.triage {
            let reusable = cached.is_user_decided()
                || thresholds.should_skip_wizard(cached.confidence)
                || cached.fingerprint.as_ref() == Some(&fingerprint);
            if reusable {
                tracing::debug!(
                    audience = %cached.detected_audience,
                    confidence = cached.confidence,
                    "Reusing cached triage"
                );
                return TriagePass {
                    triage: cached.clone(),
                    detection: None,
                };
            }
        }

        let result = detect(&factors, config);
        let triage = TriageData::from_result(&result, fingerprint, now);
        self.triage = Some(triage.clone());

        TriagePass {
            triage,
            detection: Some(result),
        }
    }

    /// The visitor accepted an audience in the qualification wizard.
    pub fn confirm_audience(&mut self, audience: Audience, at: DateTime<Utc>) -> &TriageData {
        self.decide(audience, DetectionMethod::Wizard, at)
    }

    /// The visitor picked an audience themselves.
    pub fn override_audience(&mut self, audience: Audience, at: DateTime<Utc>) -> &TriageData {
        self.decide(audience, DetectionMethod::Manual, at)
    }

    fn decide(&mut self, audience: Audience, method: DetectionMethod, at: DateTime<Utc>) -> &TriageData {
        let previous = self
            .triage
            .as_ref()
            .map(|t| t.detected_audience)
            .filter(|p| *p != audience);

        tracing::info!(
            audience = %audience,
            method = ?method,
            corrected = previous.is_some(),
            "Audience decided by visitor"
        );

        self.triage.insert(TriageData {
            detected_audience: audience,
            confidence: 100,
            detection_method: method,
            detected_at: at,
            user_corrected: previous.is_some(),
            previous_audience: previous,
            fingerprint: None,
        })
    }

    pub fn consent(&self) -> &ConsentPreferences {
        &self.consent
    }

    pub fn set_consent(&mut self, consent: ConsentPreferences) {
        self.consent = consent;
    }

    /// Campaign parameters that may be shared with marketing channels.
    pub fn marketing_utm(&self) -> Option<&UtmParams> {
        if !self.consent.allows(ConsentPurpose::Marketing) {
            return None;
        }
        self.attribution.as_ref().map(|a| &a.utm)
    }

    /// Write attribution, triage and consent records to a store.
    pub fn persist(&self, store: &mut impl SessionStore) -> Result<(), SessionError> {
        match &self.attribution {
            Some(attribution) => store.set(ATTRIBUTION_KEY, encode(ATTRIBUTION_KEY, attribution)?)?,
            None => store.remove(ATTRIBUTION_KEY),
        }
        match &self.triage {
            Some(triage) => store.set(TRIAGE_KEY, encode(TRIAGE_KEY, triage)?)?,
            None => store.remove(TRIAGE_KEY),
        }
        store.set(CONSENT_KEY, encode(CONSENT_KEY, &self.consent)?)?;
        Ok(())
    }

    /// Rebuild a session from a store.
    ///
    /// Missing records start empty. A record that no longer parses is
    /// dropped with a warning rather than failing the session.
    ///
    /// Navigation is not persisted: the restored session knows only the
    /// landing page. An auto-detected triage is re-anchored to that state,
    /// so it is reused until the visitor brings new evidence (another page
    /// or a different campaign).
    pub fn restore(store: &impl SessionStore, started_at: DateTime<Utc>) -> Self {
        let mut session = Self::new(started_at);
        session.attribution = decode(store, ATTRIBUTION_KEY);
        session.triage = decode(store, TRIAGE_KEY);
        session.consent = decode(store, CONSENT_KEY).unwrap_or_default();
        let landing = session.attribution.as_ref().map(|a| a.landing_page.clone());
        if let Some(landing) = landing {
            session.visit(&landing);
        }

        let fingerprint = TriageFingerprint::of(&session.factors(started_at));
        if let Some(triage) = session.triage.as_mut().filter(|t| t.fingerprint.is_some()) {
            triage.fingerprint = Some(fingerprint);
        }
        session
    }

    /// Remove every session record from a store.
    pub fn clear(store: &mut impl SessionStore) {
        for key in ALL_KEYS {
            store.remove(key);
        }
    }
}

fn encode<T: Serialize>(key: &'static str, value: &T) -> Result<String, SessionError> {
    serde_json::to_string(value).map_err(|source| SessionError::Encode { key, source })
}

fn decode<T: DeserializeOwned>(store: &impl SessionStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Dropping unreadable session record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_capture_is_idempotent() {
        let mut session = SessionContext::new(start());
        assert!(!session.has_attribution());

        let first = session
            .capture_attribution(
                &LandingRequest::new("/cha-revelacao", "utm_source=instagram&utm_medium=social&utm_campaign=verao"),
                start(),
            )
            .clone();
        let second = session
            .capture_attribution(
                &LandingRequest::new("/kits", "gclid=abc"),
                start() + Duration::minutes(5),
            )
            .clone();

        assert!(session.has_attribution());
        assert_eq!(first, second);
        assert_eq!(second.utm.source, "instagram");
        assert_eq!(second.landing_page, "/cha-revelacao");
        assert_eq!(session.pages_visited(), 1);
    }

    #[test]
    fn test_repeat_capture_leaves_detection_inputs_alone() {
        let config = DetectionConfig::default();
        let thresholds = ConfidenceThresholds::default();
        let mut session = SessionContext::new(start());
        session.capture_attribution(&LandingRequest::new("/kits", ""), start());
        let before = session.factors(start());

        session.capture_attribution(&LandingRequest::new("/corporativo", ""), start());
        assert_eq!(session.factors(start()), before);

        let pass = session.triage(&config, &thresholds, start());
        assert_eq!(pass.triage.detected_audience, Audience::Kits);
    }

    #[test]
    fn test_factors_from_tracking() {
        let mut session = SessionContext::new(start());
        session.capture_attribution(&LandingRequest::new("/", "fbclid=x"), start());
        session.visit("/kits/");
        session.visit("/kits");
        session.view_product("kit-diy-basico");
        session.view_product("kit-diy-basico");
        session.view_product("  ");
        session.interact(LastInteraction::Product);

        let factors = session.factors(start() + Duration::seconds(90));
        assert_eq!(factors.current_page, "/kits");
        assert_eq!(factors.pages_visited, 2);
        assert_eq!(factors.products_viewed.len(), 1);
        assert_eq!(factors.time_on_site_ms, 90_000);
        assert_eq!(factors.utm_source.as_deref(), Some("facebook"));
        assert_eq!(factors.last_interaction, Some(LastInteraction::Product));
    }

    #[test]
    fn test_clock_skew_counts_as_zero() {
        let session = SessionContext::new(start());
        assert_eq!(session.factors(start() - Duration::seconds(5)).time_on_site_ms, 0);
    }

    #[test]
    fn test_triage_reuses_when_inputs_unchanged() {
        let config = DetectionConfig::default();
        let thresholds = ConfidenceThresholds::default();
        let mut session = SessionContext::new(start());
        session.capture_attribution(&LandingRequest::new("/kits", ""), start());

        let first = session.triage(&config, &thresholds, start());
        assert!(!first.reused());
        assert_eq!(first.triage.detected_audience, Audience::Kits);

        session.view_product("kit-diy-basico");
        let second = session.triage(&config, &thresholds, start());
        assert!(second.reused());

        session.visit("/kits/kit-diy-basico");
        let third = session.triage(&config, &thresholds, start());
        assert!(!third.reused());
        assert!(third.triage.confidence > first.triage.confidence);
    }

    #[test]
    fn test_confident_triage_is_not_recomputed() {
        let config = DetectionConfig::default();
        let thresholds = ConfidenceThresholds::default();
        let mut session = SessionContext::new(start());
        session.capture_attribution(
            &LandingRequest::new(
                "/cha-revelacao",
                "utm_source=instagram&utm_medium=social&utm_campaign=cha-revelacao",
            ),
            start(),
        );
        session.view_product("kit-cha-surpresa");
        session.visit("/cha-revelacao/kit-cha-surpresa");

        let pass = session.triage(&config, &thresholds, start() + Duration::minutes(1));
        assert!(thresholds.should_skip_wizard(pass.triage.confidence));

        session.visit("/corporativo");
        assert!(session.triage(&config, &thresholds, start()).reused());
    }

    #[test]
    fn test_override_records_previous_audience() {
        let mut session = SessionContext::new(start());
        session.capture_attribution(&LandingRequest::new("/kits", ""), start());
        session.triage(&DetectionConfig::default(), &ConfidenceThresholds::default(), start());

        let triage = session.override_audience(Audience::B2b, start()).clone();
        assert_eq!(triage.detected_audience, Audience::B2b);
        assert_eq!(triage.detection_method, DetectionMethod::Manual);
        assert_eq!(triage.confidence, 100);
        assert!(triage.user_corrected);
        assert_eq!(triage.previous_audience, Some(Audience::Kits));

        // Manual choice sticks even when inputs change.
        session.visit("/cha-revelacao");
        let pass = session.triage(&DetectionConfig::default(), &ConfidenceThresholds::default(), start());
        assert!(pass.reused());
        assert_eq!(pass.triage.detected_audience, Audience::B2b);
    }

    #[test]
    fn test_confirm_same_audience_is_not_a_correction() {
        let mut session = SessionContext::new(start());
        session.capture_attribution(&LandingRequest::new("/kits", ""), start());
        session.triage(&DetectionConfig::default(), &ConfidenceThresholds::default(), start());

        let triage = session.confirm_audience(Audience::Kits, start());
        assert_eq!(triage.detection_method, DetectionMethod::Wizard);
        assert!(!triage.user_corrected);
        assert_eq!(triage.previous_audience, None);
    }

    #[test]
    fn test_marketing_utm_requires_consent() {
        let mut session = SessionContext::new(start());
        session.capture_attribution(
            &LandingRequest::new("/", "utm_source=youtube&utm_medium=video&utm_campaign=kit-diy"),
            start(),
        );
        assert!(session.marketing_utm().is_none());

        session.set_consent(ConsentPreferences::accept_all(start()));
        assert_eq!(session.marketing_utm().map(|u| u.source.as_str()), Some("youtube"));
    }

    #[test]
    fn test_persist_and_restore() {
        let mut store = MemoryStore::new();
        let mut session = SessionContext::new(start());
        session.capture_attribution(&LandingRequest::new("/kits", "gclid=g1"), start());
        session.triage(&DetectionConfig::default(), &ConfidenceThresholds::default(), start());
        session.set_consent(ConsentPreferences::accept_all(start()));
        session.persist(&mut store).unwrap();
        assert_eq!(store.len(), 3);

        let restored = SessionContext::restore(&store, start());
        assert_eq!(restored.attribution(), session.attribution());
        assert_eq!(restored.triage_data(), session.triage_data());
        assert_eq!(restored.consent(), session.consent());
        assert_eq!(restored.pages_visited(), 1);

        SessionContext::clear(&mut store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_persist_removes_absent_records() {
        let mut store = MemoryStore::new();
        store
            .set(ATTRIBUTION_KEY, r#"{"stale": true}"#.to_string())
            .unwrap();
        store.set(TRIAGE_KEY, r#"{"stale": true}"#.to_string()).unwrap();

        SessionContext::new(start()).persist(&mut store).unwrap();
        assert!(store.get(ATTRIBUTION_KEY).is_none());
        assert!(store.get(TRIAGE_KEY).is_none());
        assert!(store.get(CONSENT_KEY).is_some());
    }

    #[test]
    fn test_restored_triage_is_reused_until_new_evidence() {
        let config = DetectionConfig::default();
        let thresholds = ConfidenceThresholds::default();
        let mut store = MemoryStore::new();

        let mut session = SessionContext::new(start());
        session.capture_attribution(&LandingRequest::new("/kits", ""), start());
        session.visit("/kits/kit-diy-basico");
        session.visit("/kits/kit-diy-festa");
        let original = session
            .triage(&config, &thresholds, start() + Duration::minutes(3))
            .triage;
        assert!(!thresholds.should_skip_wizard(original.confidence));
        session.persist(&mut store).unwrap();

        let mut restored = SessionContext::restore(&store, start());
        assert_eq!(restored.pages_visited(), 1);
        let pass = restored.triage(&config, &thresholds, start());
        assert!(pass.reused());
        assert_eq!(pass.triage.confidence, original.confidence);

        restored.visit("/kits/kit-diy-basico");
        assert!(!restored.triage(&config, &thresholds, start()).reused());
    }

    #[test]
    fn test_restore_drops_corrupt_records() {
        let mut store = MemoryStore::new();
        store.set(TRIAGE_KEY, "{not json".to_string()).unwrap();
        store
            .set(CONSENT_KEY, r#"{"analytics": true}"#.to_string())
            .unwrap();

        let restored = SessionContext::restore(&store, start());
        assert!(restored.triage_data().is_none());
        assert!(restored.consent().allows(ConsentPurpose::Analytics));
        assert!(restored.consent().allows(ConsentPurpose::Necessary));
        assert!(!restored.consent().allows(ConsentPurpose::Marketing));
    }
}
