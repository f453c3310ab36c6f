//! Core domain model for m5max audience triage.
//!
//! This crate defines the fundamental types used throughout the system:
//! - `Audience`: the marketing segment a visitor is classified into
//! - `AttributionData`: where the visitor came from, captured once per session
//! - `DetectionFactors` / `DetectionResult`: input and output of a detection pass
//! - `Signal`: a piece of evidence collected for one audience
//! - `TriageData`: the persisted outcome that gates the qualification wizard
//! - `LeadAnswers` / `LeadRecord`: form answers and the record handed to the lead sink

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketing audience segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Corporate shows, festivals, New Year's Eve events
    B2b,
    /// Gender-reveal events ("chá revelação")
    Cha,
    /// DIY kits
    Kits,
    /// Undecided / not enough signal
    General,
}

impl Audience {
    /// Tie-break order: earlier wins when two audiences score the same.
    pub const PRIORITY: [Audience; 4] = [Self::B2b, Self::Cha, Self::Kits, Self::General];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::B2b => "b2b",
            Self::Cha => "cha",
            Self::Kits => "kits",
            Self::General => "general",
        }
    }

    /// Get a human-readable label for this audience.
    pub fn label(&self) -> &'static str {
        match self {
            Self::B2b => "Corporate & events",
            Self::Cha => "Gender reveal",
            Self::Kits => "DIY kits",
            Self::General => "General",
        }
    }

    /// Position in `PRIORITY` (lower = preferred on ties).
    pub fn priority(&self) -> usize {
        match self {
            Self::B2b => 0,
            Self::Cha => 1,
            Self::Kits => 2,
            Self::General => 3,
        }
    }
}

impl Default for Audience {
    fn default() -> Self {
        Self::General
    }
}

impl From<&str> for Audience {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "b2b" | "corporate" | "corporativo" => Self::B2b,
            "cha" | "cha-revelacao" | "gender-reveal" => Self::Cha,
            "kits" | "kit" | "diy" => Self::Kits,
            _ => Self::General,
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Campaign parameters carried by the landing URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    pub source: String,
    pub medium: String,
    pub campaign: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

impl UtmParams {
    pub fn new(
        source: impl Into<String>,
        medium: impl Into<String>,
        campaign: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            medium: medium.into(),
            campaign: campaign.into(),
            content: None,
            term: None,
        }
    }

    /// The record used for visitors with no campaign and no click id.
    pub fn direct() -> Self {
        Self::new("direct", "none", "direct")
    }

    pub fn is_direct(&self) -> bool {
        self.source == "direct" && self.medium == "none"
    }
}

impl Default for UtmParams {
    fn default() -> Self {
        Self::direct()
    }
}

/// Traffic attribution, captured once per session and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionData {
    pub utm: UtmParams,

    /// Google Ads click id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gclid: Option<String>,

    /// Meta click id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbclid: Option<String>,

    /// Document referrer, or "direct"
    pub referrer: String,

    /// First path visited this session
    pub landing_page: String,

    pub timestamp: DateTime<Utc>,
}

/// Last thing the visitor clicked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastInteraction {
    Product,
    Service,
    Hero,
    Footer,
}

impl LastInteraction {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "product" => Some(Self::Product),
            "service" => Some(Self::Service),
            "hero" => Some(Self::Hero),
            "footer" => Some(Self::Footer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Service => "service",
            Self::Hero => "hero",
            Self::Footer => "footer",
        }
    }
}

/// Inputs of one detection pass.
///
/// Every field has a neutral default that contributes nothing to any score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionFactors {
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub utm_content: Option<String>,

    /// Current navigation path
    #[serde(default = "default_page")]
    pub current_page: String,

    /// Product ids visited this session
    #[serde(default)]
    pub products_viewed: BTreeSet<String>,

    /// Milliseconds since session start
    #[serde(default, rename = "timeOnSite")]
    pub time_on_site_ms: u64,

    /// Distinct paths visited
    #[serde(default)]
    pub pages_visited: u32,

    #[serde(default)]
    pub last_interaction: Option<LastInteraction>,
}

fn default_page() -> String {
    "/".to_string()
}

impl Default for DetectionFactors {
    fn default() -> Self {
        Self {
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            utm_content: None,
            current_page: default_page(),
            products_viewed: BTreeSet::new(),
            time_on_site_ms: 0,
            pages_visited: 0,
            last_interaction: None,
        }
    }
}

impl DetectionFactors {
    pub fn new(current_page: impl Into<String>) -> Self {
        Self {
            current_page: current_page.into(),
            ..Default::default()
        }
    }

    /// Copy the campaign fields from an attribution record.
    pub fn with_utm(mut self, utm: &UtmParams) -> Self {
        self.utm_source = Some(utm.source.clone());
        self.utm_medium = Some(utm.medium.clone());
        self.utm_campaign = Some(utm.campaign.clone());
        self.utm_content = utm.content.clone();
        self
    }

    pub fn with_products<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products_viewed
            .extend(products.into_iter().map(Into::into));
        self
    }

    pub fn with_engagement(mut self, pages_visited: u32, time_on_site_ms: u64) -> Self {
        self.pages_visited = pages_visited;
        self.time_on_site_ms = time_on_site_ms;
        self
    }

    pub fn with_interaction(mut self, interaction: LastInteraction) -> Self {
        self.last_interaction = Some(interaction);
        self
    }
}

/// Named UTM pattern groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternGroup {
    B2bCorporate,
    B2cPersonal,
    B2bSpecialized,
    DiyKits,
}

impl PatternGroup {
    pub const ALL: [PatternGroup; 4] = [
        Self::B2bCorporate,
        Self::B2cPersonal,
        Self::B2bSpecialized,
        Self::DiyKits,
    ];

    /// The audience a hit on this group votes for.
    pub fn audience(&self) -> Audience {
        match self {
            Self::B2bCorporate | Self::B2bSpecialized => Audience::B2b,
            Self::B2cPersonal => Audience::Cha,
            Self::DiyKits => Audience::Kits,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::B2bCorporate => "B2B_CORPORATE",
            Self::B2cPersonal => "B2C_PERSONAL",
            Self::B2bSpecialized => "B2B_SPECIALIZED",
            Self::DiyKits => "DIY_KITS",
        }
    }
}

/// Score bucket a signal counts towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreBucket {
    Utm,
    Context,
    Behavior,
}

impl ScoreBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utm => "utm",
            Self::Context => "context",
            Self::Behavior => "behavior",
        }
    }
}

/// Evidence collected for one candidate audience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "camelCase")]
pub enum Signal {
    /// utm_source is in a pattern group's source list
    UtmSource {
        group: PatternGroup,
        source: String,
        points: u8,
    },

    /// utm_campaign contains a pattern group's keyword
    UtmCampaign {
        group: PatternGroup,
        keyword: String,
        points: u8,
    },

    /// Current page is mapped to the audience
    Page { path: String, points: u8 },

    /// Viewed products mapped to the audience
    Products {
        matched: Vec<String>,
        recognised: usize,
        points: u8,
    },

    /// Last interaction biases towards the audience
    Interaction { kind: LastInteraction, points: u8 },

    /// Pages visited and time on site
    Engagement {
        pages_visited: u32,
        time_on_site_ms: u64,
        points: u8,
    },
}

impl Signal {
    pub fn points(&self) -> u8 {
        match self {
            Self::UtmSource { points, .. }
            | Self::UtmCampaign { points, .. }
            | Self::Page { points, .. }
            | Self::Products { points, .. }
            | Self::Interaction { points, .. }
            | Self::Engagement { points, .. } => *points,
        }
    }

    pub fn bucket(&self) -> ScoreBucket {
        match self {
            Self::UtmSource { .. } | Self::UtmCampaign { .. } => ScoreBucket::Utm,
            Self::Page { .. } | Self::Products { .. } => ScoreBucket::Context,
            Self::Interaction { .. } | Self::Engagement { .. } => ScoreBucket::Behavior,
        }
    }

    /// Get a short label for this signal.
    pub fn label(&self) -> &'static str {
        match self {
            Self::UtmSource { .. } => "Campaign Source",
            Self::UtmCampaign { .. } => "Campaign Keyword",
            Self::Page { .. } => "Page Context",
            Self::Products { .. } => "Products Viewed",
            Self::Interaction { .. } => "Last Interaction",
            Self::Engagement { .. } => "Engagement",
        }
    }
}

/// Per-bucket scores of the chosen audience.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub utm_score: u8,
    pub context_score: u8,
    pub behavior_score: u8,
}

impl ScoreBreakdown {
    /// Sum of the three buckets, clamped to 0..=100.
    pub fn total(&self) -> u8 {
        let sum = self.utm_score as u16 + self.context_score as u16 + self.behavior_score as u16;
        sum.min(100) as u8
    }
}

/// How the final classification was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// Detected by the engine
    Auto,
    /// Confirmed through the qualification wizard
    Wizard,
    /// Chosen by the visitor
    Manual,
}

impl Default for DetectionMethod {
    fn default() -> Self {
        Self::Auto
    }
}

/// Output of a detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub suggested_audience: Audience,

    /// 0..=100
    pub confidence: u8,

    /// Human-readable justification, for display and debugging only
    #[serde(default)]
    pub reasons: Vec<String>,

    pub breakdown: ScoreBreakdown,

    #[serde(default)]
    pub method: DetectionMethod,
}

/// Detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfidenceThresholds {
    /// At or above: skip the qualification wizard
    pub auto_classify: u8,
    /// At or above (and below `auto_classify`): suggest, ask to confirm
    pub suggest: u8,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            auto_classify: 70,
            suggest: 40,
        }
    }
}

impl ConfidenceThresholds {
    pub fn band(&self, confidence: u8) -> ConfidenceBand {
        if confidence >= self.auto_classify {
            ConfidenceBand::AutoClassify
        } else if confidence >= self.suggest {
            ConfidenceBand::Suggest
        } else {
            ConfidenceBand::Manual
        }
    }

    pub fn should_skip_wizard(&self, confidence: u8) -> bool {
        self.band(confidence) == ConfidenceBand::AutoClassify
    }
}

/// Which conversion flow a confidence value leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfidenceBand {
    /// Proceed without asking
    AutoClassify,
    /// Show the suggestion, require confirmation
    Suggest,
    /// Full qualification flow
    Manual,
}

impl ConfidenceBand {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AutoClassify => "auto-classify",
            Self::Suggest => "suggest",
            Self::Manual => "manual qualification",
        }
    }
}

/// The inputs a triage pass was computed from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageFingerprint {
    #[serde(default)]
    pub campaign: Option<String>,
    #[serde(default)]
    pub pages_visited: u32,
}

impl TriageFingerprint {
    pub fn of(factors: &DetectionFactors) -> Self {
        Self {
            campaign: factors.utm_campaign.clone(),
            pages_visited: factors.pages_visited,
        }
    }
}

/// Persisted triage state derived from the latest detection or override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageData {
    pub detected_audience: Audience,
    pub confidence: u8,
    pub detection_method: DetectionMethod,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub user_corrected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_audience: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<TriageFingerprint>,
}

impl TriageData {
    pub fn from_result(
        result: &DetectionResult,
        fingerprint: TriageFingerprint,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            detected_audience: result.suggested_audience,
            confidence: result.confidence,
            detection_method: result.method,
            detected_at,
            user_corrected: false,
            previous_audience: None,
            fingerprint: Some(fingerprint),
        }
    }

    /// Whether the visitor confirmed or chose the audience themselves.
    pub fn is_user_decided(&self) -> bool {
        self.detection_method != DetectionMethod::Auto
    }
}

/// Lead form track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadTrack {
    Corporate,
    Personal,
}

impl LeadTrack {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "corporate" | "corporativo" | "b2b" => Some(Self::Corporate),
            "personal" | "pessoal" | "b2c" => Some(Self::Personal),
            _ => None,
        }
    }

    /// Form track shown to an audience.
    pub fn for_audience(audience: Audience) -> Self {
        match audience {
            Audience::B2b => Self::Corporate,
            Audience::Cha | Audience::Kits | Audience::General => Self::Personal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Corporate => "corporate",
            Self::Personal => "personal",
        }
    }
}

/// Categorical answers of a lead form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadAnswers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
}

impl LeadAnswers {
    pub fn with_budget(mut self, budget_range: impl Into<String>) -> Self {
        self.budget_range = Some(budget_range.into());
        self
    }

    pub fn with_attendees(mut self, attendees_range: impl Into<String>) -> Self {
        self.attendees_range = Some(attendees_range.into());
        self
    }

    pub fn with_event(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_product(mut self, product_type: impl Into<String>) -> Self {
        self.product_type = Some(product_type.into());
        self
    }
}

/// Numeric lead quality estimate.
pub type LeadScore = u32;

/// A submitted lead, as handed to the lead sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub phone: String,

    pub track: LeadTrack,

    #[serde(default)]
    pub answers: LeadAnswers,

    /// Filled in by the lead scoring engine
    #[serde(default)]
    pub score: LeadScore,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<AttributionData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Audience>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl LeadRecord {
    /// Create a minimal record for testing.
    pub fn new(name: impl Into<String>, phone: impl Into<String>, track: LeadTrack) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: phone.into(),
            track,
            answers: LeadAnswers::default(),
            score: 0,
            attribution: None,
            audience: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_from_str() {
        assert_eq!(Audience::from("B2B"), Audience::B2b);
        assert_eq!(Audience::from("cha-revelacao"), Audience::Cha);
        assert_eq!(Audience::from("kit"), Audience::Kits);
        assert_eq!(Audience::from("whatever"), Audience::General);
    }

    #[test]
    fn test_priority_matches_order() {
        for (i, audience) in Audience::PRIORITY.iter().enumerate() {
            assert_eq!(audience.priority(), i);
        }
    }

    #[test]
    fn test_breakdown_total_clamped() {
        let breakdown = ScoreBreakdown {
            utm_score: 40,
            context_score: 30,
            behavior_score: 30,
        };
        assert_eq!(breakdown.total(), 100);

        let over = ScoreBreakdown {
            utm_score: 90,
            context_score: 90,
            behavior_score: 0,
        };
        assert_eq!(over.total(), 100);
    }

    #[test]
    fn test_threshold_bands() {
        let thresholds = ConfidenceThresholds::default();
        assert_eq!(thresholds.band(85), ConfidenceBand::AutoClassify);
        assert_eq!(thresholds.band(70), ConfidenceBand::AutoClassify);
        assert_eq!(thresholds.band(55), ConfidenceBand::Suggest);
        assert_eq!(thresholds.band(40), ConfidenceBand::Suggest);
        assert_eq!(thresholds.band(20), ConfidenceBand::Manual);
        assert!(thresholds.should_skip_wizard(85));
        assert!(!thresholds.should_skip_wizard(69));
    }

    #[test]
    fn test_factors_json_uses_camel_case() {
        let factors = DetectionFactors::new("/kits")
            .with_products(["kit-diy-01", "kit-diy-01"])
            .with_engagement(3, 45_000);
        let json = serde_json::to_value(&factors).unwrap();
        assert_eq!(json["currentPage"], "/kits");
        assert_eq!(json["timeOnSite"], 45_000);
        assert_eq!(json["productsViewed"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_factors_missing_fields_default() {
        let factors: DetectionFactors = serde_json::from_str("{}").unwrap();
        assert_eq!(factors, DetectionFactors::default());
        assert_eq!(factors.current_page, "/");
    }

    #[test]
    fn test_lead_record_serialization() {
        let mut lead = LeadRecord::new("Ana", "+55 11 99999-0000", LeadTrack::Personal);
        lead.answers = LeadAnswers::default().with_event("cha-revelacao");
        let json = serde_json::to_string(&lead).unwrap();
        let parsed: LeadRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, "Ana");
        assert_eq!(parsed.answers.event_type.as_deref(), Some("cha-revelacao"));
        assert_eq!(parsed.track, LeadTrack::Personal);
    }

    #[test]
    fn test_signal_buckets() {
        let signal = Signal::Page {
            path: "/kits".into(),
            points: 15,
        };
        assert_eq!(signal.bucket(), ScoreBucket::Context);
        assert_eq!(signal.points(), 15);
        assert_eq!(PatternGroup::B2bSpecialized.audience(), Audience::B2b);
    }
}
