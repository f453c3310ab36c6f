//! Audience detection engine.
//!
//! Scores every candidate audience from campaign (UTM), page/product
//! context, and on-site behavior, then picks the best match. The engine
//! is a pure function of its inputs: no I/O, no clock, deterministic.
//!
//! Each candidate accumulates three independently capped buckets:
//! - UTM (default max 40): binary hit per pattern group
//! - Context (default max 30): page lookup plus share of viewed products
//! - Behavior (default max 30): last interaction plus engagement steps
//!
//! Ties are broken by `Audience::PRIORITY` (`b2b > cha > kits > general`).

use m5max_explain::reasons;
use m5max_features::{match_pattern_group, page_audience, product_audience, UtmMatch, UTM_PATTERNS};
use m5max_model::{
    Audience, DetectionFactors, DetectionMethod, DetectionResult, LastInteraction, ScoreBreakdown,
    Signal,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Bucket weights sum to {0}, more than 100")]
    WeightsExceed(u16),
    #[error("Page ({page}) and product ({product}) weights exceed the context budget of {max}")]
    ContextBudget { page: u8, product: u8, max: u8 },
    #[error("Interaction and engagement points ({total}) exceed the behavior budget of {max}")]
    BehaviorBudget { total: u16, max: u8 },
}

/// Maximum points per score bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionWeights {
    pub utm: u8,
    pub context: u8,
    pub behavior: u8,
}

impl Default for DetectionWeights {
    fn default() -> Self {
        Self {
            utm: 40,
            context: 30,
            behavior: 30,
        }
    }
}

/// One step of an engagement step function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementStep {
    /// Value at which the step is reached
    pub threshold: u64,
    pub points: u8,
}

impl EngagementStep {
    pub const fn new(threshold: u64, points: u8) -> Self {
        Self { threshold, points }
    }
}

/// Configuration for the detection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionConfig {
    pub weights: DetectionWeights,
    /// Context points for a page mapped to the audience
    pub page_weight: u8,
    /// Context points when every recognised product belongs to the audience
    pub product_weight: u8,
    /// Steps over distinct pages visited
    pub pages_steps: Vec<EngagementStep>,
    /// Steps over milliseconds on site
    pub time_steps_ms: Vec<EngagementStep>,
    /// Behavior points for an interaction biased towards the audience
    pub interaction_weight: u8,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            weights: DetectionWeights::default(),
            page_weight: 15,
            product_weight: 15,
            pages_steps: vec![
                EngagementStep::new(2, 3),
                EngagementStep::new(4, 6),
                EngagementStep::new(7, 10),
            ],
            time_steps_ms: vec![
                EngagementStep::new(30_000, 3),
                EngagementStep::new(120_000, 6),
                EngagementStep::new(300_000, 10),
            ],
            interaction_weight: 10,
        }
    }
}

impl DetectionConfig {
    /// Check that the bucket weights and their sub-budgets fit together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let total = self.weights.utm as u16 + self.weights.context as u16 + self.weights.behavior as u16;
        if total > 100 {
            return Err(ConfigError::WeightsExceed(total));
        }

        if self.page_weight as u16 + self.product_weight as u16 > self.weights.context as u16 {
            return Err(ConfigError::ContextBudget {
                page: self.page_weight,
                product: self.product_weight,
                max: self.weights.context,
            });
        }

        let behavior = self.interaction_weight as u16
            + max_points(&self.pages_steps) as u16
            + max_points(&self.time_steps_ms) as u16;
        if behavior > self.weights.behavior as u16 {
            return Err(ConfigError::BehaviorBudget {
                total: behavior,
                max: self.weights.behavior,
            });
        }

        Ok(())
    }
}

fn max_points(steps: &[EngagementStep]) -> u8 {
    steps.iter().map(|s| s.points).max().unwrap_or(0)
}

/// Points of the highest step reached by `value`.
///
/// Non-decreasing in `value` whatever the order of `steps`.
pub fn step_points(steps: &[EngagementStep], value: u64) -> u8 {
    steps
        .iter()
        .filter(|s| value >= s.threshold)
        .map(|s| s.points)
        .max()
        .unwrap_or(0)
}

/// Audiences an interaction biases towards.
pub fn interaction_audiences(kind: LastInteraction) -> &'static [Audience] {
    match kind {
        LastInteraction::Product => &[Audience::Cha, Audience::Kits],
        LastInteraction::Service => &[Audience::B2b],
        LastInteraction::Hero | LastInteraction::Footer => &[Audience::General],
    }
}

/// Score of one candidate audience.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub audience: Audience,
    pub breakdown: ScoreBreakdown,
    /// Evidence in evaluation order (utm, context, behavior)
    pub signals: Vec<Signal>,
}

impl CandidateScore {
    fn new(audience: Audience) -> Self {
        Self {
            audience,
            breakdown: ScoreBreakdown::default(),
            signals: Vec::new(),
        }
    }

    pub fn total(&self) -> u8 {
        self.breakdown.total()
    }
}

/// Detect the audience with the default configuration.
pub fn detect_default(factors: &DetectionFactors) -> DetectionResult {
    detect(factors, &DetectionConfig::default())
}

/// Detect the most likely audience for a visitor.
///
/// Always returns a result: with no signal at all the visitor is
/// `general` with confidence 0.
pub fn detect(factors: &DetectionFactors, config: &DetectionConfig) -> DetectionResult {
    let candidates = score_candidates(factors, config);

    // Strictly greater keeps the earlier (higher priority) audience on ties.
    let mut best: Option<&CandidateScore> = None;
    for candidate in &candidates {
        if candidate.total() == 0 {
            continue;
        }
        match best {
            Some(b) if candidate.total() <= b.total() => {}
            _ => best = Some(candidate),
        }
    }

    let result = match best {
        Some(winner) => DetectionResult {
            suggested_audience: winner.audience,
            confidence: winner.total(),
            reasons: reasons(&winner.signals, winner.audience),
            breakdown: winner.breakdown,
            method: DetectionMethod::Auto,
        },
        None => DetectionResult {
            suggested_audience: Audience::General,
            confidence: 0,
            reasons: reasons(&[], Audience::General),
            breakdown: ScoreBreakdown::default(),
            method: DetectionMethod::Auto,
        },
    };

    tracing::debug!(
        audience = %result.suggested_audience,
        confidence = result.confidence,
        utm = result.breakdown.utm_score,
        context = result.breakdown.context_score,
        behavior = result.breakdown.behavior_score,
        "Detected audience"
    );

    result
}

/// Score every audience, in `Audience::PRIORITY` order.
pub fn score_candidates(factors: &DetectionFactors, config: &DetectionConfig) -> Vec<CandidateScore> {
    let mut candidates: Vec<CandidateScore> =
        Audience::PRIORITY.iter().map(|a| CandidateScore::new(*a)).collect();

    score_utm(&mut candidates, factors, config);
    score_context(&mut candidates, factors, config);
    score_behavior(&mut candidates, factors, config);

    candidates
}

fn candidate_mut(candidates: &mut [CandidateScore], audience: Audience) -> &mut CandidateScore {
    &mut candidates[audience.priority()]
}

/// Binary hit per pattern group; an audience gets the UTM weight once.
fn score_utm(candidates: &mut [CandidateScore], factors: &DetectionFactors, config: &DetectionConfig) {
    let source = factors.utm_source.as_deref();
    let campaign = factors.utm_campaign.as_deref();
    let points = config.weights.utm;

    for table in UTM_PATTERNS {
        let Some(hit) = match_pattern_group(table, source, campaign) else {
            continue;
        };

        let candidate = candidate_mut(candidates, table.group.audience());
        if candidate.breakdown.utm_score > 0 {
            continue;
        }
        candidate.breakdown.utm_score = points;
        candidate.signals.push(match hit {
            UtmMatch::Source(source) => Signal::UtmSource {
                group: table.group,
                source,
                points,
            },
            UtmMatch::Campaign(keyword) => Signal::UtmCampaign {
                group: table.group,
                keyword,
                points,
            },
        });
    }
}

fn score_context(
    candidates: &mut [CandidateScore],
    factors: &DetectionFactors,
    config: &DetectionConfig,
) {
    let max = config.weights.context;

    if let Some((prefix, audience)) = page_audience(&factors.current_page) {
        let candidate = candidate_mut(candidates, audience);
        let points = config.page_weight.min(max.saturating_sub(candidate.breakdown.context_score));
        candidate.breakdown.context_score += points;
        candidate.signals.push(Signal::Page {
            path: prefix.to_string(),
            points,
        });
    }

    let recognised: Vec<(&String, Audience)> = factors
        .products_viewed
        .iter()
        .filter_map(|id| product_audience(id).map(|a| (id, a)))
        .collect();
    if recognised.is_empty() {
        return;
    }

    for audience in Audience::PRIORITY {
        let matched: Vec<String> = recognised
            .iter()
            .filter(|(_, a)| *a == audience)
            .map(|(id, _)| (*id).clone())
            .collect();
        if matched.is_empty() {
            continue;
        }

        let share = config.product_weight as usize * matched.len() / recognised.len();
        let candidate = candidate_mut(candidates, audience);
        let points = (share as u8).min(max.saturating_sub(candidate.breakdown.context_score));
        if points == 0 {
            continue;
        }
        candidate.breakdown.context_score += points;
        candidate.signals.push(Signal::Products {
            matched,
            recognised: recognised.len(),
            points,
        });
    }
}

/// Interaction bias first; engagement then reinforces every audience that
/// already has evidence, so it never changes which audience wins.
fn score_behavior(
    candidates: &mut [CandidateScore],
    factors: &DetectionFactors,
    config: &DetectionConfig,
) {
    let max = config.weights.behavior;

    if let Some(kind) = factors.last_interaction {
        for audience in interaction_audiences(kind) {
            let candidate = candidate_mut(candidates, *audience);
            let points = config.interaction_weight.min(max);
            if points == 0 {
                continue;
            }
            candidate.breakdown.behavior_score = points;
            candidate.signals.push(Signal::Interaction { kind, points });
        }
    }

    let engagement = step_points(&config.pages_steps, factors.pages_visited as u64)
        .saturating_add(step_points(&config.time_steps_ms, factors.time_on_site_ms));
    if engagement == 0 {
        return;
    }

    for candidate in candidates.iter_mut().filter(|c| c.total() > 0) {
        let points = engagement.min(max.saturating_sub(candidate.breakdown.behavior_score));
        candidate.breakdown.behavior_score += points;
        candidate.signals.push(Signal::Engagement {
            pages_visited: factors.pages_visited,
            time_on_site_ms: factors.time_on_site_ms,
            points,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m5max_explain::NO_SIGNAL_REASON;
    use m5max_model::{ConfidenceBand, ConfidenceThresholds, UtmParams};
    use pretty_assertions::assert_eq;

    fn utm(source: &str, campaign: &str) -> UtmParams {
        UtmParams::new(source, "cpc", campaign)
    }

    #[test]
    fn test_no_signal_is_general_zero() {
        let result = detect_default(&DetectionFactors::default());
        assert_eq!(result.suggested_audience, Audience::General);
        assert_eq!(result.confidence, 0);
        assert_eq!(result.breakdown, ScoreBreakdown::default());
        assert_eq!(result.reasons, vec![NO_SIGNAL_REASON.to_string()]);
        assert_eq!(result.method, DetectionMethod::Auto);
    }

    #[test]
    fn test_direct_traffic_scores_nothing() {
        let factors = DetectionFactors::default().with_utm(&UtmParams::direct());
        assert_eq!(detect_default(&factors).confidence, 0);
    }

    #[test]
    fn test_engagement_alone_does_not_classify() {
        let factors = DetectionFactors::default().with_engagement(12, 600_000);
        let result = detect_default(&factors);
        assert_eq!(result.suggested_audience, Audience::General);
        assert_eq!(result.confidence, 0);
    }

    #[test]
    fn test_utm_source_binary_hit() {
        let factors = DetectionFactors::default().with_utm(&utm("Instagram", "verao"));
        let result = detect_default(&factors);
        assert_eq!(result.suggested_audience, Audience::Cha);
        assert_eq!(result.breakdown.utm_score, 40);
        assert_eq!(result.confidence, 40);
    }

    #[test]
    fn test_b2b_groups_count_once() {
        // Source hits B2B_CORPORATE, campaign hits B2B_SPECIALIZED.
        let factors = DetectionFactors::default().with_utm(&utm("linkedin", "cerimonial-2026"));
        let candidates = score_candidates(&factors, &DetectionConfig::default());
        let b2b = &candidates[Audience::B2b.priority()];
        assert_eq!(b2b.breakdown.utm_score, 40);
        assert_eq!(b2b.signals.len(), 1);
    }

    #[test]
    fn test_full_corporate_visit_reaches_100() {
        let factors = DetectionFactors::new("/orcamento-especializado")
            .with_utm(&utm("linkedin", "corporativo-q4"))
            .with_products(["torta-show-200"])
            .with_engagement(7, 300_000)
            .with_interaction(LastInteraction::Service);
        let result = detect_default(&factors);
        assert_eq!(result.suggested_audience, Audience::B2b);
        assert_eq!(
            result.breakdown,
            ScoreBreakdown {
                utm_score: 40,
                context_score: 30,
                behavior_score: 30,
            }
        );
        assert_eq!(result.confidence, 100);
        assert_eq!(result.reasons.len(), 5);
    }

    #[test]
    fn test_tie_broken_by_priority() {
        // "kit-cha-revelacao" hits both B2C_PERSONAL and DIY_KITS.
        let factors = DetectionFactors::default().with_utm(&utm("newsletter", "kit-cha-revelacao"));
        let result = detect_default(&factors);
        assert_eq!(result.suggested_audience, Audience::Cha);

        let factors = DetectionFactors::new("/corporativo").with_products(["kit-cha-surpresa"]);
        let result = detect_default(&factors);
        assert_eq!(result.suggested_audience, Audience::B2b);
        assert_eq!(result.confidence, 15);
    }

    #[test]
    fn test_breakdown_belongs_to_winner() {
        let factors = DetectionFactors::new("/kits").with_utm(&utm("instagram", "verao"));
        let result = detect_default(&factors);
        assert_eq!(result.suggested_audience, Audience::Cha);
        assert_eq!(result.breakdown.utm_score, 40);
        assert_eq!(result.breakdown.context_score, 0);
    }

    #[test]
    fn test_products_share_context_budget() {
        let factors = DetectionFactors::default().with_products([
            "kit-cha-surpresa",
            "kit-diy-basico",
            "vela-aniversario",
        ]);
        let candidates = score_candidates(&factors, &DetectionConfig::default());
        assert_eq!(candidates[Audience::Cha.priority()].breakdown.context_score, 7);
        assert_eq!(candidates[Audience::Kits.priority()].breakdown.context_score, 7);
        assert_eq!(candidates[Audience::B2b.priority()].breakdown.context_score, 0);
    }

    #[test]
    fn test_hero_interaction_suggests_general() {
        let factors = DetectionFactors::default()
            .with_interaction(LastInteraction::Hero)
            .with_engagement(2, 0);
        let result = detect_default(&factors);
        assert_eq!(result.suggested_audience, Audience::General);
        assert_eq!(result.breakdown.behavior_score, 13);
    }

    #[test]
    fn test_score_bounds() {
        let pages = ["/", "/kits", "/cha-revelacao", "/corporativo", "/unknown"];
        let sources = ["instagram", "linkedin", "youtube", "direct"];
        let interactions = [
            None,
            Some(LastInteraction::Product),
            Some(LastInteraction::Service),
            Some(LastInteraction::Footer),
        ];

        for page in pages {
            for source in sources {
                for interaction in interactions {
                    let mut factors = DetectionFactors::new(page)
                        .with_utm(&utm(source, "kit-cha-corporativo-cerimonial"))
                        .with_products(["kit-cha-1", "torta-show-1", "kit-diy-1"])
                        .with_engagement(50, 10_000_000);
                    factors.last_interaction = interaction;

                    let result = detect_default(&factors);
                    let b = result.breakdown;
                    assert!(b.utm_score <= 40);
                    assert!(b.context_score <= 30);
                    assert!(b.behavior_score <= 30);
                    assert_eq!(result.confidence, b.total());
                }
            }
        }
    }

    #[test]
    fn test_behavior_monotonic_in_engagement() {
        let base = DetectionFactors::new("/kits").with_interaction(LastInteraction::Product);
        let mut last = 0;
        for pages in 0..12 {
            let result = detect_default(&base.clone().with_engagement(pages, 0));
            assert!(result.breakdown.behavior_score >= last);
            last = result.breakdown.behavior_score;
        }

        let mut last = 0;
        for time in [0, 10_000, 30_000, 60_000, 120_000, 299_999, 300_000, 900_000] {
            let result = detect_default(&base.clone().with_engagement(3, time));
            assert!(result.breakdown.behavior_score >= last);
            last = result.breakdown.behavior_score;
        }
    }

    #[test]
    fn test_threshold_gating_on_results() {
        let thresholds = ConfidenceThresholds::default();
        let strong = DetectionFactors::new("/cha-revelacao")
            .with_utm(&utm("instagram", "cha-revelacao"))
            .with_engagement(4, 120_000);
        let result = detect_default(&strong);
        assert_eq!(result.confidence, 67);
        assert_eq!(thresholds.band(result.confidence), ConfidenceBand::Suggest);

        let stronger = strong.with_products(["kit-cha-surpresa"]);
        let result = detect_default(&stronger);
        assert_eq!(result.confidence, 82);
        assert_eq!(thresholds.band(result.confidence), ConfidenceBand::AutoClassify);
    }

    #[test]
    fn test_step_points_ignores_order() {
        let steps = [EngagementStep::new(7, 10), EngagementStep::new(2, 3)];
        assert_eq!(step_points(&steps, 1), 0);
        assert_eq!(step_points(&steps, 2), 3);
        assert_eq!(step_points(&steps, 9), 10);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(DetectionConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_config_from_json_and_validation() {
        let config: DetectionConfig = serde_json::from_str(r#"{"weights": {"utm": 50}}"#).unwrap();
        assert_eq!(config.weights.context, 30);
        assert_eq!(config.page_weight, 15);
        assert_eq!(config.validate(), Err(ConfigError::WeightsExceed(110)));

        let config = DetectionConfig {
            page_weight: 20,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ContextBudget { .. })));
    }
}
