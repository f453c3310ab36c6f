//! Explanation generation for audience detection.
//!
//! Converts detection signals into human-readable reasons suitable for
//! display in the qualification wizard and for debugging a triage pass.

use m5max_model::{Audience, ConfidenceThresholds, DetectionResult, Signal};
use serde::{Deserialize, Serialize};

/// Reason given when nothing points at any audience.
pub const NO_SIGNAL_REASON: &str = "No audience signals detected; showing the general flow";

/// A structured explanation of one detection signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    /// Short summary (1 line), used as the detection reason
    pub summary: String,

    /// Longer description for debugging views
    pub detail: String,

    /// Points the signal contributed
    pub points: u8,

    /// Evidence items supporting this explanation
    pub evidence: Vec<EvidenceItem>,
}

/// A piece of evidence supporting a signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Type of evidence
    pub kind: String,

    /// The specific value or match
    pub value: String,

    /// Optional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Ordered reason lines for a list of signals.
pub fn reasons(signals: &[Signal], audience: Audience) -> Vec<String> {
    if signals.is_empty() {
        return vec![NO_SIGNAL_REASON.to_string()];
    }
    explain_signals(signals, audience)
        .into_iter()
        .map(|e| e.summary)
        .collect()
}

/// Full explanations for a candidate's signals, in evaluation order.
pub fn explain_signals(signals: &[Signal], audience: Audience) -> Vec<Explanation> {
    signals.iter().map(|s| explain_signal(s, audience)).collect()
}

/// Generate the explanation for a single signal.
pub fn explain_signal(signal: &Signal, audience: Audience) -> Explanation {
    match signal {
        Signal::UtmSource {
            group,
            source,
            points,
        } => Explanation {
            summary: format!("Traffic source '{}' matches {} (+{})", source, group.name(), points),
            detail: format!(
                "The campaign source '{}' is listed in the {} pattern group, \
                 which points to the {} audience.",
                source,
                group.name(),
                audience.label()
            ),
            points: *points,
            evidence: vec![EvidenceItem {
                kind: "utm_source".to_string(),
                value: source.clone(),
                context: Some(group.name().to_string()),
            }],
        },

        Signal::UtmCampaign {
            group,
            keyword,
            points,
        } => Explanation {
            summary: format!("Campaign mentions '{}' ({}, +{})", keyword, group.name(), points),
            detail: format!(
                "The campaign name contains the keyword '{}' from the {} pattern group.",
                keyword,
                group.name()
            ),
            points: *points,
            evidence: vec![EvidenceItem {
                kind: "utm_campaign".to_string(),
                value: keyword.clone(),
                context: Some(group.name().to_string()),
            }],
        },

        Signal::Page { path, points } => Explanation {
            summary: format!("Browsing {} ({} page, +{})", path, audience.label(), points),
            detail: format!(
                "The current page '{}' is dedicated to the {} audience.",
                path,
                audience.label()
            ),
            points: *points,
            evidence: vec![EvidenceItem {
                kind: "page".to_string(),
                value: path.clone(),
                context: None,
            }],
        },

        Signal::Products {
            matched,
            recognised,
            points,
        } => Explanation {
            summary: format!(
                "Viewed {} of {} catalogued product(s) for {} (+{})",
                matched.len(),
                recognised,
                audience.label(),
                points
            ),
            detail: format!(
                "Products viewed this session that belong to {}: {}.",
                audience.label(),
                matched.join(", ")
            ),
            points: *points,
            evidence: matched
                .iter()
                .map(|id| EvidenceItem {
                    kind: "product".to_string(),
                    value: id.clone(),
                    context: None,
                })
                .collect(),
        },

        Signal::Interaction { kind, points } => Explanation {
            summary: format!("Last interaction was {} (+{})", kind.as_str(), points),
            detail: format!(
                "A '{}' interaction is typical of {} visitors.",
                kind.as_str(),
                audience.label()
            ),
            points: *points,
            evidence: vec![EvidenceItem {
                kind: "interaction".to_string(),
                value: kind.as_str().to_string(),
                context: None,
            }],
        },

        Signal::Engagement {
            pages_visited,
            time_on_site_ms,
            points,
        } => Explanation {
            summary: format!(
                "Engaged visit: {} page(s), {}s on site (+{})",
                pages_visited,
                time_on_site_ms / 1000,
                points
            ),
            detail: "Longer visits across more pages make the detected audience more \
                     reliable."
                .to_string(),
            points: *points,
            evidence: vec![
                EvidenceItem {
                    kind: "pages_visited".to_string(),
                    value: pages_visited.to_string(),
                    context: None,
                },
                EvidenceItem {
                    kind: "time_on_site_ms".to_string(),
                    value: time_on_site_ms.to_string(),
                    context: None,
                },
            ],
        },
    }
}

/// One-line summary of a detection result and the flow it leads to.
pub fn summarize_detection(result: &DetectionResult, thresholds: &ConfidenceThresholds) -> String {
    let band = thresholds.band(result.confidence);
    format!(
        "{} ({}%, {}) via {:?}: utm {} / context {} / behavior {}",
        result.suggested_audience.label(),
        result.confidence,
        band.label(),
        result.method,
        result.breakdown.utm_score,
        result.breakdown.context_score,
        result.breakdown.behavior_score
    )
}
