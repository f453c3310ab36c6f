//! Lead scoring.
//!
//! Purely additive: each categorical form answer is looked up in the
//! weight table of the lead's track and the hits are summed. Absent or
//! unknown answers contribute 0; the engine never rejects an answer and
//! never clamps the total.

use std::collections::BTreeMap;

use m5max_features::normalize_token;
use m5max_model::{LeadAnswers, LeadRecord, LeadScore, LeadTrack};
use serde::{Deserialize, Serialize};

const CORPORATE_BUDGET: &[(&str, u32)] = &[
    ("ate-5k", 5),
    ("5k-15k", 10),
    ("15k-30k", 20),
    ("30k-50k", 30),
    ("acima-50k", 40),
];
const CORPORATE_ATTENDEES: &[(&str, u32)] = &[
    ("ate-100", 5),
    ("100-500", 10),
    ("500-1000", 20),
    ("acima-1000", 30),
];
const CORPORATE_EVENT: &[(&str, u32)] = &[
    ("festival", 25),
    ("reveillon", 25),
    ("corporativo", 20),
    ("lancamento", 15),
    ("inauguracao", 15),
];
const CORPORATE_PRODUCT: &[(&str, u32)] = &[
    ("show-pirotecnico", 20),
    ("show-indoor", 15),
    ("efeitos-especiais", 10),
];

const PERSONAL_BUDGET: &[(&str, u32)] = &[
    ("ate-2k", 5),
    ("2k-5k", 10),
    ("5k-15k", 15),
    ("15k-30k", 20),
    ("acima-30k", 25),
];
const PERSONAL_ATTENDEES: &[(&str, u32)] = &[
    ("ate-50", 5),
    ("50-100", 8),
    ("100-200", 12),
    ("acima-200", 15),
];
const PERSONAL_EVENT: &[(&str, u32)] = &[
    ("cha-revelacao", 20),
    ("casamento", 15),
    ("aniversario", 10),
    ("reveillon-familia", 10),
];
const PERSONAL_PRODUCT: &[(&str, u32)] = &[
    ("show-pequeno", 20),
    ("kit-cha-surpresa", 15),
    ("kit-diy", 10),
];

/// Scored form fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadField {
    BudgetRange,
    AttendeesRange,
    EventType,
    ProductType,
}

impl LeadField {
    pub const ALL: [LeadField; 4] = [
        Self::BudgetRange,
        Self::AttendeesRange,
        Self::EventType,
        Self::ProductType,
    ];

    pub fn answer<'a>(&self, answers: &'a LeadAnswers) -> Option<&'a str> {
        match self {
            Self::BudgetRange => answers.budget_range.as_deref(),
            Self::AttendeesRange => answers.attendees_range.as_deref(),
            Self::EventType => answers.event_type.as_deref(),
            Self::ProductType => answers.product_type.as_deref(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BudgetRange => "budgetRange",
            Self::AttendeesRange => "attendeesRange",
            Self::EventType => "eventType",
            Self::ProductType => "productType",
        }
    }
}

/// Weight table of one track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackWeights {
    pub budget_range: BTreeMap<String, u32>,
    pub attendees_range: BTreeMap<String, u32>,
    pub event_type: BTreeMap<String, u32>,
    pub product_type: BTreeMap<String, u32>,
}

impl TrackWeights {
    fn from_tables(
        budget: &[(&str, u32)],
        attendees: &[(&str, u32)],
        event: &[(&str, u32)],
        product: &[(&str, u32)],
    ) -> Self {
        fn table(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
            entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        }
        Self {
            budget_range: table(budget),
            attendees_range: table(attendees),
            event_type: table(event),
            product_type: table(product),
        }
    }

    pub fn field(&self, field: LeadField) -> &BTreeMap<String, u32> {
        match field {
            LeadField::BudgetRange => &self.budget_range,
            LeadField::AttendeesRange => &self.attendees_range,
            LeadField::EventType => &self.event_type,
            LeadField::ProductType => &self.product_type,
        }
    }

    /// Points for one answer; unknown values score 0.
    pub fn points(&self, field: LeadField, value: &str) -> u32 {
        self.field(field)
            .get(&normalize_token(value))
            .copied()
            .unwrap_or(0)
    }
}

/// Weight tables for both tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadWeights {
    pub corporate: TrackWeights,
    pub personal: TrackWeights,
}

impl Default for LeadWeights {
    fn default() -> Self {
        Self {
            corporate: TrackWeights::from_tables(
                CORPORATE_BUDGET,
                CORPORATE_ATTENDEES,
                CORPORATE_EVENT,
                CORPORATE_PRODUCT,
            ),
            personal: TrackWeights::from_tables(
                PERSONAL_BUDGET,
                PERSONAL_ATTENDEES,
                PERSONAL_EVENT,
                PERSONAL_PRODUCT,
            ),
        }
    }
}

impl LeadWeights {
    pub fn track(&self, track: LeadTrack) -> &TrackWeights {
        match track {
            LeadTrack::Corporate => &self.corporate,
            LeadTrack::Personal => &self.personal,
        }
    }
}

/// Points contributed by each answered field, in form order.
pub fn field_points(
    track: LeadTrack,
    answers: &LeadAnswers,
    weights: &LeadWeights,
) -> Vec<(LeadField, u32)> {
    let table = weights.track(track);
    LeadField::ALL
        .iter()
        .filter_map(|field| {
            field
                .answer(answers)
                .map(|value| (*field, table.points(*field, value)))
        })
        .collect()
}

/// Score a lead with the given weight tables.
pub fn score_lead(track: LeadTrack, answers: &LeadAnswers, weights: &LeadWeights) -> LeadScore {
    field_points(track, answers, weights)
        .iter()
        .map(|(_, points)| points)
        .sum()
}

/// Score a lead with the built-in weight tables.
pub fn score_lead_default(track: LeadTrack, answers: &LeadAnswers) -> LeadScore {
    score_lead(track, answers, &LeadWeights::default())
}

/// Compute and attach the score of a lead record.
pub fn score_record(record: &mut LeadRecord, weights: &LeadWeights) -> LeadScore {
    record.score = score_lead(record.track, &record.answers, weights);
    tracing::debug!(track = record.track.as_str(), score = record.score, "Scored lead");
    record.score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personal_cha_revelacao_total() {
        let answers = LeadAnswers::default()
            .with_event("cha-revelacao")
            .with_budget("15k-30k")
            .with_attendees("100-200")
            .with_product("kit-cha-surpresa");
        assert_eq!(score_lead_default(LeadTrack::Personal, &answers), 20 + 20 + 12 + 15);
    }

    #[test]
    fn test_corporate_festival_total() {
        let answers = LeadAnswers::default()
            .with_event("festival")
            .with_budget("acima-50k")
            .with_attendees("acima-1000")
            .with_product("show-pirotecnico");
        assert_eq!(score_lead_default(LeadTrack::Corporate, &answers), 25 + 40 + 30 + 20);
    }

    #[test]
    fn test_unknown_category_scores_zero() {
        let answers = LeadAnswers::default().with_event("nonexistent");
        assert_eq!(score_lead_default(LeadTrack::Personal, &answers), 0);
        assert_eq!(score_lead_default(LeadTrack::Corporate, &answers), 0);

        let mixed = LeadAnswers::default()
            .with_event("nonexistent")
            .with_budget("5k-15k");
        assert_eq!(score_lead_default(LeadTrack::Corporate, &mixed), 10);
    }

    #[test]
    fn test_track_vocabulary_is_separate() {
        let cha = LeadAnswers::default().with_event("cha-revelacao");
        assert_eq!(score_lead_default(LeadTrack::Corporate, &cha), 0);

        let festival = LeadAnswers::default().with_event("festival");
        assert_eq!(score_lead_default(LeadTrack::Personal, &festival), 0);
    }

    #[test]
    fn test_empty_answers() {
        assert_eq!(score_lead_default(LeadTrack::Personal, &LeadAnswers::default()), 0);
        assert!(field_points(LeadTrack::Personal, &LeadAnswers::default(), &LeadWeights::default()).is_empty());
    }

    #[test]
    fn test_answers_are_normalized() {
        let answers = LeadAnswers::default().with_event("  Chá Revelação ");
        assert_eq!(score_lead_default(LeadTrack::Personal, &answers), 20);
    }

    #[test]
    fn test_alternate_weights_from_json() {
        let weights: LeadWeights =
            serde_json::from_str(r#"{"personal": {"eventType": {"cha-revelacao": 50}}}"#).unwrap();
        let answers = LeadAnswers::default()
            .with_event("cha-revelacao")
            .with_budget("15k-30k");
        assert_eq!(score_lead(LeadTrack::Personal, &answers, &weights), 50);
        assert!(weights.personal.budget_range.is_empty());
        assert_eq!(weights.corporate, LeadWeights::default().corporate);
    }

    #[test]
    fn test_score_record_attaches_score() {
        let mut record = LeadRecord::new("Bia", "11999990000", LeadTrack::Personal);
        record.answers = LeadAnswers::default().with_product("kit-diy");
        assert_eq!(score_record(&mut record, &LeadWeights::default()), 10);
        assert_eq!(record.score, 10);
    }
}
