//! Visitor consent for analytics and marketing tags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a piece of data may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentPurpose {
    /// Required for the site to work; always allowed
    Necessary,
    /// GA4 / GTM measurement
    Analytics,
    /// Meta Pixel, campaign tags in outbound messages
    Marketing,
}

/// Consent choices, persisted under `m5max-consent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentPreferences {
    #[serde(default = "always")]
    pub necessary: bool,
    #[serde(default)]
    pub analytics: bool,
    #[serde(default)]
    pub marketing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn always() -> bool {
    true
}

impl Default for ConsentPreferences {
    fn default() -> Self {
        Self {
            necessary: true,
            analytics: false,
            marketing: false,
            updated_at: None,
        }
    }
}

impl ConsentPreferences {
    pub fn accept_all(at: DateTime<Utc>) -> Self {
        Self {
            necessary: true,
            analytics: true,
            marketing: true,
            updated_at: Some(at),
        }
    }

    pub fn reject_all(at: DateTime<Utc>) -> Self {
        Self {
            updated_at: Some(at),
            ..Self::default()
        }
    }

    pub fn allows(&self, purpose: ConsentPurpose) -> bool {
        match purpose {
            ConsentPurpose::Necessary => true,
            ConsentPurpose::Analytics => self.analytics,
            ConsentPurpose::Marketing => self.marketing,
        }
    }

    /// Whether the visitor has answered the consent banner.
    pub fn is_answered(&self) -> bool {
        self.updated_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unanswered() {
        let consent = ConsentPreferences::default();
        assert!(!consent.is_answered());
        assert!(consent.allows(ConsentPurpose::Necessary));
        assert!(!consent.allows(ConsentPurpose::Marketing));
    }

    #[test]
    fn test_reject_all_keeps_necessary_only() {
        let consent = ConsentPreferences::reject_all(Utc::now());
        assert!(consent.is_answered());
        assert!(consent.allows(ConsentPurpose::Necessary));
        assert!(!consent.allows(ConsentPurpose::Analytics));
        assert!(!consent.allows(ConsentPurpose::Marketing));
    }
}
