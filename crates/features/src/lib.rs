//! Signal extraction helpers for audience detection.
//!
//! Provides pure functions and static tables used in scoring:
//! - Text and path normalization
//! - Query-string parsing
//! - UTM pattern groups (source lists and campaign keywords)
//! - Page → audience and product → audience lookups
//!
//! Every lookup is total: unknown inputs return `None` rather than failing.

use std::collections::BTreeMap;

use m5max_model::{Audience, PatternGroup};

/// Source list and campaign keywords of one UTM pattern group.
#[derive(Debug, Clone, Copy)]
pub struct PatternTable {
    pub group: PatternGroup,
    /// Exact (normalized) utm_source values
    pub sources: &'static [&'static str],
    /// Substrings looked for in the normalized utm_campaign
    pub campaign_keywords: &'static [&'static str],
}

pub const UTM_PATTERNS: &[PatternTable] = &[
    PatternTable {
        group: PatternGroup::B2bCorporate,
        sources: &["linkedin", "google-ads-b2b", "rdstation", "newsletter-corporativa"],
        campaign_keywords: &[
            "corporativo",
            "corporate",
            "empresa",
            "b2b",
            "festival",
            "reveillon-empresas",
        ],
    },
    PatternTable {
        group: PatternGroup::B2cPersonal,
        sources: &["instagram", "facebook", "tiktok", "pinterest"],
        campaign_keywords: &["cha-revelacao", "revelacao", "gender-reveal", "bebe"],
    },
    PatternTable {
        group: PatternGroup::B2bSpecialized,
        sources: &["cerimonialistas", "assessoria", "parceiros"],
        campaign_keywords: &["especializado", "cerimonial", "assessoria", "produtora", "parceiro"],
    },
    PatternTable {
        group: PatternGroup::DiyKits,
        sources: &["youtube", "google-shopping", "mercadolivre"],
        campaign_keywords: &["kit", "diy", "faca-voce-mesmo", "loja"],
    },
];

/// Look up the table of a pattern group.
pub fn pattern_table(group: PatternGroup) -> &'static PatternTable {
    UTM_PATTERNS
        .iter()
        .find(|t| t.group == group)
        .unwrap_or(&UTM_PATTERNS[0])
}

/// How a pattern group was hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtmMatch {
    /// utm_source equals a listed source
    Source(String),
    /// utm_campaign contains a keyword
    Campaign(String),
}

/// Check a pattern group against campaign fields. Source is checked first.
pub fn match_pattern_group(
    table: &PatternTable,
    source: Option<&str>,
    campaign: Option<&str>,
) -> Option<UtmMatch> {
    if let Some(source) = source.map(normalize_token).filter(|s| !s.is_empty()) {
        if table.sources.contains(&source.as_str()) {
            return Some(UtmMatch::Source(source));
        }
    }

    let campaign = campaign.map(normalize_token).filter(|c| !c.is_empty())?;
    table
        .campaign_keywords
        .iter()
        .find(|k| campaign.contains(*k))
        .map(|k| UtmMatch::Campaign(k.to_string()))
}

/// Page path prefixes and the audience they indicate.
pub const PAGE_AUDIENCES: &[(&str, Audience)] = &[
    ("/orcamento-especializado", Audience::B2b),
    ("/corporativo", Audience::B2b),
    ("/eventos-corporativos", Audience::B2b),
    ("/reveillon", Audience::B2b),
    ("/festivais", Audience::B2b),
    ("/cha-revelacao", Audience::Cha),
    ("/gender-reveal", Audience::Cha),
    ("/kits", Audience::Kits),
    ("/faca-voce-mesmo", Audience::Kits),
];

/// Find the audience of a page by longest matching path prefix.
///
/// A prefix only matches on a segment boundary: `/kits` matches `/kits`
/// and `/kits/kit-diy-01` but not `/kitsune`.
pub fn page_audience(path: &str) -> Option<(&'static str, Audience)> {
    let path = normalize_path(path);
    PAGE_AUDIENCES
        .iter()
        .filter(|(prefix, _)| {
            path == *prefix
                || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
        })
        .max_by_key(|(prefix, _)| prefix.len())
        .copied()
}

/// Product id prefixes and the audience category they belong to.
pub const PRODUCT_AUDIENCES: &[(&str, Audience)] = &[
    ("kit-cha-", Audience::Cha),
    ("bastao-fumaca-", Audience::Cha),
    ("cha-", Audience::Cha),
    ("torta-show-", Audience::B2b),
    ("show-", Audience::B2b),
    ("efeito-palco-", Audience::B2b),
    ("kit-diy-", Audience::Kits),
    ("kit-", Audience::Kits),
];

/// Find the audience category of a product id by longest matching prefix.
pub fn product_audience(product_id: &str) -> Option<Audience> {
    let id = normalize_token(product_id);
    PRODUCT_AUDIENCES
        .iter()
        .filter(|(prefix, _)| id.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, audience)| *audience)
}

/// Normalize a free-form token for comparison.
///
/// Lowercases, folds Portuguese accents, and turns spaces and underscores
/// into dashes: `"Chá Revelação_2024"` → `"cha-revelacao-2024"`.
pub fn normalize_token(text: &str) -> String {
    text.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(fold_accent)
        .map(|c| if c == '_' || c.is_whitespace() { '-' } else { c })
        .collect()
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        other => other,
    }
}

/// Normalize a navigation path.
///
/// Drops query and fragment, lowercases, collapses repeated slashes and
/// removes the trailing slash. Empty input becomes `/`.
pub fn normalize_path(path: &str) -> String {
    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

/// Parse a URL query string into a map.
///
/// Accepts a leading `?`. Values are percent-decoded and trimmed; empty
/// values are dropped and the first occurrence of a key wins.
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    let query = query.trim().trim_start_matches('?');
    let mut params = BTreeMap::new();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        params
            .entry(key.trim().to_string())
            .or_insert_with(|| value.to_string());
    }

    params
}

/// Split a full URL or path-with-query into `(path, query)`.
pub fn split_url(url: &str) -> (String, String) {
    if let Ok(parsed) = url::Url::parse(url) {
        return (
            parsed.path().to_string(),
            parsed.query().unwrap_or_default().to_string(),
        );
    }

    let without_fragment = url.split('#').next().unwrap_or_default();
    match without_fragment.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (without_fragment.to_string(), String::new()),
    }
}
