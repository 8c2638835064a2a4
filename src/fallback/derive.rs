// src/fallback/derive.rs
//! Pattern-based content inference for the derived-content strategy.

use once_cell::sync::Lazy;
use regex::Regex;

use super::templates;
use crate::target::{CollectionTarget, Snapshot};

/// What a deriver could infer about a target.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedContent {
    pub title: String,
    pub description: String,
    pub key_features: Vec<String>,
    pub pricing_note: Option<String>,
    /// Short labels of what the inference was based on.
    pub signals: Vec<String>,
}

/// Content-generation capability. The derived-content strategy is only
/// applicable when one is registered and it can derive for the target.
pub trait ContentDeriver: Send + Sync {
    fn can_derive(&self, target: &CollectionTarget, latest: Option<&Snapshot>) -> bool;
    fn derive(&self, target: &CollectionTarget, latest: Option<&Snapshot>) -> Option<DerivedContent>;
}

static RE_PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:[$€£]\s?\d+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?\s?(?:usd|eur|gbp))(?:\s*(?:/|per)\s*(?:month|mo|user|seat|year|yr))?")
        .expect("price regex")
});

static RE_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+(.{3,120}?)\s*$").expect("bullet regex"));

static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*#{1,3}\s+(.{3,120}?)\s*$").expect("heading regex"));

/// Bullet-list lines from captured text, first `max`, deduplicated.
pub fn extract_features(content: &str, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in RE_BULLET.captures_iter(content) {
        let line = caps[1].trim().to_string();
        if !out.iter().any(|f| f.eq_ignore_ascii_case(&line)) {
            out.push(line);
        }
        if out.len() >= max {
            break;
        }
    }
    out
}

/// First price-looking phrase in the text.
pub fn extract_price(content: &str) -> Option<String> {
    RE_PRICE.find(content).map(|m| m.as_str().trim().to_string())
}

pub fn extract_heading(content: &str) -> Option<String> {
    RE_HEADING
        .captures(content)
        .map(|c| c[1].trim().to_string())
}

/// Regex-driven deriver: works from the last snapshot text plus host/name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDeriver;

impl ContentDeriver for PatternDeriver {
    fn can_derive(&self, target: &CollectionTarget, latest: Option<&Snapshot>) -> bool {
        let has_text = latest.is_some_and(|s| !s.content.trim().is_empty());
        has_text || templates::classify(&templates::haystack_for(target, None)).is_some()
    }

    fn derive(&self, target: &CollectionTarget, latest: Option<&Snapshot>) -> Option<DerivedContent> {
        if !self.can_derive(target, latest) {
            return None;
        }
        let text = latest.map(|s| s.content.as_str()).unwrap_or_default();
        let mut signals = Vec::new();

        let industry = templates::infer_industry(target, Some(text));
        signals.push(format!("industry:{industry}"));

        let heading = extract_heading(text);
        if heading.is_some() {
            signals.push("heading".to_string());
        }
        let mut key_features = extract_features(text, 6);
        if key_features.is_empty() {
            key_features = templates::template_for(industry)
                .features
                .iter()
                .map(|s| s.to_string())
                .collect();
        } else {
            signals.push(format!("features:{}", key_features.len()));
        }
        let pricing_note = extract_price(text);
        if pricing_note.is_some() {
            signals.push("pricing".to_string());
        }

        let label = templates::template_for(industry).label;
        let description = match &heading {
            Some(h) => format!("{}: {h}. Inferred as a {label} offering.", target.name),
            None => format!("{} appears to be a {label} offering.", target.name),
        };

        Some(DerivedContent {
            title: target.name.clone(),
            description,
            key_features,
            pricing_note,
            signals,
        })
    }
}
