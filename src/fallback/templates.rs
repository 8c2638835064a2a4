// src/fallback/templates.rs
//! Static industry templates for the template-content strategy.
//!
//! Industry is guessed from the target's host, name, and (if present) the
//! last snapshot text. First matching rule wins; `general` otherwise.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::target::CollectionTarget;

pub struct IndustryTemplate {
    pub industry: &'static str,
    pub label: &'static str,
    pub features: &'static [&'static str],
    pub pricing_hint: &'static str,
}

const TEMPLATES: &[IndustryTemplate] = &[
    IndustryTemplate {
        industry: "fintech",
        label: "financial technology",
        features: &["Online payments", "Account management", "Security and compliance"],
        pricing_hint: "Typically transaction-based or tiered subscription pricing",
    },
    IndustryTemplate {
        industry: "ecommerce",
        label: "e-commerce",
        features: &["Product catalog", "Checkout and cart", "Order tracking"],
        pricing_hint: "Typically per-product retail pricing with promotions",
    },
    IndustryTemplate {
        industry: "health",
        label: "healthcare",
        features: &["Patient services", "Appointment booking", "Care information"],
        pricing_hint: "Pricing usually depends on plan or provider",
    },
    IndustryTemplate {
        industry: "education",
        label: "education",
        features: &["Course catalog", "Learning materials", "Progress tracking"],
        pricing_hint: "Typically per-course or subscription pricing",
    },
    IndustryTemplate {
        industry: "travel",
        label: "travel and hospitality",
        features: &["Search and booking", "Itinerary management", "Customer support"],
        pricing_hint: "Dynamic pricing based on dates and availability",
    },
    IndustryTemplate {
        industry: "media",
        label: "media and entertainment",
        features: &["Content library", "Streaming or publishing", "Personalized recommendations"],
        pricing_hint: "Typically ad-supported or subscription pricing",
    },
    IndustryTemplate {
        industry: "saas",
        label: "software",
        features: &["Web application", "Integrations and API", "Team collaboration"],
        pricing_hint: "Typically tiered per-seat subscription pricing",
    },
    IndustryTemplate {
        industry: "general",
        label: "business",
        features: &["Products and services", "Customer support"],
        pricing_hint: "Pricing not published in available data",
    },
];

static RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        // Compounds are matched at word edges only ("acmepay", "shopfront"), never mid-word.
        ("fintech", r"(?i)\b(pay\w*|\w+pay|bank\w*|financ\w*|fintech|invest\w*|lend\w*|wallet|card)s?\b"),
        ("ecommerce", r"(?i)\b(shop\w*|store|cart|\w*commerce|marketplace|retail|buy)s?\b"),
        ("health", r"(?i)\b(health\w*|\w*care|clinic|medical|med|pharma\w*|doctor|patient)s?\b"),
        ("education", r"(?i)\b(learn\w*|edu|education|course|school|academy|tutor\w*)s?\b"),
        ("travel", r"(?i)\b(travel|trip|hotel|flights?|booking|vacation)s?\b"),
        ("media", r"(?i)\b(news|media|video|stream\w*|music|podcast)s?\b"),
        ("saas", r"(?i)\b(api|cloud|dev|code|data|software|platform|app|saas|analytics)s?\b"),
    ]
    .into_iter()
    .filter_map(|(k, p)| Regex::new(p).ok().map(|re| (k, re)))
    .collect()
});

/// Classify using the first rule that matches `haystack`.
pub fn classify(haystack: &str) -> Option<&'static str> {
    RULES
        .iter()
        .find(|(_, re)| re.is_match(haystack))
        .map(|(k, _)| *k)
}

/// Text used to infer the industry: host words, name, optional extra text.
pub fn haystack_for(target: &CollectionTarget, extra: Option<&str>) -> String {
    let host = target
        .host()
        .map(|h| h.replace(['.', '-'], " "))
        .unwrap_or_default();
    let mut s = format!("{host} {}", target.name);
    if let Some(e) = extra {
        s.push(' ');
        s.push_str(e);
    }
    s
}

pub fn infer_industry(target: &CollectionTarget, extra: Option<&str>) -> &'static str {
    classify(&haystack_for(target, extra)).unwrap_or("general")
}

pub fn template_for(industry: &str) -> &'static IndustryTemplate {
    TEMPLATES
        .iter()
        .find(|t| t.industry == industry)
        .unwrap_or(&TEMPLATES[TEMPLATES.len() - 1])
}
