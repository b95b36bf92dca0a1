//! Lead qualification score: additive bonuses capped at 100.
//!
//! Businesses without their own website are the best prospects, so that bonus
//! dominates. Missing optional fields simply do not earn their bonus.

/// Domains that host a business profile rather than the business's own site.
pub const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "whatsapp.com",
    "wa.me",
    "youtube.com",
    "linkedin.com",
    "linktr.ee",
    "twitter.com",
    "tiktok.com",
];

pub const NO_WEBSITE_BONUS: i32 = 40;
pub const HIGH_RATING_BONUS: i32 = 20;
pub const MANY_REVIEWS_BONUS: i32 = 15;
pub const HAS_PHONE_BONUS: i32 = 10;
pub const MAX_SCORE: i32 = 100;

const HIGH_RATING_THRESHOLD: f64 = 4.5;
const MANY_REVIEWS_THRESHOLD: i32 = 50;

/// The attributes the score depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInput<'a> {
    pub website: Option<&'a str>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub phone: Option<&'a str>,
}

/// Returns true when `website` is present and not a social or link-aggregator profile.
pub fn is_own_website(website: Option<&str>) -> bool {
    let Some(url) = website.map(str::trim).filter(|w| !w.is_empty()) else {
        return false;
    };
    let host = extract_host(url);
    !SOCIAL_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// Computes the qualification score in [0, 100].
pub fn score_lead(input: &ScoreInput<'_>) -> i32 {
    let mut score = 0;
    if !is_own_website(input.website) {
        score += NO_WEBSITE_BONUS;
    }
    if input.rating.is_some_and(|r| r > HIGH_RATING_THRESHOLD) {
        score += HIGH_RATING_BONUS;
    }
    if input.review_count.is_some_and(|n| n > MANY_REVIEWS_THRESHOLD) {
        score += MANY_REVIEWS_BONUS;
    }
    if input.phone.is_some_and(|p| !p.trim().is_empty()) {
        score += HAS_PHONE_BONUS;
    }
    score.min(MAX_SCORE)
}

/// Lower-cased host of a URL, tolerating a missing scheme.
fn extract_host(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.rsplit('@').next().unwrap_or(host);
    let host = host.split(':').next().unwrap_or(host);
    host.trim_start_matches("www.").to_ascii_lowercase()
}
