//! Lead Discovery: turns a niche query and a city into scored, filtered leads.
//!
//! Flow: geocode city → text search near centroid → fetch details for the first
//! `MAX_DETAILED_RESULTS` hits concurrently → derive location → score → post-filter.
//!
//! Persisting the result is the caller's job (see `leads::store::save_leads`).

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::discovery::places::{PlaceDetails, PlaceSummary, PlacesClient, PlacesError};
use crate::leads::scoring::{is_own_website, score_lead, ScoreInput};
use crate::models::lead::{LeadOrigin, NewLead};

/// Only this many search hits get a details lookup.
pub const MAX_DETAILED_RESULTS: usize = 20;

/// Stored as the state when the provider returns no address components for it.
pub const UNKNOWN_STATE: &str = "N/A";

// ────────────────────────────────────────────────────────────────────────────
// Filters
// ────────────────────────────────────────────────────────────────────────────

/// Post-search filters, applied in field order. Unset filters keep every lead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub min_rating: Option<f64>,
    pub min_reviews: Option<i32>,
    #[serde(default)]
    pub only_without_website: bool,
    #[serde(default)]
    pub only_with_phone: bool,
}

impl SearchFilters {
    pub fn apply(&self, leads: Vec<NewLead>) -> Vec<NewLead> {
        leads
            .into_iter()
            .filter(|l| {
                self.min_rating
                    .map_or(true, |min| l.rating.is_some_and(|r| r >= min))
            })
            .filter(|l| {
                self.min_reviews
                    .map_or(true, |min| l.review_count.is_some_and(|n| n >= min))
            })
            .filter(|l| !self.only_without_website || !l.has_own_website)
            .filter(|l| {
                !self.only_with_phone || l.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
            })
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Search pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Runs a discovery search. Without a usable API key this returns sample leads
/// instead of calling the provider, so the rest of the system stays usable offline.
pub async fn search_leads(
    places: &PlacesClient,
    query: &str,
    city: &str,
    segment: &str,
    filters: &SearchFilters,
) -> Result<Vec<NewLead>, PlacesError> {
    if !places.is_configured() {
        warn!("Google Places API key not configured, returning sample leads");
        return Ok(sample_leads(city, segment));
    }

    let centroid = places.geocode(city).await?;
    let hits = places
        .text_search(&format!("{query} {city}"), centroid)
        .await?;
    info!("Places search '{query}' in {city}: {} hits", hits.len());

    let lookups = hits
        .iter()
        .take(MAX_DETAILED_RESULTS)
        .map(|hit| fetch_details(places, hit));
    let detailed: Vec<(PlaceSummary, PlaceDetails)> =
        join_all(lookups).await.into_iter().flatten().collect();

    let leads: Vec<NewLead> = detailed
        .into_iter()
        .map(|(summary, details)| build_lead(&summary, &details, city, segment))
        .collect();

    let total = leads.len();
    let filtered = filters.apply(leads);
    info!("Discovery kept {}/{} leads after filters", filtered.len(), total);
    Ok(filtered)
}

/// Details lookup whose failure only drops this one hit.
async fn fetch_details(
    places: &PlacesClient,
    hit: &PlaceSummary,
) -> Option<(PlaceSummary, PlaceDetails)> {
    match places.details(&hit.place_id).await {
        Ok(details) => Some((hit.clone(), details)),
        Err(e) => {
            warn!("Dropping place {} ({}): details fetch failed: {e}", hit.place_id, hit.name);
            None
        }
    }
}

/// Assembles a scored lead from a search hit and its details.
pub fn build_lead(
    summary: &PlaceSummary,
    details: &PlaceDetails,
    fallback_city: &str,
    segment: &str,
) -> NewLead {
    let city = details
        .component(&["administrative_area_level_2", "locality"])
        .map(|c| c.long_name.clone())
        .unwrap_or_else(|| fallback_city.to_string());
    let state = details
        .component(&["administrative_area_level_1"])
        .map(|c| c.short_name.clone())
        .unwrap_or_else(|| UNKNOWN_STATE.to_string());

    let phone = details.phone().map(str::to_string);
    let website = details.website.clone().filter(|w| !w.trim().is_empty());
    let location = details
        .geometry
        .as_ref()
        .or(summary.geometry.as_ref())
        .map(|g| g.location);

    let score = score_lead(&ScoreInput {
        website: website.as_deref(),
        rating: details.rating,
        review_count: details.user_ratings_total,
        phone: phone.as_deref(),
    });

    NewLead {
        name: details.name.clone().unwrap_or_else(|| summary.name.clone()),
        address: details
            .formatted_address
            .clone()
            .or_else(|| summary.formatted_address.clone()),
        city,
        state,
        has_own_website: is_own_website(website.as_deref()),
        phone,
        email: None,
        website,
        rating: details.rating,
        review_count: details.user_ratings_total,
        segment: segment.to_string(),
        score,
        origin: LeadOrigin::GooglePlaces,
        google_place_id: Some(
            details
                .place_id
                .clone()
                .unwrap_or_else(|| summary.place_id.clone()),
        ),
        latitude: location.map(|l| l.lat),
        longitude: location.map(|l| l.lng),
    }
}

/// Two fixed example leads served when the provider is not configured.
pub fn sample_leads(city: &str, segment: &str) -> Vec<NewLead> {
    let samples = [
        ("Exemplo Comércio Local", "(11) 98765-4321", None, Some(4.7), Some(128)),
        (
            "Exemplo Serviços Ltda",
            "(11) 91234-5678",
            Some("https://instagram.com/exemploservicos"),
            Some(4.2),
            Some(37),
        ),
    ];

    samples
        .into_iter()
        .map(|(name, phone, website, rating, reviews)| NewLead {
            name: name.to_string(),
            address: Some(format!("Rua Exemplo, 100 - {city}")),
            city: city.to_string(),
            state: UNKNOWN_STATE.to_string(),
            phone: Some(phone.to_string()),
            email: None,
            website: website.map(str::to_string),
            rating,
            review_count: reviews,
            segment: segment.to_string(),
            score: score_lead(&ScoreInput {
                website,
                rating,
                review_count: reviews,
                phone: Some(phone),
            }),
            has_own_website: is_own_website(website),
            origin: LeadOrigin::GooglePlaces,
            google_place_id: None,
            latitude: None,
            longitude: None,
        })
        .collect()
}
