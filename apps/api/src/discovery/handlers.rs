//! Axum route handlers for lead discovery.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::discovery::search::{search_leads, SearchFilters};
use crate::errors::AppError;
use crate::leads::store::save_leads;
use crate::models::lead::LeadRow;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CollectRequest {
    pub query: Option<String>,
    pub city: Option<String>,
    /// Niche label stored on each lead. Defaults to the query text.
    pub segment: Option<String>,
    #[serde(flatten)]
    pub filters: SearchFilters,
}

#[derive(Debug, Serialize)]
pub struct CollectResponse {
    pub message: String,
    pub count: usize,
    pub data: Vec<LeadRow>,
}

/// POST /api/leads/collect
///
/// Searches the places provider, persists every surviving lead and returns them.
pub async fn handle_collect(
    State(state): State<AppState>,
    payload: Result<Json<CollectRequest>, JsonRejection>,
) -> Result<Json<CollectResponse>, AppError> {
    let Json(req) = payload?;
    let query = required(req.query.as_deref(), "query")?;
    let city = required(req.city.as_deref(), "city")?;
    let segment = req
        .segment
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(query);

    let found = search_leads(&state.places, query, city, segment, &req.filters).await?;
    let data = save_leads(&state.db, &found).await?;

    Ok(Json(CollectResponse {
        message: format!("Collected {} leads for '{query}' in {city}", data.len()),
        count: data.len(),
        data,
    }))
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_request_flattens_filters() {
        let req: CollectRequest = serde_json::from_str(
            r#"{"query":"padaria","city":"Campinas","min_rating":4.0,"only_with_phone":true}"#,
        )
        .unwrap();
        assert_eq!(req.filters.min_rating, Some(4.0));
        assert!(req.filters.only_with_phone);
        assert!(!req.filters.only_without_website);
    }

    #[test]
    fn test_required_rejects_blank() {
        assert!(required(Some("  "), "city").is_err());
        assert!(required(None, "city").is_err());
        assert_eq!(required(Some(" Campinas "), "city").unwrap(), "Campinas");
    }
}
