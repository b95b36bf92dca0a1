use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::leads::scoring::{is_own_website, score_lead, ScoreInput};
use crate::leads::store::{
    get_lead, insert_lead, is_unique_violation, list_leads, set_lead_status, LeadQuery,
};
use crate::models::lead::{LeadOrigin, LeadRow, LeadStatus, NewLead};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    #[serde(default)]
    pub segment: String,
}

impl CreateLeadRequest {
    fn into_new_lead(self) -> Result<NewLead, AppError> {
        let name = self.name.trim().to_string();
        let city = self.city.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
        if city.is_empty() {
            return Err(AppError::Validation("city cannot be empty".to_string()));
        }
        if self.rating.is_some_and(|r| !(0.0..=5.0).contains(&r)) {
            return Err(AppError::Validation("rating must be between 0 and 5".to_string()));
        }

        let score = score_lead(&ScoreInput {
            website: self.website.as_deref(),
            rating: self.rating,
            review_count: self.review_count,
            phone: self.phone.as_deref(),
        });

        Ok(NewLead {
            has_own_website: is_own_website(self.website.as_deref()),
            name,
            address: self.address,
            city,
            state: self
                .state
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| crate::discovery::search::UNKNOWN_STATE.to_string()),
            phone: self.phone,
            email: self.email,
            website: self.website,
            rating: self.rating,
            review_count: self.review_count,
            segment: self.segment.trim().to_string(),
            score,
            origin: LeadOrigin::Manual,
            google_place_id: None,
            latitude: None,
            longitude: None,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: LeadStatus,
}

/// GET /api/leads
pub async fn handle_list_leads(
    State(state): State<AppState>,
    Query(query): Query<LeadQuery>,
) -> Result<Json<Vec<LeadRow>>, AppError> {
    Ok(Json(list_leads(&state.db, &query).await?))
}

/// GET /api/leads/:id
pub async fn handle_get_lead(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeadRow>, AppError> {
    let lead = get_lead(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {id} not found")))?;
    Ok(Json(lead))
}

/// POST /api/leads
pub async fn handle_create_lead(
    State(state): State<AppState>,
    payload: Result<Json<CreateLeadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LeadRow>), AppError> {
    let Json(req) = payload?;
    let new_lead = req.into_new_lead()?;
    let lead = insert_lead(&state.db, &new_lead)
        .await
        .map_err(|e| creation_error(e, &new_lead))?;
    Ok((StatusCode::CREATED, Json(lead)))
}

fn creation_error(e: sqlx::Error, lead: &NewLead) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict(format!(
            "A lead named '{}' already exists in {}",
            lead.name, lead.city
        ))
    } else {
        AppError::Database(e)
    }
}

/// PATCH /api/leads/:id/status
///
/// Any status may be set; the pipeline order is a convention, not enforced.
pub async fn handle_update_lead_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(req) = payload?;
    if !set_lead_status(&state.db, id, req.status).await? {
        return Err(AppError::NotFound(format!("Lead {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> CreateLeadRequest {
        CreateLeadRequest {
            name: name.into(),
            city: "Campinas".into(),
            state: None,
            address: None,
            phone: Some("(19) 99999-0000".into()),
            email: None,
            website: Some("https://instagram.com/studio".into()),
            rating: None,
            review_count: None,
            segment: " estética ".into(),
        }
    }

    #[test]
    fn test_manual_lead_is_scored() {
        let lead = request("Studio Bela").into_new_lead().unwrap();
        assert_eq!(lead.score, 50);
        assert_eq!(lead.origin, LeadOrigin::Manual);
        assert_eq!(lead.segment, "estética");
        assert!(!lead.has_own_website);
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(matches!(
            request("   ").into_new_lead(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_other_insert_failures_stay_database_errors() {
        let lead = request("Studio Bela").into_new_lead().unwrap();
        assert!(matches!(
            creation_error(sqlx::Error::PoolTimedOut, &lead),
            AppError::Database(_)
        ));
    }

    mod db {
        use axum::extract::State;
        use axum::Json;
        use axum::http::StatusCode;
        use sqlx::PgPool;
        use std::sync::Arc;
        use std::time::Duration;

        use super::request;
        use crate::campaigns::dispatch::memory::MemoryDispatchStore;
        use crate::discovery::places::PlacesClient;
        use crate::errors::AppError;
        use crate::leads::handlers::handle_create_lead;
        use crate::messaging::whatsapp::WhatsAppClient;
        use crate::state::AppState;

        fn state(db: PgPool) -> AppState {
            AppState {
                db,
                places: PlacesClient::new(None, "http://127.0.0.1:1".into(), 10_000, Duration::from_secs(1))
                    .unwrap(),
                whatsapp: WhatsAppClient::new(None, Duration::from_secs(1)).unwrap(),
                dispatch: Arc::new(MemoryDispatchStore::default()),
            }
        }

        #[sqlx::test]
        #[ignore = "needs a Postgres DATABASE_URL"]
        async fn test_duplicate_manual_lead_is_conflict(pool: PgPool) {
            let (status, _) = handle_create_lead(State(state(pool.clone())), Ok(Json(request("Studio Bela"))))
                .await
                .unwrap();
            assert_eq!(status, StatusCode::CREATED);

            let err = handle_create_lead(State(state(pool)), Ok(Json(request("Studio Bela"))))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Conflict(_)));
        }
    }
}
