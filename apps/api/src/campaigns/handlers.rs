//! Axum route handlers for the Campaign API.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::campaigns::dispatch::{compute_active_tasks, OutreachTask};
use crate::campaigns::store::{
    create_campaign, dequeue_leads, enqueue_leads, get_campaign, list_campaigns, list_enrolments,
    update_campaign, CampaignUpdate, EnrolmentView, NewCampaign,
};
use crate::campaigns::tracker::{track_send, validate_send_status, SendReport};
use crate::errors::AppError;
use crate::models::campaign::{CampaignFilters, CampaignLeadStatus, CampaignRow, CampaignStatus};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub status: Option<CampaignStatus>,
    #[serde(default)]
    pub message_template: String,
    pub daily_limit: i32,
    #[serde(default)]
    pub filters: CampaignFilters,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub status: Option<CampaignStatus>,
    pub message_template: Option<String>,
    pub daily_limit: Option<i32>,
    pub filters: Option<CampaignFilters>,
}

#[derive(Debug, Deserialize)]
pub struct TrackSendRequest {
    pub lead_id: Option<Uuid>,
    pub status: Option<CampaignLeadStatus>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadIdsRequest {
    pub lead_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub success: bool,
    pub message: String,
}

impl CreateCampaignRequest {
    fn validated(self) -> Result<NewCampaign, AppError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
        validate_daily_limit(self.daily_limit)?;
        Ok(NewCampaign {
            name,
            status: self.status.unwrap_or(CampaignStatus::Draft),
            message_template: self.message_template,
            daily_limit: self.daily_limit,
            filters: self.filters.validated().map_err(AppError::Validation)?,
        })
    }
}

impl UpdateCampaignRequest {
    fn validated(self) -> Result<CampaignUpdate, AppError> {
        if let Some(limit) = self.daily_limit {
            validate_daily_limit(limit)?;
        }
        let name = match self.name {
            Some(name) if name.trim().is_empty() => {
                return Err(AppError::Validation("name cannot be empty".to_string()))
            }
            other => other.map(|n| n.trim().to_string()),
        };
        let filters = self
            .filters
            .map(CampaignFilters::validated)
            .transpose()
            .map_err(AppError::Validation)?;
        Ok(CampaignUpdate {
            name,
            status: self.status,
            message_template: self.message_template,
            daily_limit: self.daily_limit,
            filters,
        })
    }
}

fn validate_daily_limit(limit: i32) -> Result<(), AppError> {
    if limit <= 0 {
        return Err(AppError::Validation(format!(
            "daily_limit must be a positive integer, got {limit}"
        )));
    }
    Ok(())
}

fn lead_ids(payload: Result<Json<LeadIdsRequest>, JsonRejection>) -> Result<Vec<Uuid>, AppError> {
    let Json(req) = payload?;
    req.lead_ids
        .ok_or_else(|| AppError::Validation("leadIds must be an array of lead ids".to_string()))
}

async fn require_campaign(state: &AppState, id: Uuid) -> Result<CampaignRow, AppError> {
    get_campaign(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Campaign {id} not found")))
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/campaigns/active-tasks
///
/// Polled by the sending worker. Read-only: nothing is written until the worker
/// reports back through track-send.
pub async fn handle_active_tasks(
    State(state): State<AppState>,
) -> Result<Json<Vec<OutreachTask>>, AppError> {
    let tasks = compute_active_tasks(state.dispatch.as_ref(), Utc::now()).await?;
    Ok(Json(tasks))
}

/// POST /api/campaigns/:id/track-send
pub async fn handle_track_send(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    payload: Result<Json<TrackSendRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    let lead_id = req
        .lead_id
        .ok_or_else(|| AppError::Validation("lead_id is required".to_string()))?;
    let status = validate_send_status(req.status.unwrap_or(CampaignLeadStatus::Sent))?;
    let message = req.message.unwrap_or_default();

    track_send(
        &state.db,
        SendReport {
            campaign_id,
            lead_id,
            status,
            message: &message,
            sent_at: Utc::now(),
        },
    )
    .await?;

    Ok(Json(json!({ "success": true })))
}

/// POST /api/campaigns/:id/add-leads
pub async fn handle_add_leads(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    payload: Result<Json<LeadIdsRequest>, JsonRejection>,
) -> Result<Json<QueueResponse>, AppError> {
    let ids = lead_ids(payload)?;
    require_campaign(&state, campaign_id).await?;
    let added = enqueue_leads(&state.db, campaign_id, &ids).await?;
    Ok(Json(QueueResponse {
        success: true,
        message: format!("{added} of {} leads added to campaign", ids.len()),
    }))
}

/// DELETE /api/campaigns/:id/leads
pub async fn handle_remove_leads(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    payload: Result<Json<LeadIdsRequest>, JsonRejection>,
) -> Result<Json<QueueResponse>, AppError> {
    let ids = lead_ids(payload)?;
    let removed = dequeue_leads(&state.db, campaign_id, &ids).await?;
    Ok(Json(QueueResponse {
        success: true,
        message: format!("{removed} leads removed from campaign"),
    }))
}

/// POST /api/campaigns
pub async fn handle_create_campaign(
    State(state): State<AppState>,
    payload: Result<Json<CreateCampaignRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CampaignRow>), AppError> {
    let Json(req) = payload?;
    let campaign = create_campaign(&state.db, &req.validated()?).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /api/campaigns
pub async fn handle_list_campaigns(
    State(state): State<AppState>,
) -> Result<Json<Vec<CampaignRow>>, AppError> {
    Ok(Json(list_campaigns(&state.db).await?))
}

/// GET /api/campaigns/:id
pub async fn handle_get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignRow>, AppError> {
    Ok(Json(require_campaign(&state, id).await?))
}

/// PATCH /api/campaigns/:id
pub async fn handle_update_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateCampaignRequest>, JsonRejection>,
) -> Result<Json<CampaignRow>, AppError> {
    let Json(req) = payload?;
    let campaign = update_campaign(&state.db, id, &req.validated()?)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Campaign {id} not found")))?;
    Ok(Json(campaign))
}

/// GET /api/campaigns/:id/leads
pub async fn handle_list_enrolments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EnrolmentView>>, AppError> {
    Ok(Json(list_enrolments(&state.db, id).await?))
}
