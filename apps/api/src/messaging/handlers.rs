//! Axum route handlers for the chat API and the gateway webhook.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::leads::store::get_lead;
use crate::messaging::history::{append_entry, list_for_lead, NewContactEntry};
use crate::messaging::inbound::{parse_inbound, route_inbound, InboundOutcome, WebhookEvent};
use crate::models::contact::{
    ContactHistoryRow, MessageDirection, MessageStatus, CHANNEL_WHATSAPP,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub lead_id: Option<Uuid>,
    pub message: Option<String>,
    pub phone: Option<String>,
}

/// POST /api/chat/send
pub async fn handle_send(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    let (Some(lead_id), Some(message), Some(phone)) = (
        req.lead_id,
        req.message.filter(|m| !m.trim().is_empty()),
        req.phone.filter(|p| !p.trim().is_empty()),
    ) else {
        return Err(AppError::Validation(
            "leadId, message and phone are required".to_string(),
        ));
    };

    if get_lead(&state.db, lead_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Lead {lead_id} not found")));
    }

    state.whatsapp.send_text(&phone, &message).await?;

    append_entry(
        &state.db,
        NewContactEntry {
            lead_id,
            channel: CHANNEL_WHATSAPP,
            message: &message,
            status: MessageStatus::Sent,
            direction: MessageDirection::Outbound,
        },
    )
    .await?;

    Ok(Json(json!({ "success": true })))
}

/// GET /api/chat/:lead_id/history
pub async fn handle_history(
    State(state): State<AppState>,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<Vec<ContactHistoryRow>>, AppError> {
    Ok(Json(list_for_lead(&state.db, lead_id).await?))
}

/// POST /api/chat/webhook
///
/// Always answers 200 so the gateway never retries a delivery. Failures are
/// logged here and nowhere else.
pub async fn handle_webhook(
    State(state): State<AppState>,
    payload: Result<Json<WebhookEvent>, JsonRejection>,
) -> Response {
    let event = match payload {
        Ok(Json(event)) => event,
        Err(rejection) => {
            warn!("Ignoring unreadable webhook payload: {}", rejection.body_text());
            return ok_response();
        }
    };

    let Some(message) = parse_inbound(&event) else {
        return ok_response();
    };

    match route_inbound(&state.db, &message).await {
        Ok(InboundOutcome::Unmatched) => {
            warn!("Inbound message from {} matched no lead", message.phone);
        }
        Ok(InboundOutcome::Recorded {
            lead_id,
            counted_for_campaign,
        }) => {
            info!("Inbound message routed to lead {lead_id} (campaign: {counted_for_campaign:?})");
        }
        Err(e) => {
            error!("Failed to record inbound message from {}: {e}", message.phone);
        }
    }

    ok_response()
}

fn ok_response() -> Response {
    (StatusCode::OK, "OK").into_response()
}
