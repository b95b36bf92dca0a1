//! Send Tracker: records the outcome of a dispatched send.
//!
//! All four writes (counter, lead status, enrolment, history) share one
//! transaction: either every effect lands or none does.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::campaigns::store::{increment_sent_count, upsert_enrolment};
use crate::errors::AppError;
use crate::leads::store::set_lead_status;
use crate::messaging::history::{append_entry, NewContactEntry};
use crate::models::campaign::{CampaignLeadRow, CampaignLeadStatus};
use crate::models::contact::{MessageDirection, MessageStatus, CHANNEL_WHATSAPP};
use crate::models::lead::LeadStatus;

/// What the sending worker reports back.
#[derive(Debug, Clone)]
pub struct SendReport<'a> {
    pub campaign_id: Uuid,
    pub lead_id: Uuid,
    pub status: CampaignLeadStatus,
    pub message: &'a str,
    pub sent_at: DateTime<Utc>,
}

/// Rejects statuses a send cannot produce.
pub fn validate_send_status(status: CampaignLeadStatus) -> Result<CampaignLeadStatus, AppError> {
    match status {
        CampaignLeadStatus::Pending => Err(AppError::Validation(
            "status must be one of sent, failed or replied".to_string(),
        )),
        other => Ok(other),
    }
}

/// Records a send: bumps the campaign's sent counter, marks the lead contacted,
/// upserts the enrolment with `sent_at` and appends an outbound history entry.
pub async fn track_send(
    pool: &PgPool,
    report: SendReport<'_>,
) -> Result<CampaignLeadRow, AppError> {
    let mut tx = pool.begin().await?;

    if !increment_sent_count(&mut *tx, report.campaign_id).await? {
        return Err(AppError::NotFound(format!(
            "Campaign {} not found",
            report.campaign_id
        )));
    }

    if !set_lead_status(&mut *tx, report.lead_id, LeadStatus::Contacted).await? {
        return Err(AppError::NotFound(format!("Lead {} not found", report.lead_id)));
    }

    let enrolment = upsert_enrolment(
        &mut *tx,
        report.campaign_id,
        report.lead_id,
        report.status,
        report.sent_at,
    )
    .await?;

    append_entry(
        &mut *tx,
        NewContactEntry {
            lead_id: report.lead_id,
            channel: CHANNEL_WHATSAPP,
            message: report.message,
            status: MessageStatus::Sent,
            direction: MessageDirection::Outbound,
        },
    )
    .await?;

    tx.commit().await?;

    info!(
        "Tracked send for lead {} in campaign {} ({:?})",
        report.lead_id, report.campaign_id, report.status
    );
    Ok(enrolment)
}
