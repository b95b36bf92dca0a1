use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::campaign::{
    CampaignFilters, CampaignLeadRow, CampaignLeadStatus, CampaignRow, CampaignStatus,
};

/// Validated input for a new campaign.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub name: String,
    pub status: CampaignStatus,
    pub message_template: String,
    pub daily_limit: i32,
    pub filters: CampaignFilters,
}

/// Partial update; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct CampaignUpdate {
    pub name: Option<String>,
    pub status: Option<CampaignStatus>,
    pub message_template: Option<String>,
    pub daily_limit: Option<i32>,
    pub filters: Option<CampaignFilters>,
}

/// An enrolment joined with the lead it points at.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EnrolmentView {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub lead_name: String,
    pub phone: Option<String>,
    pub status: CampaignLeadStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Campaigns
// ────────────────────────────────────────────────────────────────────────────

pub async fn create_campaign(
    pool: &PgPool,
    campaign: &NewCampaign,
) -> Result<CampaignRow, sqlx::Error> {
    sqlx::query_as::<_, CampaignRow>(
        r#"
        INSERT INTO campaigns (name, status, message_template, daily_limit, filters)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&campaign.name)
    .bind(campaign.status)
    .bind(&campaign.message_template)
    .bind(campaign.daily_limit)
    .bind(Json(&campaign.filters))
    .fetch_one(pool)
    .await
}

pub async fn list_campaigns(pool: &PgPool) -> Result<Vec<CampaignRow>, sqlx::Error> {
    sqlx::query_as::<_, CampaignRow>("SELECT * FROM campaigns ORDER BY created_at DESC")
        .fetch_all(pool)
        .await
}

pub async fn get_campaign<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<CampaignRow>, sqlx::Error> {
    sqlx::query_as::<_, CampaignRow>("SELECT * FROM campaigns WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn update_campaign(
    pool: &PgPool,
    id: Uuid,
    update: &CampaignUpdate,
) -> Result<Option<CampaignRow>, sqlx::Error> {
    sqlx::query_as::<_, CampaignRow>(
        r#"
        UPDATE campaigns SET
            name = COALESCE($2, name),
            status = COALESCE($3, status),
            message_template = COALESCE($4, message_template),
            daily_limit = COALESCE($5, daily_limit),
            filters = COALESCE($6, filters),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&update.name)
    .bind(update.status)
    .bind(&update.message_template)
    .bind(update.daily_limit)
    .bind(update.filters.as_ref().map(Json))
    .fetch_optional(pool)
    .await
}

pub async fn list_active_campaigns(pool: &PgPool) -> Result<Vec<CampaignRow>, sqlx::Error> {
    sqlx::query_as::<_, CampaignRow>(
        "SELECT * FROM campaigns WHERE status = $1 ORDER BY created_at ASC",
    )
    .bind(CampaignStatus::Active)
    .fetch_all(pool)
    .await
}

/// Single-statement increment; concurrent senders never lose an update.
pub async fn increment_sent_count<'e, E: PgExecutor<'e>>(
    executor: E,
    campaign_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE campaigns SET sent_count = sent_count + 1, updated_at = now() WHERE id = $1",
    )
    .bind(campaign_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn increment_replies_count<'e, E: PgExecutor<'e>>(
    executor: E,
    campaign_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE campaigns SET replies_count = replies_count + 1, updated_at = now() WHERE id = $1",
    )
    .bind(campaign_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ────────────────────────────────────────────────────────────────────────────
// Enrolments (campaign_leads)
// ────────────────────────────────────────────────────────────────────────────

/// Adds leads to a campaign's manual queue as `pending`. Pairs already enrolled
/// are left untouched and unknown lead ids are skipped. Returns rows inserted.
pub async fn enqueue_leads(
    pool: &PgPool,
    campaign_id: Uuid,
    lead_ids: &[Uuid],
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO campaign_leads (campaign_id, lead_id, status)
        SELECT $1, l.id, $3
        FROM leads l
        WHERE l.id = ANY($2)
        ON CONFLICT (campaign_id, lead_id) DO NOTHING
        "#,
    )
    .bind(campaign_id)
    .bind(lead_ids)
    .bind(CampaignLeadStatus::Pending)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Removes enrolments regardless of status. Returns rows deleted.
pub async fn dequeue_leads(
    pool: &PgPool,
    campaign_id: Uuid,
    lead_ids: &[Uuid],
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM campaign_leads WHERE campaign_id = $1 AND lead_id = ANY($2)")
            .bind(campaign_id)
            .bind(lead_ids)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

/// Insert-or-update keyed on (campaign_id, lead_id).
pub async fn upsert_enrolment<'e, E: PgExecutor<'e>>(
    executor: E,
    campaign_id: Uuid,
    lead_id: Uuid,
    status: CampaignLeadStatus,
    sent_at: DateTime<Utc>,
) -> Result<CampaignLeadRow, sqlx::Error> {
    sqlx::query_as::<_, CampaignLeadRow>(
        r#"
        INSERT INTO campaign_leads (campaign_id, lead_id, status, sent_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (campaign_id, lead_id) DO UPDATE SET
            status = EXCLUDED.status,
            sent_at = EXCLUDED.sent_at
        RETURNING *
        "#,
    )
    .bind(campaign_id)
    .bind(lead_id)
    .bind(status)
    .bind(sent_at)
    .fetch_one(executor)
    .await
}

/// The lead's most recently created enrolment across all campaigns.
pub async fn latest_enrolment_for_lead<'e, E: PgExecutor<'e>>(
    executor: E,
    lead_id: Uuid,
) -> Result<Option<CampaignLeadRow>, sqlx::Error> {
    sqlx::query_as::<_, CampaignLeadRow>(
        "SELECT * FROM campaign_leads WHERE lead_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(lead_id)
    .fetch_optional(executor)
    .await
}

pub async fn set_enrolment_status<'e, E: PgExecutor<'e>>(
    executor: E,
    enrolment_id: Uuid,
    status: CampaignLeadStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE campaign_leads SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(enrolment_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn list_enrolments(
    pool: &PgPool,
    campaign_id: Uuid,
) -> Result<Vec<EnrolmentView>, sqlx::Error> {
    sqlx::query_as::<_, EnrolmentView>(
        r#"
        SELECT cl.id, cl.lead_id, l.name AS lead_name, l.phone,
               cl.status, cl.sent_at, cl.created_at
        FROM campaign_leads cl
        JOIN leads l ON l.id = cl.lead_id
        WHERE cl.campaign_id = $1
        ORDER BY cl.created_at ASC
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await
}
