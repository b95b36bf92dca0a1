use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The only outreach channel wired up today.
pub const CHANNEL_WHATSAPP: &str = "whatsapp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_direction", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Append-only log record of one message event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ContactHistoryRow {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub channel: String,
    pub message: String,
    pub status: MessageStatus,
    pub direction: MessageDirection,
    pub created_at: DateTime<Utc>,
}
