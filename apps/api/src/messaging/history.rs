use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::models::contact::{ContactHistoryRow, MessageDirection, MessageStatus};

/// One message event to append to the log.
#[derive(Debug, Clone, Copy)]
pub struct NewContactEntry<'a> {
    pub lead_id: Uuid,
    pub channel: &'a str,
    pub message: &'a str,
    pub status: MessageStatus,
    pub direction: MessageDirection,
}

/// Appends an entry. The log is never updated or deleted from here.
pub async fn append_entry<'e, E: PgExecutor<'e>>(
    executor: E,
    entry: NewContactEntry<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO contact_history (lead_id, channel, message, status, direction)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(entry.lead_id)
    .bind(entry.channel)
    .bind(entry.message)
    .bind(entry.status)
    .bind(entry.direction)
    .execute(executor)
    .await?;
    Ok(())
}

/// Returns a lead's message log, oldest first.
pub async fn list_for_lead(
    pool: &PgPool,
    lead_id: Uuid,
) -> Result<Vec<ContactHistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, ContactHistoryRow>(
        "SELECT * FROM contact_history WHERE lead_id = $1 ORDER BY created_at ASC",
    )
    .bind(lead_id)
    .fetch_all(pool)
    .await
}
