use anyhow::Result;
use serde::Deserialize;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::lead::{LeadRow, LeadStatus, NewLead};

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

const UPSERT_LEAD_SQL: &str = r#"
    INSERT INTO leads
        (name, address, city, state, phone, email, website, rating, review_count,
         segment, score, has_own_website, origin, google_place_id, latitude, longitude)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
    ON CONFLICT (name, city) DO UPDATE SET
        address = EXCLUDED.address,
        state = EXCLUDED.state,
        phone = COALESCE(EXCLUDED.phone, leads.phone),
        website = EXCLUDED.website,
        rating = EXCLUDED.rating,
        review_count = EXCLUDED.review_count,
        score = EXCLUDED.score,
        has_own_website = EXCLUDED.has_own_website,
        google_place_id = COALESCE(EXCLUDED.google_place_id, leads.google_place_id),
        latitude = EXCLUDED.latitude,
        longitude = EXCLUDED.longitude,
        updated_at = now()
    RETURNING *
"#;

const INSERT_LEAD_SQL: &str = r#"
    INSERT INTO leads
        (name, address, city, state, phone, email, website, rating, review_count,
         segment, score, has_own_website, origin, google_place_id, latitude, longitude)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
    RETURNING *
"#;

/// Query-string filters for listing leads.
#[derive(Debug, Default, Deserialize)]
pub struct LeadQuery {
    pub status: Option<LeadStatus>,
    pub segment: Option<String>,
    pub city: Option<String>,
    pub min_score: Option<i32>,
    pub limit: Option<i64>,
}

async fn write_lead<'e, E: PgExecutor<'e>>(
    executor: E,
    sql: &str,
    lead: &NewLead,
) -> Result<LeadRow, sqlx::Error> {
    sqlx::query_as::<_, LeadRow>(sql)
        .bind(&lead.name)
        .bind(&lead.address)
        .bind(&lead.city)
        .bind(&lead.state)
        .bind(&lead.phone)
        .bind(&lead.email)
        .bind(&lead.website)
        .bind(lead.rating)
        .bind(lead.review_count)
        .bind(&lead.segment)
        .bind(lead.score)
        .bind(lead.has_own_website)
        .bind(lead.origin)
        .bind(&lead.google_place_id)
        .bind(lead.latitude)
        .bind(lead.longitude)
        .fetch_one(executor)
        .await
}

/// Upserts a lead keyed on (name, city). Falls back to a plain INSERT when the
/// conflict clause itself cannot be resolved.
pub async fn upsert_lead(pool: &PgPool, lead: &NewLead) -> Result<LeadRow> {
    match write_lead(pool, UPSERT_LEAD_SQL, lead).await {
        Ok(row) => Ok(row),
        Err(e) => {
            warn!(
                "Upsert for lead '{}' ({}) failed, retrying as insert: {e}",
                lead.name, lead.city
            );
            Ok(write_lead(pool, INSERT_LEAD_SQL, lead).await?)
        }
    }
}

/// Persists a batch of discovered leads, returning the stored rows in input order.
pub async fn save_leads(pool: &PgPool, leads: &[NewLead]) -> Result<Vec<LeadRow>> {
    let mut saved = Vec::with_capacity(leads.len());
    for lead in leads {
        saved.push(upsert_lead(pool, lead).await?);
    }
    info!("Persisted {} leads", saved.len());
    Ok(saved)
}

/// Inserts a manually entered lead. Duplicate (name, city) pairs are rejected by the schema.
pub async fn insert_lead(pool: &PgPool, lead: &NewLead) -> Result<LeadRow, sqlx::Error> {
    write_lead(pool, INSERT_LEAD_SQL, lead).await
}

pub async fn get_lead(pool: &PgPool, id: Uuid) -> Result<Option<LeadRow>, sqlx::Error> {
    sqlx::query_as::<_, LeadRow>("SELECT * FROM leads WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_leads(pool: &PgPool, query: &LeadQuery) -> Result<Vec<LeadRow>, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM leads WHERE TRUE");
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
    if let Some(segment) = &query.segment {
        builder.push(" AND segment = ").push_bind(segment.clone());
    }
    if let Some(city) = &query.city {
        builder.push(" AND city ILIKE ").push_bind(city.clone());
    }
    if let Some(min_score) = query.min_score {
        builder.push(" AND score >= ").push_bind(min_score);
    }
    builder
        .push(" ORDER BY score DESC, created_at DESC LIMIT ")
        .push_bind(clamp_limit(query.limit));

    builder.build_query_as::<LeadRow>().fetch_all(pool).await
}

/// Sets a lead's status. Returns false when the lead does not exist.
pub async fn set_lead_status<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    status: LeadStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE leads SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Finds the lead whose digit-only phone contains `suffix`.
/// When several leads share the suffix, the most recently updated one wins.
pub async fn find_lead_by_phone_suffix<'e, E: PgExecutor<'e>>(
    executor: E,
    suffix: &str,
) -> Result<Option<LeadRow>, sqlx::Error> {
    sqlx::query_as::<_, LeadRow>(
        r#"
        SELECT * FROM leads
        WHERE phone IS NOT NULL
          AND regexp_replace(phone, '\D', '', 'g') LIKE '%' || $1 || '%'
        ORDER BY updated_at DESC
        LIMIT 1
        "#,
    )
    .bind(suffix)
    .fetch_optional(executor)
    .await
}

/// True when `e` is a unique-constraint violation, e.g. a duplicate `(name, city)`.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIST_LIMIT);
        assert_eq!(clamp_limit(Some(25)), 25);
    }

    #[test]
    fn test_lead_query_parses_status() {
        let q: LeadQuery = serde_json::from_str(r#"{"status":"contacted","min_score":40}"#).unwrap();
        assert_eq!(q.status, Some(LeadStatus::Contacted));
        assert_eq!(q.min_score, Some(40));
    }

    #[test]
    fn test_non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::PoolTimedOut));
    }

    mod db {
        use super::super::*;
        use crate::leads::phone::match_suffix;
        use crate::test_support::{new_lead, seed_lead};

        #[sqlx::test]
        #[ignore = "needs a Postgres DATABASE_URL"]
        async fn test_formatted_phone_matches_sender_suffix(pool: PgPool) {
            let lead = seed_lead(&pool, "Padaria Central", Some("+55 11 98888-7777")).await;
            seed_lead(&pool, "Oficina", Some("(11) 3333-4444")).await;

            let found = find_lead_by_phone_suffix(&pool, &match_suffix("5511988887777"))
                .await
                .unwrap()
                .map(|l| l.id);
            assert_eq!(found, Some(lead.id));

            let missing = find_lead_by_phone_suffix(&pool, &match_suffix("5511977776666"))
                .await
                .unwrap();
            assert!(missing.is_none());
        }

        #[sqlx::test]
        #[ignore = "needs a Postgres DATABASE_URL"]
        async fn test_duplicate_name_and_city_is_unique_violation(pool: PgPool) {
            seed_lead(&pool, "Padaria Central", None).await;
            let err = insert_lead(&pool, &new_lead("Padaria Central", None))
                .await
                .unwrap_err();
            assert!(is_unique_violation(&err));
        }

        #[sqlx::test]
        #[ignore = "needs a Postgres DATABASE_URL"]
        async fn test_upsert_refreshes_existing_lead(pool: PgPool) {
            let first = upsert_lead(&pool, &new_lead("Padaria Central", Some("11 3333-4444")))
                .await
                .unwrap();
            let mut again = new_lead("Padaria Central", None);
            again.score = 90;
            let second = upsert_lead(&pool, &again).await.unwrap();

            assert_eq!(second.id, first.id);
            assert_eq!(second.score, 90);
            assert_eq!(second.phone.as_deref(), Some("11 3333-4444"));
        }
    }
}
