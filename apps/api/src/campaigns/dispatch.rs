//! Campaign Dispatch: computes the outreach tasks each active campaign may send now.
//!
//! Per campaign, evaluated independently:
//! 1. `remaining = daily_limit - sent_today` (UTC calendar day); nothing when ≤ 0
//! 2. manual phase: up to `remaining` pending enrolments, oldest first
//! 3. auto phase: fill what is left with `new` leads matching the campaign filters
//!    that are not enrolled in this campaign under any status
//!
//! Dispatch is a read-only projection. Enrolments for auto-matched leads only
//! appear once the send is tracked, so two concurrent polls can propose the same
//! lead; the (campaign_id, lead_id) key keeps that to a single row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::campaigns::store::list_active_campaigns;
use crate::leads::phone::{digits_only, normalize_phone, MIN_DIALABLE_DIGITS};
use crate::models::campaign::{CampaignFilters, CampaignLeadStatus, CampaignRow};
use crate::models::contact::CHANNEL_WHATSAPP;
use crate::models::lead::LeadStatus;

/// Auto-match candidates fetched per slot, to absorb leads dropped for bad phones.
pub const AUTO_MATCH_OVERFETCH: i64 = 2;

/// Sequence step of every task dispatch emits. Follow-up steps are not scheduled here.
pub const FIRST_STEP: u32 = 1;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// One message to send to one lead for one campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachTask {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub lead_id: Uuid,
    pub lead_name: String,
    /// Digits only, country-code prefixed.
    pub phone: String,
    pub email: Option<String>,
    pub city: String,
    pub segment: String,
    /// Sent verbatim; placeholder substitution happens in the sending worker.
    pub message_template: String,
    pub channel: String,
    pub step: u32,
}

/// The lead fields dispatch reads.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DispatchLead {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub city: String,
    pub segment: String,
}

/// A pending enrolment. `lead` is `None` when the row points at a missing lead.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEnrolment {
    pub enrolment_id: Uuid,
    pub lead: Option<DispatchLead>,
}

// ────────────────────────────────────────────────────────────────────────────
// Storage seam
// ────────────────────────────────────────────────────────────────────────────

/// Reads dispatch needs from the lead store.
///
/// Carried in `AppState` as `Arc<dyn DispatchStore>`.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    async fn active_campaigns(&self) -> Result<Vec<CampaignRow>, sqlx::Error>;

    /// Enrolments of the campaign whose `sent_at` falls in `[start, end)`.
    async fn count_sent_between(
        &self,
        campaign_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error>;

    /// Up to `limit` pending enrolments, oldest first.
    async fn pending_enrolments(
        &self,
        campaign_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PendingEnrolment>, sqlx::Error>;

    /// Every lead enrolled in the campaign, whatever the enrolment status.
    async fn enrolled_lead_ids(&self, campaign_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error>;

    /// `new` leads with a phone that match `filters` and are not in `exclude`,
    /// best score first, at most `limit`.
    async fn auto_match_candidates(
        &self,
        filters: &CampaignFilters,
        exclude: &[Uuid],
        limit: i64,
    ) -> Result<Vec<DispatchLead>, sqlx::Error>;
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

/// Start and end of the UTC calendar day containing `now`.
pub fn utc_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now);
    (start, start + Duration::days(1))
}

/// Computes the task list across all active campaigns. Any read failure aborts
/// the whole poll; no partial list is returned.
pub async fn compute_active_tasks(
    store: &dyn DispatchStore,
    now: DateTime<Utc>,
) -> Result<Vec<OutreachTask>, sqlx::Error> {
    let campaigns = store.active_campaigns().await?;
    let mut tasks = Vec::new();
    for campaign in &campaigns {
        tasks.extend(campaign_tasks(store, campaign, now).await?);
    }
    info!(
        "Dispatch poll: {} tasks across {} active campaigns",
        tasks.len(),
        campaigns.len()
    );
    Ok(tasks)
}

/// Computes one campaign's tasks for the current poll.
pub async fn campaign_tasks(
    store: &dyn DispatchStore,
    campaign: &CampaignRow,
    now: DateTime<Utc>,
) -> Result<Vec<OutreachTask>, sqlx::Error> {
    let (day_start, day_end) = utc_day_bounds(now);
    let sent_today = store
        .count_sent_between(campaign.id, day_start, day_end)
        .await?;
    let remaining = i64::from(campaign.daily_limit) - sent_today;
    if remaining <= 0 {
        debug!("Campaign {} has no quota left today", campaign.id);
        return Ok(Vec::new());
    }

    // Manual queue first.
    let mut tasks: Vec<OutreachTask> = store
        .pending_enrolments(campaign.id, remaining)
        .await?
        .into_iter()
        .filter_map(|pending| {
            if pending.lead.is_none() {
                debug!("Skipping enrolment {} whose lead no longer exists", pending.enrolment_id);
            }
            pending.lead
        })
        .map(|lead| build_task(campaign, &lead))
        .collect();

    let quota_for_auto = remaining - tasks.len() as i64;
    if quota_for_auto <= 0 {
        return Ok(tasks);
    }

    let exclude = store.enrolled_lead_ids(campaign.id).await?;
    let candidates = store
        .auto_match_candidates(
            &campaign.filters.0,
            &exclude,
            quota_for_auto * AUTO_MATCH_OVERFETCH,
        )
        .await?;

    let auto_tasks: Vec<OutreachTask> = candidates
        .iter()
        .filter(|lead| {
            lead.phone
                .as_deref()
                .is_some_and(|p| digits_only(p).len() >= MIN_DIALABLE_DIGITS)
        })
        .take(quota_for_auto as usize)
        .map(|lead| build_task(campaign, lead))
        .collect();

    debug!(
        "Campaign {}: {} manual + {} auto tasks (remaining quota {})",
        campaign.id,
        tasks.len(),
        auto_tasks.len(),
        remaining
    );
    tasks.extend(auto_tasks);
    Ok(tasks)
}

fn build_task(campaign: &CampaignRow, lead: &DispatchLead) -> OutreachTask {
    OutreachTask {
        campaign_id: campaign.id,
        campaign_name: campaign.name.clone(),
        lead_id: lead.id,
        lead_name: lead.name.clone(),
        phone: normalize_phone(lead.phone.as_deref().unwrap_or_default()),
        email: lead.email.clone(),
        city: lead.city.clone(),
        segment: lead.segment.clone(),
        message_template: campaign.message_template.clone(),
        channel: CHANNEL_WHATSAPP.to_string(),
        step: FIRST_STEP,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Postgres store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct PendingRow {
    enrolment_id: Uuid,
    lead_id: Option<Uuid>,
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    city: Option<String>,
    segment: Option<String>,
}

impl From<PendingRow> for PendingEnrolment {
    fn from(row: PendingRow) -> Self {
        let lead = match (row.lead_id, row.name) {
            (Some(id), Some(name)) => Some(DispatchLead {
                id,
                name,
                phone: row.phone,
                email: row.email,
                city: row.city.unwrap_or_default(),
                segment: row.segment.unwrap_or_default(),
            }),
            _ => None,
        };
        PendingEnrolment {
            enrolment_id: row.enrolment_id,
            lead,
        }
    }
}

pub struct PgDispatchStore {
    pool: PgPool,
}

impl PgDispatchStore {
    pub fn new(pool: PgPool) -> Arc<dyn DispatchStore> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl DispatchStore for PgDispatchStore {
    async fn active_campaigns(&self) -> Result<Vec<CampaignRow>, sqlx::Error> {
        list_active_campaigns(&self.pool).await
    }

    async fn count_sent_between(
        &self,
        campaign_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM campaign_leads
            WHERE campaign_id = $1 AND sent_at >= $2 AND sent_at < $3
            "#,
        )
        .bind(campaign_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
    }

    async fn pending_enrolments(
        &self,
        campaign_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PendingEnrolment>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PendingRow>(
            r#"
            SELECT cl.id AS enrolment_id, l.id AS lead_id, l.name, l.phone,
                   l.email, l.city, l.segment
            FROM campaign_leads cl
            LEFT JOIN leads l ON l.id = cl.lead_id
            WHERE cl.campaign_id = $1 AND cl.status = $2
            ORDER BY cl.created_at ASC
            LIMIT $3
            "#,
        )
        .bind(campaign_id)
        .bind(CampaignLeadStatus::Pending)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PendingEnrolment::from).collect())
    }

    async fn enrolled_lead_ids(&self, campaign_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar("SELECT lead_id FROM campaign_leads WHERE campaign_id = $1")
            .bind(campaign_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn auto_match_candidates(
        &self,
        filters: &CampaignFilters,
        exclude: &[Uuid],
        limit: i64,
    ) -> Result<Vec<DispatchLead>, sqlx::Error> {
        sqlx::query_as::<_, DispatchLead>(
            r#"
            SELECT id, name, phone, email, city, segment
            FROM leads
            WHERE status = $1
              AND phone IS NOT NULL
              AND ($2::int IS NULL OR score >= $2)
              AND ($3::text[] IS NULL OR segment = ANY($3))
              AND NOT (id = ANY($4))
            ORDER BY score DESC, created_at ASC
            LIMIT $5
            "#,
        )
        .bind(LeadStatus::New)
        .bind(filters.score_min)
        .bind(filters.segments.as_deref())
        .bind(exclude)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory store (tests)
// ────────────────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use sqlx::types::Json;

    use super::memory::{MemoryDispatchStore, StoredLead};
    use super::*;
    use crate::models::campaign::{CampaignLeadRow, CampaignStatus};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 15, 30, 0).unwrap()
    }

    fn campaign(daily_limit: i32, filters: CampaignFilters) -> CampaignRow {
        CampaignRow {
            id: Uuid::new_v4(),
            name: "Padarias Campinas".into(),
            status: CampaignStatus::Active,
            message_template: "Olá {nome}, tudo bem?".into(),
            daily_limit,
            sent_count: 0,
            replies_count: 0,
            meetings_count: 0,
            filters: Json(filters),
            created_at: now(),
            updated_at: now(),
        }
    }

    fn stored(name: &str, phone: Option<&str>, score: i32, segment: &str) -> StoredLead {
        StoredLead {
            lead: DispatchLead {
                id: Uuid::new_v4(),
                name: name.into(),
                phone: phone.map(String::from),
                email: None,
                city: "Campinas".into(),
                segment: segment.into(),
            },
            status: LeadStatus::New,
            score,
        }
    }

    fn enrolment(
        campaign_id: Uuid,
        lead_id: Uuid,
        status: CampaignLeadStatus,
        sent_at: Option<DateTime<Utc>>,
        minutes_ago: i64,
    ) -> CampaignLeadRow {
        CampaignLeadRow {
            id: Uuid::new_v4(),
            campaign_id,
            lead_id,
            status,
            sent_at,
            created_at: now() - Duration::minutes(minutes_ago),
        }
    }

    /// Adds `n` enrolments sent earlier today for leads not otherwise in the store.
    fn sent_today(store: &mut MemoryDispatchStore, campaign_id: Uuid, n: usize) {
        for i in 0..n {
            let lead = stored(&format!("Sent {i}"), Some("11999990000"), 50, "padaria");
            store.enrolments.push(enrolment(
                campaign_id,
                lead.lead.id,
                CampaignLeadStatus::Sent,
                Some(now() - Duration::hours(1)),
                120,
            ));
            store.leads.push(StoredLead {
                status: LeadStatus::Contacted,
                ..lead
            });
        }
    }

    #[test]
    fn test_utc_day_bounds() {
        let (start, end) = utc_day_bounds(now());
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_manual_leads_take_priority_over_auto() {
        let c = campaign(10, CampaignFilters::default());
        let mut store = MemoryDispatchStore::default();
        sent_today(&mut store, c.id, 7);

        let manual_a = stored("Manual A", Some("(19) 99999-0001"), 10, "padaria");
        let manual_b = stored("Manual B", Some("(19) 99999-0002"), 10, "padaria");
        store.enrolments.push(enrolment(c.id, manual_a.lead.id, CampaignLeadStatus::Pending, None, 30));
        store.enrolments.push(enrolment(c.id, manual_b.lead.id, CampaignLeadStatus::Pending, None, 20));
        store.leads.push(manual_a.clone());
        store.leads.push(manual_b.clone());
        for i in 0..5 {
            let phone = format!("(19) 98888-000{i}");
            store.leads.push(stored(&format!("Auto {i}"), Some(&phone), 60 + i, "padaria"));
        }
        store.campaigns.push(c);

        let tasks = compute_active_tasks(&store, now()).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].lead_name, "Manual A");
        assert_eq!(tasks[1].lead_name, "Manual B");
        assert_eq!(tasks[2].lead_name, "Auto 4");
        assert_eq!(tasks[0].phone, "5519999990001");
        assert!(tasks.iter().all(|t| t.channel == "whatsapp" && t.step == 1));
        assert!(tasks.iter().all(|t| t.message_template == "Olá {nome}, tudo bem?"));
    }

    #[tokio::test]
    async fn test_exhausted_quota_emits_nothing() {
        let c = campaign(3, CampaignFilters::default());
        let mut store = MemoryDispatchStore::default();
        sent_today(&mut store, c.id, 3);
        let manual = stored("Manual", Some("11999990001"), 10, "padaria");
        store.enrolments.push(enrolment(c.id, manual.lead.id, CampaignLeadStatus::Pending, None, 5));
        store.leads.push(manual);
        store.leads.push(stored("Auto", Some("11999990002"), 90, "padaria"));
        store.campaigns.push(c);

        assert!(compute_active_tasks(&store, now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sends_from_yesterday_do_not_count() {
        let c = campaign(1, CampaignFilters::default());
        let mut store = MemoryDispatchStore::default();
        let old = stored("Old", Some("11999990009"), 10, "padaria");
        store.enrolments.push(enrolment(
            c.id,
            old.lead.id,
            CampaignLeadStatus::Sent,
            Some(now() - Duration::days(1)),
            2000,
        ));
        store.leads.push(StoredLead {
            status: LeadStatus::Contacted,
            ..old
        });
        store.leads.push(stored("Fresh", Some("11999990001"), 80, "padaria"));
        store.campaigns.push(c);

        let tasks = compute_active_tasks(&store, now()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].lead_name, "Fresh");
    }

    #[tokio::test]
    async fn test_manual_fills_quota_skips_auto_phase() {
        let c = campaign(2, CampaignFilters::default());
        let mut store = MemoryDispatchStore::default();
        for i in 0..3 {
            let m = stored(&format!("Manual {i}"), Some("11999990001"), 10, "padaria");
            store.enrolments.push(enrolment(c.id, m.lead.id, CampaignLeadStatus::Pending, None, 10 - i));
            store.leads.push(m);
        }
        store.leads.push(stored("Auto", Some("11999990002"), 90, "padaria"));
        store.campaigns.push(c);

        let tasks = compute_active_tasks(&store, now()).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.lead_name.starts_with("Manual")));
    }

    #[tokio::test]
    async fn test_enrolled_leads_excluded_whatever_their_status() {
        let c = campaign(10, CampaignFilters::default());
        let mut store = MemoryDispatchStore::default();
        for status in [CampaignLeadStatus::Sent, CampaignLeadStatus::Replied, CampaignLeadStatus::Failed] {
            let l = stored("Enrolled", Some("11999990001"), 90, "padaria");
            store.enrolments.push(enrolment(
                c.id,
                l.lead.id,
                status,
                Some(now() - Duration::days(3)),
                5000,
            ));
            store.leads.push(l);
        }
        store.leads.push(stored("Eligible", Some("11999990002"), 20, "padaria"));
        store.campaigns.push(c);

        let tasks = compute_active_tasks(&store, now()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].lead_name, "Eligible");
    }

    #[tokio::test]
    async fn test_short_phones_dropped_and_overfetch_limit_respected() {
        let c = campaign(2, CampaignFilters::default());
        let mut store = MemoryDispatchStore::default();
        // Best-scored candidates have undialable numbers.
        store.leads.push(stored("Short A", Some("123"), 99, "padaria"));
        store.leads.push(stored("Short B", Some("12-34"), 98, "padaria"));
        store.leads.push(stored("Good A", Some("(11) 99999-0001"), 97, "padaria"));
        store.leads.push(stored("Good B", Some("(11) 99999-0002"), 96, "padaria"));
        store.leads.push(stored("Good C", Some("(11) 99999-0003"), 95, "padaria"));
        store.campaigns.push(c);

        // quota 2 → fetch 4 candidates → 2 dialable among them.
        let tasks = compute_active_tasks(&store, now()).await.unwrap();
        let names: Vec<_> = tasks.iter().map(|t| t.lead_name.as_str()).collect();
        assert_eq!(names, vec!["Good A", "Good B"]);
    }

    #[tokio::test]
    async fn test_filters_applied_to_auto_match() {
        let filters = CampaignFilters {
            score_min: Some(50),
            segments: Some(vec!["dentista".into()]),
        };
        let c = campaign(10, filters);
        let mut store = MemoryDispatchStore::default();
        store.leads.push(stored("Low score", Some("11999990001"), 40, "dentista"));
        store.leads.push(stored("Wrong niche", Some("11999990002"), 90, "padaria"));
        store.leads.push(stored("Match", Some("11999990003"), 70, "dentista"));
        store.leads.push(StoredLead {
            status: LeadStatus::Contacted,
            ..stored("Already contacted", Some("11999990004"), 90, "dentista")
        });
        store.campaigns.push(c);

        let tasks = compute_active_tasks(&store, now()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].lead_name, "Match");
        assert_eq!(tasks[0].segment, "dentista");
    }

    #[tokio::test]
    async fn test_phoneless_manual_lead_keeps_its_queue_slot() {
        let c = campaign(2, CampaignFilters::default());
        let mut store = MemoryDispatchStore::default();
        let no_phone = stored("No phone", None, 10, "padaria");
        let dialable = stored("Good manual", Some("11999990001"), 10, "padaria");
        store.enrolments.push(enrolment(c.id, no_phone.lead.id, CampaignLeadStatus::Pending, None, 30));
        store.enrolments.push(enrolment(c.id, dialable.lead.id, CampaignLeadStatus::Pending, None, 10));
        store.leads.push(no_phone);
        store.leads.push(dialable);
        store.leads.push(stored("Auto", Some("11999990002"), 90, "padaria"));
        store.campaigns.push(c);

        let tasks = compute_active_tasks(&store, now()).await.unwrap();
        let names: Vec<_> = tasks.iter().map(|t| t.lead_name.as_str()).collect();
        assert_eq!(names, vec!["No phone", "Good manual"]);
    }

    #[tokio::test]
    async fn test_pending_rows_without_lead_are_skipped() {
        let c = campaign(5, CampaignFilters::default());
        let mut store = MemoryDispatchStore::default();
        store.enrolments.push(enrolment(c.id, Uuid::new_v4(), CampaignLeadStatus::Pending, None, 10));
        let m = stored("Manual", Some("11999990001"), 10, "padaria");
        store.enrolments.push(enrolment(c.id, m.lead.id, CampaignLeadStatus::Pending, None, 5));
        store.leads.push(m);
        store.campaigns.push(c);

        let tasks = compute_active_tasks(&store, now()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].lead_name, "Manual");
    }

    #[tokio::test]
    async fn test_inactive_campaigns_ignored_and_tasks_concatenated() {
        let a = campaign(1, CampaignFilters::default());
        let b = campaign(1, CampaignFilters::default());
        let mut paused = campaign(5, CampaignFilters::default());
        paused.status = CampaignStatus::Paused;
        let mut store = MemoryDispatchStore::default();
        store.leads.push(stored("Lead 1", Some("11999990001"), 90, "padaria"));
        store.leads.push(stored("Lead 2", Some("11999990002"), 80, "padaria"));
        store.campaigns.extend([a.clone(), b.clone(), paused]);

        let tasks = compute_active_tasks(&store, now()).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().any(|t| t.campaign_id == a.id));
        assert!(tasks.iter().any(|t| t.campaign_id == b.id));
    }

    #[tokio::test]
    async fn test_read_failure_aborts_poll() {
        let mut store = MemoryDispatchStore::default();
        store.campaigns.push(campaign(5, CampaignFilters::default()));
        store.fail = true;
        assert!(compute_active_tasks(&store, now()).await.is_err());
    }

    #[tokio::test]
    async fn test_no_active_campaigns_yields_empty_list() {
        let store = MemoryDispatchStore::default();
        let tasks = compute_active_tasks(&store, now()).await.unwrap();
        assert_eq!(serde_json::to_string(&tasks).unwrap(), "[]");
    }
}
