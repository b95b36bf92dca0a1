//! Fixtures for tests that run against a migrated Postgres database.
//!
//! Those tests are `#[ignore]`d by default; run them with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use sqlx::PgPool;

use crate::campaigns::store::{create_campaign, NewCampaign};
use crate::leads::store::insert_lead;
use crate::models::campaign::{CampaignFilters, CampaignRow, CampaignStatus};
use crate::models::lead::{LeadOrigin, LeadRow, NewLead};

pub fn new_lead(name: &str, phone: Option<&str>) -> NewLead {
    NewLead {
        name: name.to_string(),
        address: None,
        city: "Campinas".to_string(),
        state: "SP".to_string(),
        phone: phone.map(str::to_string),
        email: None,
        website: None,
        rating: None,
        review_count: None,
        segment: "padaria".to_string(),
        score: 50,
        has_own_website: false,
        origin: LeadOrigin::Manual,
        google_place_id: None,
        latitude: None,
        longitude: None,
    }
}

pub async fn seed_lead(pool: &PgPool, name: &str, phone: Option<&str>) -> LeadRow {
    insert_lead(pool, &new_lead(name, phone)).await.unwrap()
}

pub async fn seed_campaign(pool: &PgPool) -> CampaignRow {
    create_campaign(
        pool,
        &NewCampaign {
            name: "Padarias Campinas".to_string(),
            status: CampaignStatus::Active,
            message_template: "Olá {nome}".to_string(),
            daily_limit: 10,
            filters: CampaignFilters::default(),
        },
    )
    .await
    .unwrap()
}
