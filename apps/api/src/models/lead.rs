use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Replied,
    Responded,
    Negotiating,
    Won,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "lead_origin", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadOrigin {
    GooglePlaces,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeadRow {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub segment: String,
    pub score: i32,
    pub status: LeadStatus,
    pub has_own_website: bool,
    pub origin: LeadOrigin,
    pub google_place_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A lead that has not been persisted yet: the output of discovery or manual entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLead {
    pub name: String,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub segment: String,
    pub score: i32,
    pub has_own_website: bool,
    pub origin: LeadOrigin,
    pub google_place_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}
