use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "campaign_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "campaign_lead_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignLeadStatus {
    Pending,
    Sent,
    Replied,
    Failed,
}

/// Targeting filters for auto-matched leads. Absent fields do not narrow the match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_min: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<String>>,
}

impl CampaignFilters {
    /// Validates and normalises the filters. An empty segment list means "any segment".
    pub fn validated(self) -> Result<Self, String> {
        if let Some(min) = self.score_min {
            if !(0..=100).contains(&min) {
                return Err(format!("filters.score_min must be between 0 and 100, got {min}"));
            }
        }
        let segments = match self.segments {
            Some(segments) => {
                if segments.iter().any(|s| s.trim().is_empty()) {
                    return Err("filters.segments cannot contain blank values".to_string());
                }
                let trimmed: Vec<String> = segments.iter().map(|s| s.trim().to_string()).collect();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            None => None,
        };
        Ok(Self {
            score_min: self.score_min,
            segments,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CampaignRow {
    pub id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    pub message_template: String,
    pub daily_limit: i32,
    pub sent_count: i32,
    pub replies_count: i32,
    pub meetings_count: i32,
    pub filters: Json<CampaignFilters>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CampaignLeadRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub lead_id: Uuid,
    pub status: CampaignLeadStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_reject_out_of_range_score() {
        let filters = CampaignFilters {
            score_min: Some(101),
            segments: None,
        };
        assert!(filters.validated().is_err());
    }

    #[test]
    fn test_empty_segments_mean_no_filter() {
        let filters = CampaignFilters {
            score_min: Some(50),
            segments: Some(vec![]),
        }
        .validated()
        .unwrap();
        assert_eq!(filters.segments, None);
        assert_eq!(filters.score_min, Some(50));
    }

    #[test]
    fn test_blank_segment_rejected() {
        let filters = CampaignFilters {
            score_min: None,
            segments: Some(vec!["dentista".into(), "  ".into()]),
        };
        assert!(filters.validated().is_err());
    }

    #[test]
    fn test_filters_deserialize_from_sparse_json() {
        let filters: CampaignFilters = serde_json::from_str(r#"{"score_min": 40}"#).unwrap();
        assert_eq!(filters.score_min, Some(40));
        assert_eq!(filters.segments, None);
    }
}
