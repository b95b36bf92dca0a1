//! Inbound Message Router: matches webhook deliveries to leads and records replies.
//!
//! Matching compares the last `MATCH_SUFFIX_LEN` digits of the sender against the
//! digit-only form of stored lead phones, so formatting differences and a missing
//! country code on either side do not matter.

use serde::Deserialize;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::campaigns::store::{
    increment_replies_count, latest_enrolment_for_lead, set_enrolment_status,
};
use crate::leads::phone::match_suffix;
use crate::leads::store::{find_lead_by_phone_suffix, set_lead_status};
use crate::messaging::history::{append_entry, NewContactEntry};
use crate::models::campaign::{CampaignLeadRow, CampaignLeadStatus};
use crate::models::contact::{MessageDirection, MessageStatus, CHANNEL_WHATSAPP};
use crate::models::lead::LeadStatus;

/// Event name the gateway uses for a received message.
const MESSAGE_RECEIVED_EVENT: &str = "messages.upsert";

/// Stored when a message carries none of the recognised text fields.
pub const NO_TEXT_PLACEHOLDER: &str = "[mensagem sem texto]";

// ────────────────────────────────────────────────────────────────────────────
// Webhook envelope
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEvent {
    pub event: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookData {
    pub key: Option<MessageKey>,
    pub message: Option<MessageContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: Option<String>,
    #[serde(default)]
    pub from_me: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    pub conversation: Option<String>,
    pub extended_text_message: Option<TextBody>,
    pub image_message: Option<CaptionBody>,
    pub video_message: Option<CaptionBody>,
    pub buttons_response_message: Option<ButtonReply>,
    pub list_response_message: Option<ListReply>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextBody {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CaptionBody {
    pub caption: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonReply {
    pub selected_button_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListReply {
    pub title: Option<String>,
}

impl MessageContent {
    /// First non-empty text variant, in priority order.
    pub fn text(&self) -> Option<&str> {
        [
            self.conversation.as_deref(),
            self.extended_text_message.as_ref().and_then(|m| m.text.as_deref()),
            self.image_message.as_ref().and_then(|m| m.caption.as_deref()),
            self.video_message.as_ref().and_then(|m| m.caption.as_deref()),
            self.buttons_response_message
                .as_ref()
                .and_then(|m| m.selected_button_id.as_deref()),
            self.list_response_message.as_ref().and_then(|m| m.title.as_deref()),
        ]
        .into_iter()
        .flatten()
        .find(|t| !t.trim().is_empty())
    }
}

/// A received message reduced to what routing needs.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub phone: String,
    pub text: String,
}

/// Extracts the sender and text from a "message received" event.
/// Returns `None` for other events, self-sent echoes and events without a sender.
pub fn parse_inbound(event: &WebhookEvent) -> Option<InboundMessage> {
    let name = event.event.as_deref()?;
    if name.to_ascii_lowercase().replace('_', ".") != MESSAGE_RECEIVED_EVENT {
        return None;
    }
    let data = event.data.as_ref()?;
    let key = data.key.as_ref()?;
    if key.from_me {
        return None;
    }
    let jid = key.remote_jid.as_deref()?;
    let phone = jid.split('@').next().unwrap_or_default().trim();
    if phone.is_empty() {
        return None;
    }
    let text = data
        .message
        .as_ref()
        .and_then(MessageContent::text)
        .unwrap_or(NO_TEXT_PLACEHOLDER);

    Some(InboundMessage {
        phone: phone.to_string(),
        text: text.to_string(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Routing
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// No lead's phone ends with the sender's suffix.
    Unmatched,
    Recorded {
        lead_id: Uuid,
        /// Campaign whose reply counter was incremented, if any.
        counted_for_campaign: Option<Uuid>,
    },
}

/// The enrolment a reply should flip to `replied`, if any. An enrolment that
/// already replied is left alone so its campaign's reply counter is not bumped twice.
pub fn enrolment_to_mark_replied(latest: Option<CampaignLeadRow>) -> Option<CampaignLeadRow> {
    latest.filter(|e| e.status != CampaignLeadStatus::Replied)
}

/// Records an inbound reply against the matching lead in one transaction:
/// history entry, lead status, and the lead's latest campaign enrolment.
pub async fn route_inbound(
    pool: &PgPool,
    message: &InboundMessage,
) -> Result<InboundOutcome, sqlx::Error> {
    let suffix = match_suffix(&message.phone);
    if suffix.is_empty() {
        return Ok(InboundOutcome::Unmatched);
    }

    let mut tx = pool.begin().await?;

    let Some(lead) = find_lead_by_phone_suffix(&mut *tx, &suffix).await? else {
        debug!("No lead matches sender suffix {suffix}");
        return Ok(InboundOutcome::Unmatched);
    };

    append_entry(
        &mut *tx,
        NewContactEntry {
            lead_id: lead.id,
            channel: CHANNEL_WHATSAPP,
            message: &message.text,
            status: MessageStatus::Received,
            direction: MessageDirection::Inbound,
        },
    )
    .await?;

    set_lead_status(&mut *tx, lead.id, LeadStatus::Replied).await?;

    let latest = latest_enrolment_for_lead(&mut *tx, lead.id).await?;
    let counted_for_campaign = match enrolment_to_mark_replied(latest) {
        Some(enrolment) => {
            set_enrolment_status(&mut *tx, enrolment.id, CampaignLeadStatus::Replied).await?;
            increment_replies_count(&mut *tx, enrolment.campaign_id).await?;
            Some(enrolment.campaign_id)
        }
        None => None,
    };

    tx.commit().await?;

    info!("Recorded reply from lead {} ({})", lead.id, lead.name);
    Ok(InboundOutcome::Recorded {
        lead_id: lead.id,
        counted_for_campaign,
    })
}
