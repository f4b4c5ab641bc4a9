use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::modules::conversation::schema::{ConversationType, ParticipantEntity};

/// Store input for a new conversation. `participant_ids` already includes
/// the creator and is free of duplicates.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub id: Uuid,
    pub _type: ConversationType,
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LastMessagePreview {
    pub content: String,
    pub sender_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub _type: ConversationType,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub participants: Vec<ParticipantEntity>,
    pub last_message: Option<LastMessagePreview>,
}

impl ConversationDetail {
    pub fn has_participant(&self, user_id: &Uuid) -> bool {
        self.participants.iter().any(|p| p.user_id == *user_id)
    }
}

#[derive(FromRow)]
pub struct ConversationSummaryRow {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    pub _type: ConversationType,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<chrono::DateTime<chrono::Utc>>,
    pub unread_count: i32,
}

/// One row of a user's conversation list. Direct conversations carry the
/// other participant's name and avatar.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub _type: ConversationType,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<chrono::DateTime<chrono::Utc>>,
    pub unread_count: i32,
    pub participants: Vec<ParticipantEntity>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ConversationSummary {
    pub fn from_row(row: ConversationSummaryRow, participants: Vec<ParticipantEntity>) -> Self {
        Self {
            id: row.id,
            _type: row._type,
            name: row.name,
            avatar_url: row.avatar_url,
            last_message: row.last_message,
            last_message_at: row.last_message_at,
            unread_count: row.unread_count,
            participants,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateConversationRequest {
    #[serde(rename = "type")]
    pub _type: ConversationType,
    #[validate(length(min = 1, message = "At least one participant is required"))]
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConversationListQuery {
    #[validate(range(min = 1))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypingRequest {
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}
