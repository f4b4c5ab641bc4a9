use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::modules::bus::subject;
use crate::modules::message::model::Author;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<Uuid>,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
}

/// Payload of `comment.created.<post>`. The hub forwards only `comment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentCreated {
    pub comment: Comment,
    pub post_author_id: Uuid,
    pub comment_author_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostCreated {
    pub post_id: Uuid,
    pub community_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub community_name: String,
    pub post_content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionTarget {
    Post,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionCreated {
    pub reaction_id: Uuid,
    pub target_type: ReactionTarget,
    pub target_id: Uuid,
    pub reactor_id: Uuid,
    pub reactor_name: String,
    pub reaction_type: String,
    pub target_author_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Payload of `checkin.updates.<session>`, shown live on dashboards. The
/// attendee fields are empty when a scan could not be matched to anyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinUpdate {
    pub session_id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_name: String,
    pub profile_url: String,
    pub success: bool,
    pub message: String,
    pub checkin_time: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTopic {
    Created,
    Registered,
    Cancelled,
    SessionCancelled,
    Deleted,
}

impl EventTopic {
    pub fn subject(self) -> &'static str {
        match self {
            EventTopic::Created => subject::EVENTS_CREATED,
            EventTopic::Registered => subject::EVENTS_REGISTERED,
            EventTopic::Cancelled => subject::EVENTS_CANCELLED,
            EventTopic::SessionCancelled => subject::EVENTS_SESSION_CANCELLED,
            EventTopic::Deleted => subject::EVENTS_DELETED,
        }
    }
}

/// Lifecycle notice for an event; fields not relevant to a topic are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLifecycle {
    pub event_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}
