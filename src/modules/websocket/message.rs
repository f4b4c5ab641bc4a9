/// WebSocket frame shapes
///
/// Chat message frames reuse `MessageResponse` unchanged; everything else the
/// hub writes to a socket is defined here.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::modules::message::schema::MessageType;

/// Inbound chat frame: `{conversation_id, content}` with an optional type.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatFrame {
    pub conversation_id: Uuid,
    pub content: String,
    #[serde(default, alias = "type")]
    pub message_type: Option<MessageType>,
}

/// Published on `message.read.<conversation>` when a watermark advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadEvent {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub read_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Published on `user.status.<user>` on presence transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatusEvent {
    pub user_id: Uuid,
    pub status: PresenceStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Frames the hub builds itself rather than forwarding from the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    TypingEvent { conversation_id: Uuid, user_id: Uuid, is_typing: bool },
    NewComment { comment: serde_json::Value },
}

impl ServerEvent {
    pub fn to_frame(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize server event");
                None
            }
        }
    }
}

/// Response body of the presence query route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub user_id: Uuid,
    pub status: PresenceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_frame_accepts_type_alias() {
        let id = Uuid::now_v7();
        let frame: ChatFrame =
            serde_json::from_str(&format!(r#"{{"conversation_id":"{id}","content":"hi"}}"#))
                .unwrap();
        assert_eq!(frame.conversation_id, id);
        assert_eq!(frame.message_type, None);

        let frame: ChatFrame = serde_json::from_str(&format!(
            r#"{{"conversation_id":"{id}","content":"pic","type":"image"}}"#
        ))
        .unwrap();
        assert_eq!(frame.message_type, Some(MessageType::Image));
    }

    #[test]
    fn test_chat_frame_requires_conversation() {
        assert!(serde_json::from_str::<ChatFrame>(r#"{"content":"hi"}"#).is_err());
    }

    #[test]
    fn test_typing_event_shape() {
        let conversation_id = Uuid::now_v7();
        let user_id = Uuid::now_v7();
        let frame =
            ServerEvent::TypingEvent { conversation_id, user_id, is_typing: true }.to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["type"], "typing_event");
        assert_eq!(value["conversation_id"], conversation_id.to_string());
        assert_eq!(value["user_id"], user_id.to_string());
        assert_eq!(value["is_typing"], true);
    }

    #[test]
    fn test_new_comment_envelope_shape() {
        let frame = ServerEvent::NewComment { comment: serde_json::json!({"id": "c1"}) }
            .to_frame()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["type"], "new_comment");
        assert_eq!(value["comment"]["id"], "c1");
    }

    #[test]
    fn test_status_is_lowercase() {
        let event = UserStatusEvent {
            user_id: Uuid::now_v7(),
            status: PresenceStatus::Offline,
            timestamp: chrono::Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["status"], "offline");
    }
}
