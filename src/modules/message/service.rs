/// Message Service
///
/// Writes go to the store first; the resulting message is then published on
/// `chat.<conversation>` for the hub to fan out. Publishing is best effort:
/// a bus failure is logged and the stored result is still returned.
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error;
use crate::modules::bus::{publish_json, subject, Bus};
use crate::modules::conversation::repository::ConversationRepository;
use crate::modules::message::model::{InsertMessage, MessageResponse};
use crate::modules::message::repository::MessageRepository;
use crate::modules::message::schema::MessageType;
use crate::utils::with_deadline;

const MAX_CONTENT_LENGTH: usize = 4000;

#[derive(Clone)]
pub struct MessageService {
    message_repo: Arc<dyn MessageRepository>,
    conversation_repo: Arc<dyn ConversationRepository>,
    bus: Arc<dyn Bus>,
}

impl MessageService {
    pub fn with_dependencies(
        message_repo: Arc<dyn MessageRepository>,
        conversation_repo: Arc<dyn ConversationRepository>,
        bus: Arc<dyn Bus>,
    ) -> Self {
        MessageService { message_repo, conversation_repo, bus }
    }

    async fn publish(&self, message: &MessageResponse) {
        publish_json(self.bus.as_ref(), &subject::chat(&message.conversation_id), message).await;
    }

    pub async fn send(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        message_type: Option<MessageType>,
    ) -> Result<MessageResponse, error::SystemError> {
        validate_content(&content)?;

        let entity = with_deadline(self.message_repo.create(&InsertMessage {
            id: Uuid::now_v7(),
            conversation_id,
            sender_id,
            content,
            message_type: message_type.unwrap_or_default(),
        }))
        .await?;

        let message = MessageResponse::from(entity);
        self.publish(&message).await;

        tracing::debug!(
            conversation = %conversation_id,
            sender = %sender_id,
            message = %message.id,
            "message sent"
        );
        Ok(message)
    }

    /// Only the sender may edit, and never after deletion.
    pub async fn edit(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        new_content: String,
    ) -> Result<MessageResponse, error::SystemError> {
        validate_content(&new_content)?;

        let existing = with_deadline(self.message_repo.find_by_id(&message_id))
            .await?
            .ok_or_else(|| error::SystemError::not_found("Message not found"))?;

        if existing.sender_id != user_id {
            return Err(error::SystemError::forbidden("You can only edit your own messages"));
        }
        if existing.is_deleted {
            return Err(error::SystemError::bad_request("Deleted messages cannot be edited"));
        }

        let updated =
            with_deadline(self.message_repo.update_content(&message_id, &user_id, &new_content))
                .await?
                .ok_or_else(|| error::SystemError::not_found("Message not found"))?;

        let message = MessageResponse::from(updated);
        self.publish(&message).await;
        Ok(message)
    }

    /// Soft delete. Deleting a tombstone again changes nothing and is not
    /// re-published.
    pub async fn delete(
        &self,
        message_id: Uuid,
        user_id: Uuid,
    ) -> Result<MessageResponse, error::SystemError> {
        let existing = with_deadline(self.message_repo.find_by_id(&message_id))
            .await?
            .ok_or_else(|| error::SystemError::not_found("Message not found"))?;

        if existing.sender_id != user_id {
            return Err(error::SystemError::forbidden("You can only delete your own messages"));
        }
        if existing.is_deleted {
            return Ok(MessageResponse::from(existing));
        }

        let deleted = with_deadline(self.message_repo.soft_delete(&message_id, &user_id)).await?;

        let tombstone = with_deadline(self.message_repo.find_by_id(&message_id))
            .await?
            .ok_or_else(|| error::SystemError::not_found("Message not found"))?;
        let message = MessageResponse::from(tombstone);

        if deleted {
            self.publish(&message).await;
        }
        Ok(message)
    }

    /// Newest first, tombstones excluded. Participants only.
    pub async fn get_messages(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageResponse>, error::SystemError> {
        let conversation = with_deadline(self.conversation_repo.find_detail(&conversation_id))
            .await?
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;

        if !conversation.has_participant(&user_id) {
            return Err(error::SystemError::forbidden(
                "You are not a participant of this conversation",
            ));
        }

        let messages = with_deadline(self.message_repo.find_by_conversation(
            &conversation_id,
            limit,
            offset,
        ))
        .await?;

        Ok(messages.into_iter().map(MessageResponse::from).collect())
    }
}

/// Empty content is a valid message; only the length is capped.
fn validate_content(content: &str) -> Result<(), error::SystemError> {
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(error::SystemError::bad_request("Message content is too long"));
    }
    Ok(())
}
