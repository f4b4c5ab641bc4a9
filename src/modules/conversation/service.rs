use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::error,
    constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    modules::{
        bus::{publish_json, subject, Bus},
        conversation::{
            model::{ConversationDetail, ConversationSummary, NewConversation},
            repository::ConversationRepository,
            schema::ConversationType,
        },
        websocket::message::ReadEvent,
    },
    utils::with_deadline,
};

#[derive(Clone)]
pub struct ConversationService {
    conversation_repo: Arc<dyn ConversationRepository>,
    bus: Arc<dyn Bus>,
}

impl ConversationService {
    pub fn with_dependencies(
        conversation_repo: Arc<dyn ConversationRepository>,
        bus: Arc<dyn Bus>,
    ) -> Self {
        ConversationService { conversation_repo, bus }
    }

    /// `others` may repeat ids or contain the creator; both are ignored.
    /// Creating a direct conversation that already exists returns it.
    pub async fn create_conversation(
        &self,
        _type: ConversationType,
        creator_id: Uuid,
        others: Vec<Uuid>,
    ) -> Result<ConversationDetail, error::SystemError> {
        let mut seen = HashSet::from([creator_id]);
        let others: Vec<Uuid> = others.into_iter().filter(|id| seen.insert(*id)).collect();

        match _type {
            ConversationType::Direct if others.len() != 1 => {
                return Err(error::SystemError::bad_request(
                    "A direct conversation needs exactly one other participant",
                ));
            }
            ConversationType::Group if others.is_empty() => {
                return Err(error::SystemError::bad_request(
                    "A group conversation needs at least one other participant",
                ));
            }
            _ => {}
        }

        let mut participant_ids = Vec::with_capacity(others.len() + 1);
        participant_ids.push(creator_id);
        participant_ids.extend(others);

        let conversation = with_deadline(self.conversation_repo.create(&NewConversation {
            id: Uuid::now_v7(),
            _type,
            participant_ids,
        }))
        .await?;

        tracing::info!(
            conversation = %conversation.id,
            creator = %creator_id,
            participants = conversation.participants.len(),
            "conversation ready"
        );
        Ok(conversation)
    }

    pub async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<ConversationDetail, error::SystemError> {
        with_deadline(self.conversation_repo.find_detail(&conversation_id))
            .await?
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))
    }

    /// Like [`Self::get_conversation`], but only for participants.
    pub async fn get_conversation_for(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<ConversationDetail, error::SystemError> {
        let conversation = self.get_conversation(conversation_id).await?;
        if !conversation.has_participant(&user_id) {
            return Err(error::SystemError::forbidden(
                "You are not a participant of this conversation",
            ));
        }
        Ok(conversation)
    }

    /// `page` starts at 1.
    pub async fn get_user_conversations(
        &self,
        user_id: Uuid,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<ConversationSummary>, error::SystemError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let page = page.unwrap_or(1).max(1);

        with_deadline(self.conversation_repo.find_by_user(&user_id, limit, (page - 1) * limit))
            .await
    }

    /// Advances the read watermark and publishes it on
    /// `message.read.<conversation>`.
    pub async fn mark_as_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<ReadEvent, error::SystemError> {
        let read_at = with_deadline(self.conversation_repo.mark_as_read(&conversation_id, &user_id))
            .await?
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;

        let event = ReadEvent { conversation_id, user_id, read_at };
        publish_json(self.bus.as_ref(), &subject::message_read(&conversation_id), &event).await;

        Ok(event)
    }

    pub async fn get_total_unread(&self, user_id: Uuid) -> Result<i64, error::SystemError> {
        with_deadline(self.conversation_repo.total_unread(&user_id)).await
    }
}
