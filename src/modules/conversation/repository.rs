use uuid::Uuid;

use crate::{
    api::error,
    modules::conversation::model::{ConversationDetail, ConversationSummary, NewConversation},
};

#[async_trait::async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Creates the conversation with its participants in one transaction.
    /// For a direct conversation an existing one between the same pair is
    /// returned instead.
    async fn create(
        &self,
        conversation: &NewConversation,
    ) -> Result<ConversationDetail, error::SystemError>;

    async fn find_detail(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationDetail>, error::SystemError>;

    /// Page of `user_id`'s conversations, most recent activity first.
    async fn find_by_user(
        &self,
        user_id: &Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ConversationSummary>, error::SystemError>;

    async fn find_conversation_ids_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<Uuid>, error::SystemError>;

    async fn find_participant_ids(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Vec<Uuid>, error::SystemError>;

    /// Resets the unread counter and moves the read watermark to now.
    /// Returns the new watermark, or `None` when `user_id` is not a participant.
    async fn mark_as_read(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>, error::SystemError>;

    async fn total_unread(&self, user_id: &Uuid) -> Result<i64, error::SystemError>;
}
