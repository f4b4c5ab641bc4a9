use uuid::Uuid;

use crate::modules::message::model::InsertMessage;
use crate::{api::error, modules::message::schema::MessageEntity};

#[async_trait::async_trait]
pub trait MessageRepository: Send + Sync {
    /// Inserts the message, bumps every other participant's unread counter
    /// and touches the conversation, atomically.
    async fn create(&self, message: &InsertMessage) -> Result<MessageEntity, error::SystemError>;

    async fn find_by_id(&self, message_id: &Uuid)
        -> Result<Option<MessageEntity>, error::SystemError>;

    /// Non-deleted messages, newest first.
    async fn find_by_conversation(
        &self,
        conversation_id: &Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    /// Replaces the content of a live message owned by `sender_id`.
    /// `None` when no such message exists.
    async fn update_content(
        &self,
        message_id: &Uuid,
        sender_id: &Uuid,
        content: &str,
    ) -> Result<Option<MessageEntity>, error::SystemError>;

    /// Tombstones a live message owned by `sender_id` and withdraws it from
    /// the unread counters it contributed to. Returns whether a row changed.
    async fn soft_delete(
        &self,
        message_id: &Uuid,
        sender_id: &Uuid,
    ) -> Result<bool, error::SystemError>;
}
