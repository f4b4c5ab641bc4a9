use uuid::Uuid;

use crate::{
    api::error,
    modules::message::{model::InsertMessage, repository::MessageRepository, schema::MessageEntity},
};

const SELECT_MESSAGE: &str = r#"
    SELECT
        m.id,
        m.conversation_id,
        m.sender_id,
        m.content,
        m.message_type,
        m.created_at,
        m.updated_at,
        m.is_edited,
        m.edited_at,
        m.is_deleted,
        m.deleted_at,
        u.name AS author_name,
        u.profile_picture_url AS author_avatar
    FROM messages m
    LEFT JOIN users u ON u.id = m.sender_id
"#;

#[derive(Clone)]
pub struct MessageRepositoryPg {
    pool: sqlx::PgPool,
}

impl MessageRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_id_with<'e, E>(
        &self,
        message_id: &Uuid,
        tx: E,
    ) -> Result<Option<MessageEntity>, error::SystemError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let message =
            sqlx::query_as::<_, MessageEntity>(&format!("{SELECT_MESSAGE} WHERE m.id = $1"))
                .bind(message_id)
                .fetch_optional(tx)
                .await?;

        Ok(message)
    }
}

#[async_trait::async_trait]
impl MessageRepository for MessageRepositoryPg {
    async fn create(&self, message: &InsertMessage) -> Result<MessageEntity, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        // row lock on the conversation serializes writers per conversation
        let touched = sqlx::query_scalar::<_, Uuid>(
            "UPDATE conversations SET updated_at = NOW() WHERE id = $1 RETURNING id",
        )
        .bind(message.conversation_id)
        .fetch_optional(tx.as_mut())
        .await?;

        if touched.is_none() {
            return Err(error::SystemError::not_found("Conversation not found"));
        }

        let is_participant = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM conversation_participants
                WHERE conversation_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .fetch_one(tx.as_mut())
        .await?;

        if !is_participant {
            return Err(error::SystemError::forbidden(
                "Sender is not a participant of this conversation",
            ));
        }

        // created_at is strictly increasing within a conversation
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content, message_type, created_at, updated_at)
            SELECT $1, $2, $3, $4, $5, ts.at, ts.at
            FROM (
                SELECT GREATEST(
                    clock_timestamp(),
                    (SELECT MAX(created_at) + INTERVAL '1 microsecond'
                     FROM messages WHERE conversation_id = $2)
                ) AS at
            ) ts
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.message_type)
        .execute(tx.as_mut())
        .await?;

        sqlx::query(
            r#"
            UPDATE conversation_participants
            SET unread_count = unread_count + 1
            WHERE conversation_id = $1 AND user_id <> $2
            "#,
        )
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .execute(tx.as_mut())
        .await?;

        let created = self
            .find_by_id_with(&message.id, tx.as_mut())
            .await?
            .ok_or_else(|| error::SystemError::not_found("Message not found"))?;

        tx.commit().await?;

        Ok(created)
    }

    async fn find_by_id(
        &self,
        message_id: &Uuid,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        self.find_by_id_with(message_id, &self.pool).await
    }

    async fn find_by_conversation(
        &self,
        conversation_id: &Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let messages = sqlx::query_as::<_, MessageEntity>(&format!(
            r#"{SELECT_MESSAGE}
            WHERE m.conversation_id = $1 AND m.is_deleted = FALSE
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $2 OFFSET $3"#
        ))
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn update_content(
        &self,
        message_id: &Uuid,
        sender_id: &Uuid,
        content: &str,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE messages
            SET content = $3, is_edited = TRUE, edited_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND sender_id = $2 AND is_deleted = FALSE
            RETURNING id
            "#,
        )
        .bind(message_id)
        .bind(sender_id)
        .bind(content)
        .fetch_optional(tx.as_mut())
        .await?;

        let message = match updated {
            Some(id) => self.find_by_id_with(&id, tx.as_mut()).await?,
            None => None,
        };

        tx.commit().await?;
        Ok(message)
    }

    async fn soft_delete(
        &self,
        message_id: &Uuid,
        sender_id: &Uuid,
    ) -> Result<bool, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query_as::<_, (Uuid, chrono::DateTime<chrono::Utc>)>(
            r#"
            UPDATE messages
            SET is_deleted = TRUE, deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND sender_id = $2 AND is_deleted = FALSE
            RETURNING conversation_id, created_at
            "#,
        )
        .bind(message_id)
        .bind(sender_id)
        .fetch_optional(tx.as_mut())
        .await?;

        let Some((conversation_id, created_at)) = deleted else {
            tx.commit().await?;
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE conversation_participants
            SET unread_count = GREATEST(unread_count - 1, 0)
            WHERE conversation_id = $1
            AND user_id <> $2
            AND (last_read_at IS NULL OR last_read_at < $3)
            "#,
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(created_at)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
