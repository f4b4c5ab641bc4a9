use std::collections::HashMap;
use uuid::Uuid;

use crate::api::error;
use crate::modules::conversation::model::{
    ConversationDetail, ConversationSummary, ConversationSummaryRow, LastMessagePreview,
    NewConversation,
};
use crate::modules::conversation::repository::ConversationRepository;
use crate::modules::conversation::schema::{
    ConversationEntity, ConversationType, ParticipantEntity,
};

#[derive(Clone)]
pub struct ConversationPgRepository {
    pool: sqlx::PgPool,
}

impl ConversationPgRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    async fn find_participants<'e, E>(
        &self,
        conversation_ids: &[Uuid],
        tx: E,
    ) -> Result<Vec<ParticipantEntity>, error::SystemError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let participants = sqlx::query_as::<_, ParticipantEntity>(
            r#"
            SELECT conversation_id, user_id, joined_at, last_read_at, unread_count
            FROM conversation_participants
            WHERE conversation_id = ANY($1)
            ORDER BY joined_at, user_id
            "#,
        )
        .bind(conversation_ids)
        .fetch_all(tx)
        .await?;

        Ok(participants)
    }

    async fn find_direct_between_users<'e, E>(
        &self,
        user_a: &Uuid,
        user_b: &Uuid,
        tx: E,
    ) -> Result<Option<Uuid>, error::SystemError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT c.id
            FROM conversations c
            WHERE c.type = 'direct'
            AND EXISTS (
                SELECT 1 FROM conversation_participants p
                WHERE p.conversation_id = c.id AND p.user_id = $1
            )
            AND EXISTS (
                SELECT 1 FROM conversation_participants p
                WHERE p.conversation_id = c.id AND p.user_id = $2
            )
            ORDER BY c.created_at, c.id
            LIMIT 1
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(tx)
        .await?;

        Ok(id)
    }
}

/// Stable advisory-lock key for an unordered user pair.
fn direct_pair_key(user_a: &Uuid, user_b: &Uuid) -> String {
    let (low, high) = if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) };
    format!("direct:{low}:{high}")
}

#[async_trait::async_trait]
impl ConversationRepository for ConversationPgRepository {
    async fn create(
        &self,
        conversation: &NewConversation,
    ) -> Result<ConversationDetail, error::SystemError> {
        if !conversation._type.accepts_member_count(conversation.participant_ids.len()) {
            return Err(error::SystemError::bad_request(
                "Participant count does not fit the conversation type",
            ));
        }

        let mut tx = self.pool.begin().await?;

        if conversation._type == ConversationType::Direct {
            let (a, b) = (&conversation.participant_ids[0], &conversation.participant_ids[1]);

            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(direct_pair_key(a, b))
                .execute(tx.as_mut())
                .await?;

            if let Some(existing) = self.find_direct_between_users(a, b, tx.as_mut()).await? {
                tx.commit().await?;
                return self
                    .find_detail(&existing)
                    .await?
                    .ok_or_else(|| error::SystemError::not_found("Conversation not found"));
            }
        }

        let created = sqlx::query_as::<_, ConversationEntity>(
            r#"
            INSERT INTO conversations (id, type)
            VALUES ($1, $2)
            RETURNING id, type, created_at, updated_at
            "#,
        )
        .bind(conversation.id)
        .bind(conversation._type)
        .fetch_one(tx.as_mut())
        .await?;

        let participants = sqlx::query_as::<_, ParticipantEntity>(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id, unread_count)
            SELECT $1, unnest($2::uuid[]), 0
            RETURNING conversation_id, user_id, joined_at, last_read_at, unread_count
            "#,
        )
        .bind(created.id)
        .bind(&conversation.participant_ids)
        .fetch_all(tx.as_mut())
        .await?;

        tx.commit().await?;

        Ok(ConversationDetail {
            id: created.id,
            _type: created._type,
            created_at: created.created_at,
            updated_at: created.updated_at,
            participants,
            last_message: None,
        })
    }

    async fn find_detail(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationDetail>, error::SystemError> {
        let conversation = sqlx::query_as::<_, ConversationEntity>(
            "SELECT id, type, created_at, updated_at FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(conversation) = conversation else {
            return Ok(None);
        };

        let last_message = sqlx::query_as::<_, LastMessagePreview>(
            r#"
            SELECT content, sender_id, created_at
            FROM messages
            WHERE conversation_id = $1 AND is_deleted = FALSE
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        let participants = self.find_participants(&[conversation.id], &self.pool).await?;

        Ok(Some(ConversationDetail {
            id: conversation.id,
            _type: conversation._type,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            participants,
            last_message,
        }))
    }

    async fn find_by_user(
        &self,
        user_id: &Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ConversationSummary>, error::SystemError> {
        let rows = sqlx::query_as::<_, ConversationSummaryRow>(
            r#"
            SELECT
                c.id,
                c.type,
                c.created_at,
                c.updated_at,
                CASE WHEN c.type = 'direct' THEN other_user.name END AS name,
                CASE WHEN c.type = 'direct' THEN other_user.profile_picture_url END AS avatar_url,
                lm.content AS last_message,
                lm.created_at AS last_message_at,
                cp.unread_count
            FROM conversations c
            JOIN conversation_participants cp
                ON cp.conversation_id = c.id AND cp.user_id = $1
            LEFT JOIN LATERAL (
                SELECT m.content, m.created_at
                FROM messages m
                WHERE m.conversation_id = c.id AND m.is_deleted = FALSE
                ORDER BY m.created_at DESC, m.id DESC
                LIMIT 1
            ) lm ON TRUE
            LEFT JOIN LATERAL (
                SELECT u.name, u.profile_picture_url
                FROM conversation_participants op
                JOIN users u ON u.id = op.user_id
                WHERE op.conversation_id = c.id AND op.user_id <> $1
                ORDER BY op.joined_at
                LIMIT 1
            ) other_user ON TRUE
            ORDER BY lm.created_at DESC NULLS LAST, c.updated_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let conversation_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let participants = self.find_participants(&conversation_ids, &self.pool).await?;

        let mut participant_map = participants.into_iter().fold(
            HashMap::<Uuid, Vec<ParticipantEntity>>::new(),
            |mut acc, participant| {
                acc.entry(participant.conversation_id).or_default().push(participant);
                acc
            },
        );

        Ok(rows
            .into_iter()
            .map(|row| {
                let participants = participant_map.remove(&row.id).unwrap_or_default();
                ConversationSummary::from_row(row, participants)
            })
            .collect())
    }

    async fn find_conversation_ids_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<Uuid>, error::SystemError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT conversation_id FROM conversation_participants WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn find_participant_ids(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Vec<Uuid>, error::SystemError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn mark_as_read(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>, error::SystemError> {
        let mut tx = self.pool.begin().await?;

        // serialized with sends on the conversation row lock
        let locked = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM conversations WHERE id = $1 FOR UPDATE",
        )
        .bind(conversation_id)
        .fetch_optional(tx.as_mut())
        .await?;

        if locked.is_none() {
            return Ok(None);
        }

        // the watermark never lands before the newest message
        let read_at = sqlx::query_scalar::<_, chrono::DateTime<chrono::Utc>>(
            r#"
            UPDATE conversation_participants
            SET
                last_read_at = GREATEST(
                    clock_timestamp(),
                    (SELECT MAX(created_at) FROM messages WHERE conversation_id = $1)
                ),
                unread_count = 0
            WHERE conversation_id = $1 AND user_id = $2
            RETURNING last_read_at
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(tx.as_mut())
        .await?;

        tx.commit().await?;

        Ok(read_at)
    }

    async fn total_unread(&self, user_id: &Uuid) -> Result<i64, error::SystemError> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(unread_count), 0)::BIGINT
            FROM conversation_participants
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}
