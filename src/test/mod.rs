/// Test support: an in-memory store with the same semantics as the Postgres
/// repositories, plus helpers for observing bus traffic.
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::api::error;
use crate::modules::bus::{Bus, BusMessage, Subscription};
use crate::modules::conversation::{
    model::{ConversationDetail, ConversationSummary, LastMessagePreview, NewConversation},
    repository::ConversationRepository,
    schema::{ConversationEntity, ConversationType, ParticipantEntity},
};
use crate::modules::message::{
    model::InsertMessage, repository::MessageRepository, schema::MessageEntity,
};

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub name: String,
    pub profile_picture_url: Option<String>,
}

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserProfile>,
    conversations: HashMap<Uuid, ConversationEntity>,
    participants: Vec<ParticipantEntity>,
    messages: Vec<MessageEntity>,
}

impl State {
    fn participants_of(&self, conversation_id: &Uuid) -> Vec<ParticipantEntity> {
        let mut participants: Vec<ParticipantEntity> = self
            .participants
            .iter()
            .filter(|p| p.conversation_id == *conversation_id)
            .cloned()
            .collect();
        participants.sort_by(|a, b| (a.joined_at, a.user_id).cmp(&(b.joined_at, b.user_id)));
        participants
    }

    fn is_participant(&self, conversation_id: &Uuid, user_id: &Uuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.conversation_id == *conversation_id && p.user_id == *user_id)
    }

    fn last_live_message(&self, conversation_id: &Uuid) -> Option<&MessageEntity> {
        self.messages
            .iter()
            .filter(|m| m.conversation_id == *conversation_id && !m.is_deleted)
            .max_by_key(|m| (m.created_at, m.id))
    }

    fn newest_created_at(&self, conversation_id: &Uuid) -> Option<chrono::DateTime<chrono::Utc>> {
        self.messages
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .map(|m| m.created_at)
            .max()
    }

    fn with_author(&self, mut message: MessageEntity) -> MessageEntity {
        if let Some(profile) = self.users.get(&message.sender_id) {
            message.author_name = Some(profile.name.clone());
            message.author_avatar = profile.profile_picture_url.clone();
        }
        message
    }

    fn detail(&self, conversation: &ConversationEntity) -> ConversationDetail {
        ConversationDetail {
            id: conversation.id,
            _type: conversation._type,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            participants: self.participants_of(&conversation.id),
            last_message: self.last_live_message(&conversation.id).map(|m| LastMessagePreview {
                content: m.content.clone(),
                sender_id: m.sender_id,
                created_at: m.created_at,
            }),
        }
    }

    fn find_direct(&self, user_a: &Uuid, user_b: &Uuid) -> Option<&ConversationEntity> {
        let mut candidates: Vec<&ConversationEntity> = self
            .conversations
            .values()
            .filter(|c| c._type == ConversationType::Direct)
            .filter(|c| self.is_participant(&c.id, user_a) && self.is_participant(&c.id, user_b))
            .collect();
        candidates.sort_by_key(|c| (c.created_at, c.id));
        candidates.into_iter().next()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: Uuid, name: &str, profile_picture_url: Option<&str>) {
        self.state.write().await.users.insert(
            user_id,
            UserProfile {
                name: name.to_string(),
                profile_picture_url: profile_picture_url.map(str::to_string),
            },
        );
    }

    pub async fn participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Option<ParticipantEntity> {
        self.state
            .read()
            .await
            .participants
            .iter()
            .find(|p| p.conversation_id == *conversation_id && p.user_id == *user_id)
            .cloned()
    }

    /// Unread count recomputed from messages and the read watermark.
    pub async fn derived_unread(&self, conversation_id: &Uuid, user_id: &Uuid) -> i32 {
        let state = self.state.read().await;
        let Some(participant) = state
            .participants
            .iter()
            .find(|p| p.conversation_id == *conversation_id && p.user_id == *user_id)
        else {
            return 0;
        };

        state
            .messages
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .filter(|m| m.sender_id != *user_id && !m.is_deleted)
            .filter(|m| participant.last_read_at.map_or(true, |read_at| m.created_at > read_at))
            .count() as i32
    }
}

#[async_trait::async_trait]
impl ConversationRepository for MemoryStore {
    async fn create(
        &self,
        conversation: &NewConversation,
    ) -> Result<ConversationDetail, error::SystemError> {
        if !conversation._type.accepts_member_count(conversation.participant_ids.len()) {
            return Err(error::SystemError::bad_request(
                "Participant count does not fit the conversation type",
            ));
        }

        let mut state = self.state.write().await;

        if conversation._type == ConversationType::Direct {
            let (a, b) = (&conversation.participant_ids[0], &conversation.participant_ids[1]);
            if let Some(existing) = state.find_direct(a, b) {
                return Ok(state.detail(existing));
            }
        }

        let now = chrono::Utc::now();
        let entity = ConversationEntity {
            id: conversation.id,
            _type: conversation._type,
            created_at: now,
            updated_at: now,
        };
        for user_id in &conversation.participant_ids {
            state.participants.push(ParticipantEntity {
                conversation_id: conversation.id,
                user_id: *user_id,
                joined_at: now,
                last_read_at: None,
                unread_count: 0,
            });
        }
        let detail = state.detail(&entity);
        state.conversations.insert(entity.id, entity);

        Ok(detail)
    }

    async fn find_detail(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationDetail>, error::SystemError> {
        let state = self.state.read().await;
        Ok(state.conversations.get(conversation_id).map(|c| state.detail(c)))
    }

    async fn find_by_user(
        &self,
        user_id: &Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ConversationSummary>, error::SystemError> {
        let state = self.state.read().await;

        let mut summaries: Vec<ConversationSummary> = state
            .participants
            .iter()
            .filter(|p| p.user_id == *user_id)
            .filter_map(|p| state.conversations.get(&p.conversation_id).map(|c| (p, c)))
            .map(|(membership, conversation)| {
                let participants = state.participants_of(&conversation.id);
                let other = (conversation._type == ConversationType::Direct)
                    .then(|| participants.iter().find(|p| p.user_id != *user_id))
                    .flatten()
                    .and_then(|p| state.users.get(&p.user_id));
                let last = state.last_live_message(&conversation.id);

                ConversationSummary {
                    id: conversation.id,
                    _type: conversation._type,
                    name: other.map(|u| u.name.clone()),
                    avatar_url: other.and_then(|u| u.profile_picture_url.clone()),
                    last_message: last.map(|m| m.content.clone()),
                    last_message_at: last.map(|m| m.created_at),
                    unread_count: membership.unread_count,
                    participants,
                    created_at: conversation.created_at,
                    updated_at: conversation.updated_at,
                }
            })
            .collect();

        // last_message_at DESC NULLS LAST, then updated_at DESC
        summaries.sort_by(|a, b| match (a.last_message_at, b.last_message_at) {
            (Some(x), Some(y)) => y.cmp(&x).then(b.updated_at.cmp(&a.updated_at)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.updated_at.cmp(&a.updated_at),
        });

        Ok(summaries.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect())
    }

    async fn find_conversation_ids_by_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<Uuid>, error::SystemError> {
        let state = self.state.read().await;
        Ok(state
            .participants
            .iter()
            .filter(|p| p.user_id == *user_id)
            .map(|p| p.conversation_id)
            .collect())
    }

    async fn find_participant_ids(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Vec<Uuid>, error::SystemError> {
        let state = self.state.read().await;
        Ok(state.participants_of(conversation_id).into_iter().map(|p| p.user_id).collect())
    }

    async fn mark_as_read(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>, error::SystemError> {
        let mut state = self.state.write().await;

        let now = chrono::Utc::now();
        let read_at = state.newest_created_at(conversation_id).map_or(now, |newest| newest.max(now));

        let participant = state
            .participants
            .iter_mut()
            .find(|p| p.conversation_id == *conversation_id && p.user_id == *user_id);

        Ok(participant.map(|p| {
            p.last_read_at = Some(read_at);
            p.unread_count = 0;
            read_at
        }))
    }

    async fn total_unread(&self, user_id: &Uuid) -> Result<i64, error::SystemError> {
        let state = self.state.read().await;
        Ok(state
            .participants
            .iter()
            .filter(|p| p.user_id == *user_id)
            .map(|p| i64::from(p.unread_count))
            .sum())
    }
}

#[async_trait::async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, message: &InsertMessage) -> Result<MessageEntity, error::SystemError> {
        let mut state = self.state.write().await;

        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(error::SystemError::not_found("Conversation not found"));
        }
        if !state.is_participant(&message.conversation_id, &message.sender_id) {
            return Err(error::SystemError::forbidden(
                "Sender is not a participant of this conversation",
            ));
        }

        let now = chrono::Utc::now();
        let created_at = match state.newest_created_at(&message.conversation_id) {
            Some(newest) if newest >= now => newest + chrono::Duration::microseconds(1),
            _ => now,
        };

        let entity = MessageEntity {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            message_type: message.message_type,
            created_at,
            updated_at: created_at,
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            author_name: None,
            author_avatar: None,
        };
        state.messages.push(entity.clone());

        for participant in state.participants.iter_mut().filter(|p| {
            p.conversation_id == message.conversation_id && p.user_id != message.sender_id
        }) {
            participant.unread_count += 1;
        }
        if let Some(conversation) = state.conversations.get_mut(&message.conversation_id) {
            conversation.updated_at = now;
        }

        Ok(state.with_author(entity))
    }

    async fn find_by_id(
        &self,
        message_id: &Uuid,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let state = self.state.read().await;
        let message = state.messages.iter().find(|m| m.id == *message_id).cloned();
        Ok(message.map(|m| state.with_author(m)))
    }

    async fn find_by_conversation(
        &self,
        conversation_id: &Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let state = self.state.read().await;

        let mut messages: Vec<MessageEntity> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == *conversation_id && !m.is_deleted)
            .cloned()
            .collect();
        messages.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        Ok(messages
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|m| state.with_author(m))
            .collect())
    }

    async fn update_content(
        &self,
        message_id: &Uuid,
        sender_id: &Uuid,
        content: &str,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let mut state = self.state.write().await;

        let now = chrono::Utc::now();
        let updated = state
            .messages
            .iter_mut()
            .find(|m| m.id == *message_id && m.sender_id == *sender_id && !m.is_deleted)
            .map(|m| {
                m.content = content.to_string();
                m.is_edited = true;
                m.edited_at = Some(now);
                m.updated_at = now;
                m.clone()
            });

        Ok(updated.map(|m| state.with_author(m)))
    }

    async fn soft_delete(
        &self,
        message_id: &Uuid,
        sender_id: &Uuid,
    ) -> Result<bool, error::SystemError> {
        let mut state = self.state.write().await;

        let now = chrono::Utc::now();
        let deleted = state
            .messages
            .iter_mut()
            .find(|m| m.id == *message_id && m.sender_id == *sender_id && !m.is_deleted)
            .map(|m| {
                m.is_deleted = true;
                m.deleted_at = Some(now);
                m.updated_at = now;
                (m.conversation_id, m.created_at)
            });

        let Some((conversation_id, created_at)) = deleted else {
            return Ok(false);
        };

        for participant in state.participants.iter_mut().filter(|p| {
            p.conversation_id == conversation_id
                && p.user_id != *sender_id
                && p.last_read_at.map_or(true, |read_at| read_at < created_at)
        }) {
            participant.unread_count = (participant.unread_count - 1).max(0);
        }

        Ok(true)
    }
}

/// Subscribes to `pattern` and forwards everything into a channel.
pub fn capture(
    bus: &dyn Bus,
    pattern: &str,
) -> Result<(Subscription, mpsc::UnboundedReceiver<BusMessage>), error::SystemError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = bus.subscribe(
        pattern,
        std::sync::Arc::new(move |message| {
            let _ = tx.send(message);
        }),
    )?;
    Ok((subscription, rx))
}

/// Next captured message, or `None` after one second of silence.
pub async fn next_message(rx: &mut mpsc::UnboundedReceiver<BusMessage>) -> Option<BusMessage> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.ok().flatten()
}

/// Next frame pushed to a client queue, or `None` after one second.
pub async fn next_frame(rx: &mut mpsc::Receiver<String>) -> Option<serde_json::Value> {
    let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.ok().flatten()?;
    serde_json::from_str(&frame).ok()
}

/// Waits briefly and reports whether nothing was delivered to the client queue.
pub async fn stays_quiet(rx: &mut mpsc::Receiver<String>) -> bool {
    !matches!(tokio::time::timeout(Duration::from_millis(200), rx.recv()).await, Ok(Some(_)))
}
