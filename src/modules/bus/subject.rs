/// Subject namespace
///
/// Subjects are dot-separated tokens. In a subscription pattern `*` matches
/// exactly one token and a trailing `>` matches one or more tokens.
use uuid::Uuid;

pub const CHAT_WILDCARD: &str = "chat.*";
pub const MESSAGE_READ_WILDCARD: &str = "message.read.*";
pub const COMMENT_CREATED_WILDCARD: &str = "comment.created.*";
pub const USER_STATUS_WILDCARD: &str = "user.status.*";

pub const EVENTS_CREATED: &str = "events.created";
pub const EVENTS_REGISTERED: &str = "events.registered";
pub const EVENTS_CANCELLED: &str = "events.cancelled";
pub const EVENTS_SESSION_CANCELLED: &str = "events.session.cancelled";
pub const EVENTS_DELETED: &str = "events.deleted";
pub const POST_CREATED: &str = "post.created";
pub const REACTION_CREATED: &str = "reaction.created";

const CHAT_PREFIX: &str = "chat.";
const MESSAGE_READ_PREFIX: &str = "message.read.";
const COMMENT_CREATED_PREFIX: &str = "comment.created.";
const USER_STATUS_PREFIX: &str = "user.status.";

pub fn chat(conversation_id: &Uuid) -> String {
    format!("{CHAT_PREFIX}{conversation_id}")
}

pub fn message_read(conversation_id: &Uuid) -> String {
    format!("{MESSAGE_READ_PREFIX}{conversation_id}")
}

pub fn comment_created(post_id: &Uuid) -> String {
    format!("{COMMENT_CREATED_PREFIX}{post_id}")
}

pub fn user_status(user_id: &Uuid) -> String {
    format!("{USER_STATUS_PREFIX}{user_id}")
}

pub fn notifications(user_id: &Uuid) -> String {
    format!("notifications.{user_id}")
}

pub fn checkin_updates(session_id: &Uuid) -> String {
    format!("checkin.updates.{session_id}")
}

/// Subjects the hub routes from its wildcard subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubSubject {
    Chat(Uuid),
    MessageRead(Uuid),
    CommentCreated(String),
    UserStatus(Uuid),
}

impl HubSubject {
    pub fn parse(subject: &str) -> Option<Self> {
        if let Some(rest) = subject.strip_prefix(MESSAGE_READ_PREFIX) {
            return Uuid::parse_str(rest).ok().map(HubSubject::MessageRead);
        }
        if let Some(rest) = subject.strip_prefix(COMMENT_CREATED_PREFIX) {
            return single_token(rest).map(|post| HubSubject::CommentCreated(post.to_string()));
        }
        if let Some(rest) = subject.strip_prefix(USER_STATUS_PREFIX) {
            return Uuid::parse_str(rest).ok().map(HubSubject::UserStatus);
        }
        if let Some(rest) = subject.strip_prefix(CHAT_PREFIX) {
            return Uuid::parse_str(rest).ok().map(HubSubject::Chat);
        }
        None
    }
}

fn single_token(rest: &str) -> Option<&str> {
    (!rest.is_empty() && !rest.contains('.')).then_some(rest)
}

pub fn is_valid_subject(subject: &str) -> bool {
    subject.split('.').all(|token| !token.is_empty() && token != "*" && token != ">")
}

pub fn is_valid_pattern(pattern: &str) -> bool {
    let tokens: Vec<&str> = pattern.split('.').collect();
    let last = tokens.len() - 1;
    tokens.iter().enumerate().all(|(i, token)| match *token {
        "" => false,
        ">" => i == last,
        _ => true,
    })
}

pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (None, None) => return true,
            (Some(">"), Some(s)) => return !s.is_empty(),
            (Some("*"), Some(s)) if !s.is_empty() => {}
            (Some(p), Some(s)) if !s.is_empty() && p == s => {}
            _ => return false,
        }
    }
}
