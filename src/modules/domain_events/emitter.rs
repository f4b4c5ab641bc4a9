/// Domain Event Emitter
///
/// Typed publishing for the upstream domains (community, check-in,
/// notifications, events). Every method is fire-and-forget: a bus failure is
/// logged and never retried.
use std::sync::Arc;
use uuid::Uuid;

use crate::modules::bus::{publish_json, subject, Bus};
use crate::modules::domain_events::model::{
    CheckinUpdate, CommentCreated, EventLifecycle, EventTopic, PostCreated, ReactionCreated,
};

#[derive(Clone)]
pub struct DomainEventEmitter {
    bus: Arc<dyn Bus>,
}

impl DomainEventEmitter {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    pub async fn comment_created(&self, event: &CommentCreated) {
        let subject = subject::comment_created(&event.comment.post_id);
        publish_json(self.bus.as_ref(), &subject, event).await;
    }

    pub async fn post_created(&self, event: &PostCreated) {
        publish_json(self.bus.as_ref(), subject::POST_CREATED, event).await;
    }

    pub async fn reaction_created(&self, event: &ReactionCreated) {
        publish_json(self.bus.as_ref(), subject::REACTION_CREATED, event).await;
    }

    pub async fn checkin_update(&self, update: &CheckinUpdate) {
        let subject = subject::checkin_updates(&update.session_id);
        publish_json(self.bus.as_ref(), &subject, update).await;
    }

    /// The payload is opaque to the hub and goes to every socket of `user_id`.
    pub async fn user_notification(&self, user_id: &Uuid, payload: &serde_json::Value) {
        publish_json(self.bus.as_ref(), &subject::notifications(user_id), payload).await;
    }

    pub async fn event_lifecycle(&self, topic: EventTopic, event: &EventLifecycle) {
        publish_json(self.bus.as_ref(), topic.subject(), event).await;
    }
}
