/// Hub Actor
///
/// Owns the connection registry, the conversation fan-out sets and presence.
/// The actor mailbox is the only way into this state: socket endpoints send
/// register/unregister messages, bus subscriptions forward `Broadcast`s and
/// the typing route sends `Typing`. Steps that read the store run as atomic
/// responses so no other mailbox message interleaves with them.
///
/// Client queues are bounded. A client whose queue is full is unregistered
/// in the same step; dropping its sender closes the queue and the write pump
/// then closes the socket.
use actix::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::client::{deliver, ChatClient, DashboardClient, Delivery, Outbound};
use super::events::*;
use super::message::{PresenceStatus, ServerEvent, UserStatusEvent};
use super::presence::PresenceTracker;
use crate::modules::bus::subject::{self, HubSubject};
use crate::modules::bus::{publish_json, Bus, BusHandler, BusMessage, Subscription};
use crate::modules::conversation::repository::ConversationRepository;
use crate::utils::with_deadline;

const HUB_PATTERNS: [&str; 4] = [
    subject::CHAT_WILDCARD,
    subject::MESSAGE_READ_WILDCARD,
    subject::COMMENT_CREATED_WILDCARD,
    subject::USER_STATUS_WILDCARD,
];

struct ChatEntry {
    user_id: Uuid,
    outbound: Outbound,
    notifications: Option<Subscription>,
}

struct DashboardEntry {
    session_id: Uuid,
    updates: Subscription,
    // held so the write pump stays open; frames arrive via `updates`
    _outbound: Outbound,
}

pub struct Hub {
    bus: Arc<dyn Bus>,
    conversation_repo: Arc<dyn ConversationRepository>,
    chat_clients: HashMap<Uuid, ChatEntry>,
    /// conversation id -> chat client ids
    rooms: HashMap<Uuid, HashSet<Uuid>>,
    dashboards: HashMap<Uuid, DashboardEntry>,
    presence: PresenceTracker,
    wildcard_subscriptions: Vec<Subscription>,
    status_tx: mpsc::UnboundedSender<UserStatusEvent>,
    status_rx: Option<mpsc::UnboundedReceiver<UserStatusEvent>>,
}

impl Hub {
    pub fn new(bus: Arc<dyn Bus>, conversation_repo: Arc<dyn ConversationRepository>) -> Self {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        Self {
            bus,
            conversation_repo,
            chat_clients: HashMap::new(),
            rooms: HashMap::new(),
            dashboards: HashMap::new(),
            presence: PresenceTracker::new(),
            wildcard_subscriptions: Vec::new(),
            status_tx,
            status_rx: Some(status_rx),
        }
    }

    fn publish_status(&self, user_id: Uuid, status: PresenceStatus) {
        let event = UserStatusEvent { user_id, status, timestamp: chrono::Utc::now() };
        if self.status_tx.send(event).is_err() {
            tracing::warn!(user = %user_id, "status publisher gone, dropping presence event");
        }
    }

    fn unregister_chat(&mut self, client_id: Uuid) {
        let Some(entry) = self.chat_clients.remove(&client_id) else {
            return;
        };

        if let Some(notifications) = &entry.notifications {
            self.bus.unsubscribe(notifications);
        }
        self.rooms.retain(|_, members| {
            members.remove(&client_id);
            !members.is_empty()
        });

        if self.presence.disconnect(entry.user_id) {
            self.publish_status(entry.user_id, PresenceStatus::Offline);
        }

        tracing::info!(client = %client_id, user = %entry.user_id, "chat client unregistered");
    }

    fn unregister_dashboard(&mut self, client_id: Uuid) {
        if let Some(entry) = self.dashboards.remove(&client_id) {
            self.bus.unsubscribe(&entry.updates);
            tracing::info!(
                client = %client_id,
                session = %entry.session_id,
                "dashboard client unregistered"
            );
        }
    }

    /// Replaces the fan-out set with the connected clients of `participants`.
    fn sync_room(&mut self, conversation_id: Uuid, participants: &[Uuid]) {
        let participants: HashSet<&Uuid> = participants.iter().collect();
        let members: HashSet<Uuid> = self
            .chat_clients
            .iter()
            .filter(|(_, entry)| participants.contains(&entry.user_id))
            .map(|(client_id, _)| *client_id)
            .collect();

        if members.is_empty() {
            self.rooms.remove(&conversation_id);
        } else {
            self.rooms.insert(conversation_id, members);
        }
    }

    fn room_members(&self, conversation_id: &Uuid) -> Vec<Uuid> {
        self.rooms.get(conversation_id).map(|m| m.iter().copied().collect()).unwrap_or_default()
    }

    /// Non-blocking delivery; saturated or closed clients are unregistered
    /// before returning.
    fn deliver_to_chat_clients(&mut self, targets: Vec<Uuid>, frame: &str) {
        let mut stale = Vec::new();

        for client_id in targets {
            let Some(entry) = self.chat_clients.get(&client_id) else {
                continue;
            };
            match deliver(&entry.outbound, frame.to_string()) {
                Delivery::Queued => {}
                Delivery::Saturated => {
                    tracing::warn!(
                        client = %client_id,
                        user = %entry.user_id,
                        "outbound queue full, dropping client"
                    );
                    stale.push(client_id);
                }
                Delivery::Closed => stale.push(client_id),
            }
        }

        for client_id in stale {
            self.unregister_chat(client_id);
        }
    }

    fn all_chat_clients(&self) -> Vec<Uuid> {
        self.chat_clients.keys().copied().collect()
    }

    /// Re-reads the conversation's participants, then delivers `frame` to
    /// their connected clients, skipping `skip_user`'s own clients.
    fn refresh_and_fan_out(
        &mut self,
        conversation_id: Uuid,
        frame: String,
        skip_user: Option<Uuid>,
    ) -> AtomicResponse<Self, ()> {
        let repo = self.conversation_repo.clone();

        AtomicResponse::new(Box::pin(
            async move { with_deadline(repo.find_participant_ids(&conversation_id)).await }
                .into_actor(self)
                .map(move |participants, hub, _| {
                    match participants {
                        Ok(participants) => hub.sync_room(conversation_id, &participants),
                        Err(e) => tracing::warn!(
                            conversation = %conversation_id,
                            error = %e,
                            "participant refresh failed, using cached fan-out set"
                        ),
                    }
                    let targets: Vec<Uuid> = hub
                        .room_members(&conversation_id)
                        .into_iter()
                        .filter(|client_id| {
                            skip_user.map_or(true, |skip| {
                                hub.chat_clients.get(client_id).is_some_and(|c| c.user_id != skip)
                            })
                        })
                        .collect();
                    hub.deliver_to_chat_clients(targets, &frame);
                }),
        ))
    }
}

fn done() -> AtomicResponse<Hub, ()> {
    AtomicResponse::new(Box::pin(fut::ready(())))
}

/// Bus handler that pushes a per-client subject straight into the client's
/// queue. Holds only a weak sender so unregistering closes the queue; a full
/// queue asks the hub to drop the client.
fn queue_forwarder<M>(outbound: &Outbound, hub: Recipient<M>, release: M) -> BusHandler
where
    M: Message<Result = ()> + Copy + Send + Sync + 'static,
{
    let outbound = outbound.downgrade();
    Arc::new(move |message: BusMessage| {
        let Some(outbound) = outbound.upgrade() else {
            return;
        };
        let frame = match String::from_utf8(message.payload) {
            Ok(frame) => frame,
            Err(_) => {
                tracing::warn!(subject = %message.subject, "dropping non-UTF-8 payload");
                return;
            }
        };
        if deliver(&outbound, frame) == Delivery::Saturated {
            tracing::warn!(subject = %message.subject, "outbound queue full, dropping client");
            hub.do_send(release);
        }
    })
}

fn comment_envelope(payload: &str) -> Option<String> {
    let mut value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let comment = value.get_mut("comment").map(serde_json::Value::take)?;
    if comment.is_null() {
        return None;
    }
    ServerEvent::NewComment { comment }.to_frame()
}

impl Actor for Hub {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let broadcasts = ctx.address().recipient::<Broadcast>();
        for pattern in HUB_PATTERNS {
            let hub = broadcasts.clone();
            let handler: BusHandler =
                Arc::new(move |message: BusMessage| hub.do_send(Broadcast::from(message)));
            match self.bus.subscribe(pattern, handler) {
                Ok(subscription) => self.wildcard_subscriptions.push(subscription),
                Err(e) => tracing::error!(pattern, error = %e, "hub subscription failed"),
            }
        }

        // presence events leave in the order the transitions happened
        if let Some(mut statuses) = self.status_rx.take() {
            let bus = self.bus.clone();
            actix::spawn(async move {
                while let Some(event) = statuses.recv().await {
                    publish_json(bus.as_ref(), &subject::user_status(&event.user_id), &event)
                        .await;
                }
            });
        }

        tracing::info!("hub started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        for subscription in self.wildcard_subscriptions.drain(..) {
            self.bus.unsubscribe(&subscription);
        }
        for entry in self.chat_clients.values() {
            if let Some(notifications) = &entry.notifications {
                self.bus.unsubscribe(notifications);
            }
        }
        for entry in self.dashboards.values() {
            self.bus.unsubscribe(&entry.updates);
        }
        tracing::info!("hub stopped");
    }
}

impl Handler<RegisterChat> for Hub {
    type Result = AtomicResponse<Self, ()>;

    fn handle(&mut self, msg: RegisterChat, ctx: &mut Context<Self>) -> Self::Result {
        let ChatClient { id, user_id, outbound } = msg.client;

        let forwarder = queue_forwarder(
            &outbound,
            ctx.address().recipient(),
            UnregisterChat { client_id: id },
        );
        let notifications = match self.bus.subscribe(&subject::notifications(&user_id), forwarder)
        {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "notification subscription failed");
                None
            }
        };

        self.chat_clients.insert(id, ChatEntry { user_id, outbound, notifications });
        if self.presence.connect(user_id) {
            self.publish_status(user_id, PresenceStatus::Online);
        }
        tracing::info!(client = %id, user = %user_id, "chat client registered");

        let repo = self.conversation_repo.clone();
        AtomicResponse::new(Box::pin(
            async move { with_deadline(repo.find_conversation_ids_by_user(&user_id)).await }
                .into_actor(self)
                .map(move |conversations, hub, _| match conversations {
                    Ok(conversations) => {
                        if !hub.chat_clients.contains_key(&id) {
                            return;
                        }
                        for conversation_id in conversations {
                            hub.rooms.entry(conversation_id).or_default().insert(id);
                        }
                    }
                    Err(e) => tracing::warn!(
                        user = %user_id,
                        error = %e,
                        "conversation lookup failed, rooms fill on first message"
                    ),
                }),
        ))
    }
}

impl Handler<UnregisterChat> for Hub {
    type Result = ();

    fn handle(&mut self, msg: UnregisterChat, _: &mut Context<Self>) {
        self.unregister_chat(msg.client_id);
    }
}

impl Handler<RegisterDashboard> for Hub {
    type Result = ();

    fn handle(&mut self, msg: RegisterDashboard, ctx: &mut Context<Self>) {
        let DashboardClient { id, session_id, outbound } = msg.client;

        let forwarder = queue_forwarder(
            &outbound,
            ctx.address().recipient(),
            UnregisterDashboard { client_id: id },
        );
        match self.bus.subscribe(&subject::checkin_updates(&session_id), forwarder) {
            Ok(updates) => {
                self.dashboards.insert(id, DashboardEntry { session_id, updates, _outbound: outbound });
                tracing::info!(client = %id, session = %session_id, "dashboard client registered");
            }
            // dropping `outbound` here closes the socket
            Err(e) => tracing::error!(session = %session_id, error = %e, "dashboard subscription failed"),
        }
    }
}

impl Handler<UnregisterDashboard> for Hub {
    type Result = ();

    fn handle(&mut self, msg: UnregisterDashboard, _: &mut Context<Self>) {
        self.unregister_dashboard(msg.client_id);
    }
}

impl Handler<Broadcast> for Hub {
    type Result = AtomicResponse<Self, ()>;

    fn handle(&mut self, msg: Broadcast, _: &mut Context<Self>) -> Self::Result {
        let Some(route) = HubSubject::parse(&msg.subject) else {
            tracing::debug!(subject = %msg.subject, "unroutable subject");
            return done();
        };
        let Ok(frame) = String::from_utf8(msg.payload) else {
            tracing::warn!(subject = %msg.subject, "dropping non-UTF-8 payload");
            return done();
        };

        match route {
            HubSubject::Chat(conversation_id) | HubSubject::MessageRead(conversation_id) => {
                return self.refresh_and_fan_out(conversation_id, frame, None);
            }
            HubSubject::CommentCreated(post_id) => match comment_envelope(&frame) {
                Some(envelope) => {
                    let targets = self.all_chat_clients();
                    self.deliver_to_chat_clients(targets, &envelope);
                }
                None => tracing::warn!(post = %post_id, "comment event without a comment"),
            },
            HubSubject::UserStatus(_) => {
                let targets = self.all_chat_clients();
                self.deliver_to_chat_clients(targets, &frame);
            }
        }

        done()
    }
}

impl Handler<Typing> for Hub {
    type Result = AtomicResponse<Self, ()>;

    fn handle(&mut self, msg: Typing, _: &mut Context<Self>) -> Self::Result {
        let Some(frame) = ServerEvent::TypingEvent {
            conversation_id: msg.conversation_id,
            user_id: msg.user_id,
            is_typing: msg.is_typing,
        }
        .to_frame() else {
            return done();
        };

        self.refresh_and_fan_out(msg.conversation_id, frame, Some(msg.user_id))
    }
}

impl Handler<IsOnline> for Hub {
    type Result = bool;

    fn handle(&mut self, msg: IsOnline, _: &mut Context<Self>) -> Self::Result {
        self.presence.is_online(&msg.user_id)
    }
}

impl Handler<GetOnlineUsers> for Hub {
    type Result = Vec<Uuid>;

    fn handle(&mut self, _: GetOnlineUsers, _: &mut Context<Self>) -> Self::Result {
        self.presence.online_users()
    }
}

impl Handler<GetStats> for Hub {
    type Result = HubStats;

    fn handle(&mut self, _: GetStats, _: &mut Context<Self>) -> Self::Result {
        HubStats {
            chat_clients: self.chat_clients.len(),
            dashboard_clients: self.dashboards.len(),
            rooms: self.rooms.len(),
            online_users: self.presence.online_users().len(),
        }
    }
}
