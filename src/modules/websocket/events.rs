/// Hub mailbox messages
///
/// Everything that mutates hub state arrives as one of these, so the hub's
/// mailbox is the single inbound channel.
use actix::prelude::*;
use uuid::Uuid;

use super::client::{ChatClient, DashboardClient};
use crate::modules::bus::BusMessage;

#[derive(Message)]
#[rtype(result = "()")]
pub struct RegisterChat {
    pub client: ChatClient,
}

#[derive(Message, Clone, Copy)]
#[rtype(result = "()")]
pub struct UnregisterChat {
    pub client_id: Uuid,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct RegisterDashboard {
    pub client: DashboardClient,
}

#[derive(Message, Clone, Copy)]
#[rtype(result = "()")]
pub struct UnregisterDashboard {
    pub client_id: Uuid,
}

/// A bus message picked up by one of the hub's wildcard subscriptions.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Broadcast {
    pub subject: String,
    pub payload: Vec<u8>,
}

impl From<BusMessage> for Broadcast {
    fn from(message: BusMessage) -> Self {
        Self { subject: message.subject, payload: message.payload }
    }
}

#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct Typing {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub is_typing: bool,
}

#[derive(Message)]
#[rtype(result = "bool")]
pub struct IsOnline {
    pub user_id: Uuid,
}

#[derive(Message)]
#[rtype(result = "Vec<Uuid>")]
pub struct GetOnlineUsers;

#[derive(Message)]
#[rtype(result = "HubStats")]
pub struct GetStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, MessageResponse)]
pub struct HubStats {
    pub chat_clients: usize,
    pub dashboard_clients: usize,
    pub rooms: usize,
    pub online_users: usize,
}
