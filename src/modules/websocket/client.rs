/// Connected clients and their bounded outbound queues.
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::constants::CLIENT_QUEUE_CAPACITY;

pub type Outbound = mpsc::Sender<String>;

/// Creates the queue between the hub (sender) and a socket's write pump.
pub fn outbound_queue() -> (Outbound, mpsc::Receiver<String>) {
    mpsc::channel(CLIENT_QUEUE_CAPACITY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue full; the client must be dropped.
    Saturated,
    /// Write pump already gone.
    Closed,
}

/// Non-blocking enqueue.
pub fn deliver(outbound: &Outbound, frame: String) -> Delivery {
    match outbound.try_send(frame) {
        Ok(()) => Delivery::Queued,
        Err(TrySendError::Full(_)) => Delivery::Saturated,
        Err(TrySendError::Closed(_)) => Delivery::Closed,
    }
}

#[derive(Debug)]
pub struct ChatClient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub outbound: Outbound,
}

impl ChatClient {
    pub fn new(user_id: Uuid, outbound: Outbound) -> Self {
        Self { id: Uuid::now_v7(), user_id, outbound }
    }
}

#[derive(Debug)]
pub struct DashboardClient {
    pub id: Uuid,
    pub session_id: Uuid,
    pub outbound: Outbound,
}

impl DashboardClient {
    pub fn new(session_id: Uuid, outbound: Outbound) -> Self {
        Self { id: Uuid::now_v7(), session_id, outbound }
    }
}
