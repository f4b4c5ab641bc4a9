/// Presence tracking
///
/// A user is online while at least one chat client is registered for them.
/// Only the 0 -> 1 and 1 -> 0 transitions are reported so the hub publishes
/// exactly one status event per change.
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct PresenceTracker {
    connections: HashMap<Uuid, usize>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the user just came online.
    pub fn connect(&mut self, user_id: Uuid) -> bool {
        let count = self.connections.entry(user_id).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Returns true when the user just went offline.
    pub fn disconnect(&mut self, user_id: Uuid) -> bool {
        match self.connections.get_mut(&user_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.connections.remove(&user_id);
                true
            }
            None => false,
        }
    }

    pub fn is_online(&self, user_id: &Uuid) -> bool {
        self.connections.contains_key(user_id)
    }

    pub fn online_users(&self) -> Vec<Uuid> {
        self.connections.keys().copied().collect()
    }

    pub fn connection_count(&self, user_id: &Uuid) -> usize {
        self.connections.get(user_id).copied().unwrap_or(0)
    }
}
