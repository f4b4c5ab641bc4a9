/// WebSocket Module
///
/// Real-time delivery to connected clients:
///
/// - Hub actor (registry, fan-out sets, presence, typing relay)
/// - Per-socket read and write pumps with heartbeat and deadlines
/// - HTTP handlers that authenticate and upgrade chat and dashboard sockets
pub mod client;
pub mod events;
pub mod handler;
pub mod message;
pub mod presence;
pub mod route;
pub mod server;
pub mod session;
