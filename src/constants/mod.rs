use std::time::Duration;

/// Time allowed to read the next frame (or pong) from a peer.
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping interval, must stay below `PONG_WAIT`.
pub const PING_PERIOD: Duration = Duration::from_secs(54);
/// Time allowed to write a single frame to a peer.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Largest inbound frame accepted from a socket.
pub const MAX_FRAME_SIZE: usize = 512;
/// Per-client outbound queue capacity.
pub const CLIENT_QUEUE_CAPACITY: usize = 256;
/// Deadline applied to every store call made on behalf of a request.
pub const STORE_DEADLINE: Duration = Duration::from_secs(5);

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_MESSAGE_LIMIT: i64 = 50;

pub struct Env {
    pub jwt_secret: String,
    pub database_url: String,
    pub bus_url: Option<String>,
    pub frontend_url: String,
    pub ip: String,
    pub port: u16,
}

impl Env {
    fn new() -> Self {
        let jwt_secret = std::env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in .env file or environment variable");

        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");
        let bus_url = std::env::var("BUS_URL").ok().filter(|url| !url.trim().is_empty());

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .expect("PORT must be a valid u16 integer");
        Env { jwt_secret, database_url, bus_url, frontend_url, ip, port }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
