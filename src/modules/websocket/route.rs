use actix_web::web::ServiceConfig;

use crate::modules::websocket::handler::*;

/// Socket upgrades authenticate themselves and sit outside `/api`.
pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(chat_socket).service(dashboard_socket);
}

pub fn api_configure(cfg: &mut ServiceConfig) {
    cfg.service(get_online_users).service(get_presence);
}
