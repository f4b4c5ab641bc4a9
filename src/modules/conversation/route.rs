use actix_web::web::{scope, ServiceConfig};

use crate::modules::conversation::handle::*;
use crate::modules::message::handle::{get_messages, send_message};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/conversations")
            .service(get_unread_count)
            .service(get_conversations)
            .service(create_conversation)
            .service(get_conversation)
            .service(mark_as_read)
            .service(send_typing)
            .service(get_messages)
            .service(send_message),
    );
}
