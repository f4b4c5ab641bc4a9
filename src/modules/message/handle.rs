use actix_web::{delete, get, patch, post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    constants::DEFAULT_MESSAGE_LIMIT,
    middlewares::get_claims,
    modules::message::{
        model::{MessageQuery, MessageResponse, SendMessageRequest, UpdateMessageRequest},
        service::MessageService,
    },
    utils::{ValidatedJson, ValidatedQuery},
};

#[post("/{conversation_id}/messages")]
pub async fn send_message(
    message_service: web::Data<MessageService>,
    conversation_id: web::Path<Uuid>,
    ValidatedJson(body): ValidatedJson<SendMessageRequest>,
    req: HttpRequest,
) -> Result<success::Success<MessageResponse>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let message = message_service
        .send(*conversation_id, user_id, body.content, body.message_type)
        .await?;

    Ok(success::Success::created(Some(message)).message("Send message successfully"))
}

#[get("/{conversation_id}/messages")]
pub async fn get_messages(
    message_service: web::Data<MessageService>,
    conversation_id: web::Path<Uuid>,
    ValidatedQuery(query): ValidatedQuery<MessageQuery>,
    req: HttpRequest,
) -> Result<success::Success<Vec<MessageResponse>>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let messages = message_service
        .get_messages(
            *conversation_id,
            user_id,
            query.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT),
            query.offset.unwrap_or(0),
        )
        .await?;

    Ok(success::Success::ok(Some(messages)).message("Successfully retrieved messages"))
}

#[patch("/{message_id}")]
pub async fn edit_message(
    message_service: web::Data<MessageService>,
    message_id: web::Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateMessageRequest>,
    req: HttpRequest,
) -> Result<success::Success<MessageResponse>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let message = message_service.edit(*message_id, user_id, body.content).await?;

    Ok(success::Success::ok(Some(message)).message("Message updated"))
}

#[delete("/{message_id}")]
pub async fn delete_message(
    message_service: web::Data<MessageService>,
    message_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<MessageResponse>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let message = message_service.delete(*message_id, user_id).await?;

    Ok(success::Success::ok(Some(message)).message("Message deleted"))
}
