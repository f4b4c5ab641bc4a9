use actix::Addr;
use actix_web::{get, post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        conversation::{
            model::{
                ConversationDetail, ConversationListQuery, ConversationSummary,
                CreateConversationRequest, TypingRequest, UnreadCountResponse,
            },
            service::ConversationService,
        },
        websocket::{events::Typing, message::ReadEvent, server::Hub},
    },
    utils::{ValidatedJson, ValidatedQuery},
};

#[post("")]
pub async fn create_conversation(
    conversation_svc: web::Data<ConversationService>,
    ValidatedJson(body): ValidatedJson<CreateConversationRequest>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let conversation =
        conversation_svc.create_conversation(body._type, user_id, body.participant_ids).await?;

    Ok(success::Success::created(Some(conversation))
        .message("Successfully created conversation"))
}

#[get("")]
pub async fn get_conversations(
    conversation_svc: web::Data<ConversationService>,
    ValidatedQuery(query): ValidatedQuery<ConversationListQuery>,
    req: HttpRequest,
) -> Result<success::Success<Vec<ConversationSummary>>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let conversations =
        conversation_svc.get_user_conversations(user_id, query.page, query.limit).await?;

    Ok(success::Success::ok(Some(conversations)).message("Successfully retrieved conversations"))
}

#[get("/unread-count")]
pub async fn get_unread_count(
    conversation_svc: web::Data<ConversationService>,
    req: HttpRequest,
) -> Result<success::Success<UnreadCountResponse>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let unread_count = conversation_svc.get_total_unread(user_id).await?;

    Ok(success::Success::ok(Some(UnreadCountResponse { unread_count })))
}

#[get("/{conversation_id}")]
pub async fn get_conversation(
    conversation_svc: web::Data<ConversationService>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let conversation = conversation_svc.get_conversation_for(*conversation_id, user_id).await?;

    Ok(success::Success::ok(Some(conversation)).message("Successfully retrieved conversation"))
}

#[post("/{conversation_id}/read")]
pub async fn mark_as_read(
    conversation_svc: web::Data<ConversationService>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<ReadEvent>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let event = conversation_svc.mark_as_read(*conversation_id, user_id).await?;

    Ok(success::Success::ok(Some(event)).message("Conversation marked as read"))
}

#[post("/{conversation_id}/typing")]
pub async fn send_typing(
    conversation_svc: web::Data<ConversationService>,
    hub: web::Data<Addr<Hub>>,
    conversation_id: web::Path<Uuid>,
    body: web::Json<TypingRequest>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    conversation_svc.get_conversation_for(*conversation_id, user_id).await?;

    hub.do_send(Typing { conversation_id: *conversation_id, user_id, is_typing: body.is_typing });

    Ok(success::Success::no_content())
}
