/// WebSocket HTTP Handlers
///
/// Authenticate, upgrade, register with the hub and start the socket pumps.
/// The token is checked before the upgrade so unauthenticated peers never
/// reach the hub.
use actix::Addr;
use actix_web::{get, web, HttpRequest, HttpResponse};
use uuid::Uuid;

use super::client::{outbound_queue, ChatClient, DashboardClient};
use super::events::{GetOnlineUsers, IsOnline, RegisterChat, RegisterDashboard};
use super::message::{PresenceResponse, PresenceStatus};
use super::server::Hub;
use super::session::{self, ClientRef, Endpoint, Heartbeat};
use crate::{
    api::{error, success},
    constants::MAX_FRAME_SIZE,
    modules::message::service::MessageService,
    utils::{bearer_token, Claims},
    ENV,
};

fn authenticate(req: &HttpRequest) -> Result<Uuid, error::Error> {
    let token =
        bearer_token(req).ok_or_else(|| error::Error::unauthorized("Token Invalid or Expired"))?;
    let claims = Claims::decode(&token, ENV.jwt_secret.as_ref())
        .map_err(|_| error::Error::unauthorized("Token Invalid or Expired"))?;
    Ok(claims.sub)
}

fn heartbeat(req: &HttpRequest) -> Heartbeat {
    req.app_data::<web::Data<Heartbeat>>().map(|h| *h.get_ref()).unwrap_or_default()
}

/// Endpoint: GET /ws
#[get("/ws")]
pub async fn chat_socket(
    req: HttpRequest,
    stream: web::Payload,
    hub: web::Data<Addr<Hub>>,
    message_service: web::Data<MessageService>,
) -> Result<HttpResponse, actix_web::Error> {
    let user_id = authenticate(&req)?;

    let (response, ws_session, msg_stream) = actix_ws::handle(&req, stream)?;

    let (outbound, queue) = outbound_queue();
    let client = ChatClient::new(user_id, outbound);
    let client_ref = ClientRef::Chat(client.id);
    hub.do_send(RegisterChat { client });

    session::spawn(
        ws_session,
        msg_stream.max_frame_size(MAX_FRAME_SIZE),
        queue,
        client_ref,
        Endpoint::Chat { user_id, messages: message_service },
        hub.get_ref().clone(),
        heartbeat(&req),
    );

    tracing::info!(user = %user_id, "chat socket connected");
    Ok(response)
}

/// Endpoint: GET /ws/dashboard/{session_id}
#[get("/ws/dashboard/{session_id}")]
pub async fn dashboard_socket(
    req: HttpRequest,
    stream: web::Payload,
    session_id: web::Path<Uuid>,
    hub: web::Data<Addr<Hub>>,
) -> Result<HttpResponse, actix_web::Error> {
    let user_id = authenticate(&req)?;
    let session_id = session_id.into_inner();

    let (response, ws_session, msg_stream) = actix_ws::handle(&req, stream)?;

    let (outbound, queue) = outbound_queue();
    let client = DashboardClient::new(session_id, outbound);
    let client_ref = ClientRef::Dashboard(client.id);
    hub.do_send(RegisterDashboard { client });

    session::spawn(
        ws_session,
        msg_stream.max_frame_size(MAX_FRAME_SIZE),
        queue,
        client_ref,
        Endpoint::Dashboard { session_id },
        hub.get_ref().clone(),
        heartbeat(&req),
    );

    tracing::info!(user = %user_id, session = %session_id, "dashboard socket connected");
    Ok(response)
}

#[get("/users/{user_id}/presence")]
pub async fn get_presence(
    hub: web::Data<Addr<Hub>>,
    user_id: web::Path<Uuid>,
) -> Result<success::Success<PresenceResponse>, error::Error> {
    let user_id = user_id.into_inner();

    let online = hub.send(IsOnline { user_id }).await.map_err(|e| {
        tracing::error!(error = %e, "hub unreachable");
        error::Error::internal_server_error()
    })?;

    let status = if online { PresenceStatus::Online } else { PresenceStatus::Offline };
    Ok(success::Success::ok(Some(PresenceResponse { user_id, status })))
}

#[get("/users/online")]
pub async fn get_online_users(
    hub: web::Data<Addr<Hub>>,
) -> Result<success::Success<Vec<Uuid>>, error::Error> {
    let online = hub.send(GetOnlineUsers).await.map_err(|e| {
        tracing::error!(error = %e, "hub unreachable");
        error::Error::internal_server_error()
    })?;

    Ok(success::Success::ok(Some(online)))
}
