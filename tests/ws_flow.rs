use std::sync::{Arc, Once};
use std::time::Duration;

use actix::{Actor, Addr};
use actix_web::{test as actix_test, web, App, HttpServer};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use realtime_core::{
    configure_app,
    modules::{
        bus::memory::MemoryBus,
        conversation::{schema::ConversationType, service::ConversationService},
        domain_events::{emitter::DomainEventEmitter, model::CheckinUpdate},
        message::service::MessageService,
        websocket::{events::GetStats, server::Hub, session::Heartbeat},
    },
    test::{capture, next_message, MemoryStore},
    utils::Claims,
};

const SECRET: &str = "integration-secret";

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

static ENV_INIT: Once = Once::new();

fn init_env() {
    ENV_INIT.call_once(|| {
        std::env::set_var("SECRET_KEY", SECRET);
        std::env::set_var("DATABASE_URL", "postgres://unused");
    });
}

fn token(user_id: &Uuid) -> String {
    Claims::new(user_id, 3600).encode(SECRET.as_bytes()).unwrap()
}

#[derive(Clone)]
struct Harness {
    store: Arc<MemoryStore>,
    bus: Arc<MemoryBus>,
    hub: Addr<Hub>,
    conversations: ConversationService,
    messages: MessageService,
}

fn harness() -> Harness {
    init_env();
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    let hub = Hub::new(bus.clone(), store.clone()).start();
    let conversations = ConversationService::with_dependencies(store.clone(), bus.clone());
    let messages = MessageService::with_dependencies(store.clone(), store.clone(), bus.clone());
    Harness { store, bus, hub, conversations, messages }
}

/// Starts the server on an ephemeral port and returns its address.
fn serve(h: &Harness) -> std::net::SocketAddr {
    serve_with(h, Heartbeat::default())
}

fn serve_with(h: &Harness, heartbeat: Heartbeat) -> std::net::SocketAddr {
    let state = h.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(heartbeat))
            .app_data(web::Data::new(state.hub.clone()))
            .app_data(web::Data::new(state.conversations.clone()))
            .app_data(web::Data::new(state.messages.clone()))
            .configure(configure_app)
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    addr
}

async fn open(addr: std::net::SocketAddr, path: &str, user_id: &Uuid) -> Socket {
    let url = format!("ws://{addr}{path}?token={}", token(user_id));
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

/// Next JSON text frame matching `pred`, skipping the rest.
async fn next_json_where<F>(socket: &mut Socket, pred: F) -> serde_json::Value
where
    F: Fn(&serde_json::Value) -> bool,
{
    let wait = async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                    if pred(&value) {
                        return value;
                    }
                }
                Some(Ok(_)) => {}
                other => panic!("socket ended: {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(3), wait).await.expect("no matching frame")
}

async fn wait_for_clients(hub: &Addr<Hub>, chat: usize, dashboards: usize) {
    for _ in 0..50 {
        let stats = hub.send(GetStats).await.unwrap();
        if stats.chat_clients == chat && stats.dashboard_clients == dashboards {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("hub never reached {chat} chat / {dashboards} dashboard clients");
}

#[actix_web::test]
async fn test_direct_chat_round_trip() {
    let h = harness();
    let addr = serve(&h);
    let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());
    let conversation = h
        .conversations
        .create_conversation(ConversationType::Direct, alice, vec![bob])
        .await
        .unwrap();

    let mut a = open(addr, "/ws", &alice).await;
    let mut b = open(addr, "/ws", &bob).await;
    wait_for_clients(&h.hub, 2, 0).await;

    let frame = serde_json::json!({"conversation_id": conversation.id, "content": "hi"});
    a.send(Message::text(frame.to_string())).await.unwrap();

    let received = next_json_where(&mut b, |v| v.get("content").is_some()).await;
    assert_eq!(received["content"], "hi");
    assert_eq!(received["sender_id"], alice.to_string());

    let bob_state = h.store.participant(&conversation.id, &bob).await.unwrap();
    let alice_state = h.store.participant(&conversation.id, &alice).await.unwrap();
    assert_eq!(bob_state.unread_count, 1);
    assert_eq!(alice_state.unread_count, 0);

    h.conversations.mark_as_read(conversation.id, bob).await.unwrap();

    let read = next_json_where(&mut a, |v| v.get("read_at").is_some()).await;
    assert_eq!(read["conversation_id"], conversation.id.to_string());
    assert_eq!(read["user_id"], bob.to_string());
    assert_eq!(h.store.participant(&conversation.id, &bob).await.unwrap().unread_count, 0);
}

#[actix_web::test]
async fn test_presence_reaches_other_clients() {
    let h = harness();
    let addr = serve(&h);
    let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());

    let mut a = open(addr, "/ws", &alice).await;
    wait_for_clients(&h.hub, 1, 0).await;

    let b = open(addr, "/ws", &bob).await;
    let online = next_json_where(&mut a, |v| v["user_id"] == bob.to_string()).await;
    assert_eq!(online["status"], "online");

    drop(b);
    let offline = next_json_where(&mut a, |v| {
        v["user_id"] == bob.to_string() && v["status"] == "offline"
    })
    .await;
    assert!(offline.get("timestamp").is_some());
}

#[actix_web::test]
async fn test_oversized_frame_closes_socket() {
    let h = harness();
    let addr = serve(&h);
    let user = Uuid::now_v7();

    let mut socket = open(addr, "/ws", &user).await;
    wait_for_clients(&h.hub, 1, 0).await;

    socket.send(Message::text("x".repeat(600))).await.unwrap();

    let ended = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "socket stayed open");

    wait_for_clients(&h.hub, 0, 0).await;
}

#[actix_web::test]
async fn test_silent_peer_is_dropped_after_read_deadline() {
    let h = harness();
    let addr = serve_with(&h, Heartbeat {
        ping_period: Duration::from_secs(30),
        pong_wait: Duration::from_millis(300),
    });
    let user = Uuid::now_v7();
    let (_sub, mut statuses) = capture(h.bus.as_ref(), &format!("user.status.{user}")).unwrap();

    // never read from or written to
    let _silent = open(addr, "/ws", &user).await;

    let online = next_message(&mut statuses).await.expect("no online event");
    let online: serde_json::Value = serde_json::from_slice(&online.payload).unwrap();
    assert_eq!(online["status"], "online");

    let offline = next_message(&mut statuses).await.expect("no offline event");
    let offline: serde_json::Value = serde_json::from_slice(&offline.payload).unwrap();
    assert_eq!(offline["status"], "offline");
    assert_eq!(offline["user_id"], user.to_string());

    wait_for_clients(&h.hub, 0, 0).await;
}

#[actix_web::test]
async fn test_dashboard_receives_checkin_updates() {
    let h = harness();
    let addr = serve(&h);
    let session_id = Uuid::now_v7();

    let mut dashboard = open(addr, &format!("/ws/dashboard/{session_id}"), &Uuid::now_v7()).await;
    wait_for_clients(&h.hub, 0, 1).await;

    DomainEventEmitter::new(h.bus.clone())
        .checkin_update(&CheckinUpdate {
            session_id,
            user_id: Some(Uuid::now_v7()),
            user_name: "Ada".into(),
            profile_url: String::new(),
            success: true,
            message: "Checked in".into(),
            checkin_time: chrono::Utc::now(),
        })
        .await;

    let update = next_json_where(&mut dashboard, |v| v.get("success").is_some()).await;
    assert_eq!(update["user_name"], "Ada");
    assert_eq!(update["session_id"], session_id.to_string());
}

#[actix_web::test]
async fn test_socket_requires_token() {
    let h = harness();
    let addr = serve(&h);

    assert!(connect_async(format!("ws://{addr}/ws")).await.is_err());
    assert!(connect_async(format!("ws://{addr}/ws?token=garbage")).await.is_err());
}

#[actix_web::test]
async fn test_rest_send_and_unread_count() {
    let h = harness();
    let app = actix_test::init_service(
        App::new()
            .app_data(web::Data::new(h.hub.clone()))
            .app_data(web::Data::new(h.conversations.clone()))
            .app_data(web::Data::new(h.messages.clone()))
            .configure(configure_app),
    )
    .await;
    let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());
    let bearer = |user: &Uuid| ("Authorization", format!("Bearer {}", token(user)));

    let req = actix_test::TestRequest::post()
        .uri("/api/conversations")
        .insert_header(bearer(&alice))
        .set_json(serde_json::json!({"type": "direct", "participant_ids": [bob]}))
        .to_request();
    let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
    let conversation_id = body["data"]["id"].as_str().unwrap().to_string();

    let req = actix_test::TestRequest::post()
        .uri(&format!("/api/conversations/{conversation_id}/messages"))
        .insert_header(bearer(&alice))
        .set_json(serde_json::json!({"content": "hello"}))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::CREATED);

    let req = actix_test::TestRequest::get()
        .uri("/api/conversations/unread-count")
        .insert_header(bearer(&bob))
        .to_request();
    let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["unread_count"], 1);

    let req = actix_test::TestRequest::get()
        .uri(&format!("/api/conversations/{conversation_id}/messages"))
        .insert_header(bearer(&Uuid::now_v7()))
        .to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::FORBIDDEN);

    let req = actix_test::TestRequest::get()
        .uri("/api/users/online")
        .insert_header(bearer(&alice))
        .to_request();
    let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"], serde_json::json!([]));

    let req = actix_test::TestRequest::get().uri("/api/conversations").to_request();
    let resp = actix_test::call_service(&app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
}
