use actix::Actor;
use actix_cors::Cors;
use actix_web::{self, middleware::Logger, web, App, HttpServer};
use std::sync::Arc;

use realtime_core::{
    configs::{connect_bus, connect_database},
    configure_app,
    modules::{
        conversation::{
            repository::ConversationRepository, repository_pg::ConversationPgRepository,
            service::ConversationService,
        },
        message::{
            repository::MessageRepository, repository_pg::MessageRepositoryPg,
            service::MessageService,
        },
        websocket::server::Hub,
    },
    ENV,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // also installs the `log` bridge
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let db_pool = connect_database()
        .await
        .map_err(|e| std::io::Error::other(format!("Database connection error: {e}")))?;

    let bus =
        connect_bus().await.map_err(|e| std::io::Error::other(format!("Bus connection error: {e}")))?;

    let conversation_repo: Arc<dyn ConversationRepository> =
        Arc::new(ConversationPgRepository::new(db_pool.clone()));
    let message_repo: Arc<dyn MessageRepository> = Arc::new(MessageRepositoryPg::new(db_pool));

    let hub = Hub::new(bus.clone(), conversation_repo.clone()).start();

    let conversation_service =
        ConversationService::with_dependencies(conversation_repo.clone(), bus.clone());
    let message_service = MessageService::with_dependencies(message_repo, conversation_repo, bus);

    let frontend_url = ENV.frontend_url.clone();

    tracing::info!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(hub.clone()))
            .app_data(web::Data::new(conversation_service.clone()))
            .app_data(web::Data::new(message_service.clone()))
            .configure(configure_app)
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await
}
