use actix_web::{middleware::from_fn, web};
use std::sync::LazyLock;

pub mod api;
pub mod configs;
pub mod constants;
pub mod middlewares;
pub mod modules;
pub mod test;
pub mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    log::info!("Environment variables loaded");
    constants::Env::default()
});

#[actix_web::get("/")]
async fn health_check() -> &'static str {
    "Server is running"
}

/// Every route of the service. Shared data (`Addr<Hub>`, the services) is
/// registered by the caller.
pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check).configure(modules::websocket::route::configure).service(
        web::scope("/api")
            .wrap(from_fn(middlewares::authentication))
            .configure(modules::conversation::route::configure)
            .configure(modules::message::route::configure)
            .configure(modules::websocket::route::api_configure),
    );
}
