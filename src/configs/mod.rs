use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;

use crate::{
    api::error,
    constants::STORE_DEADLINE,
    modules::bus::{memory::MemoryBus, redis::RedisBus, Bus},
    ENV,
};

pub async fn connect_database() -> Result<PgPool, error::SystemError> {
    let database_url = &ENV.database_url;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(STORE_DEADLINE)
        .acquire_slow_threshold(std::time::Duration::from_secs(3))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Redis pub/sub when `BUS_URL` is set, otherwise an in-process bus (single
/// instance only).
pub async fn connect_bus() -> Result<Arc<dyn Bus>, error::SystemError> {
    match ENV.bus_url.as_deref() {
        Some(url) => {
            let bus = RedisBus::new(url)?;
            bus.ping().await?;
            tracing::info!("connected to redis bus");
            Ok(Arc::new(bus))
        }
        None => {
            tracing::warn!("BUS_URL not set, using the in-process bus");
            Ok(Arc::new(MemoryBus::new()))
        }
    }
}
