use redis::Client;
use redis::aio::ConnectionManager;

use crate::error::AppResult;

/// Connect to the queue server and check that it answers.
///
/// The returned manager reconnects on its own after a dropped connection, so a
/// single one is held for the life of the worker.
pub async fn create_redis_pool(redis_url: &str) -> AppResult<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let info = client.get_connection_info();
    let db = info.redis.db;
    let addr = info.addr.to_string();

    let mut manager = ConnectionManager::new(client).await?;
    let _: String = redis::cmd("PING").query_async(&mut manager).await?;

    tracing::info!(%addr, db, "Connected to Redis");
    Ok(manager)
}
