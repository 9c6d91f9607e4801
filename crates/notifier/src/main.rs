//! Herald notifier binary entrypoint.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_common::redis_pool::create_redis_pool;
use herald_notifier::dispatcher::Dispatcher;
use herald_notifier::processor::MessageProcessor;
use herald_notifier::queue::RedisQueue;
use herald_notifier::receiver::{FixedBackoff, ReceiveLoop};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_notifier=info,herald_common=info".into()),
        )
        .json()
        .init();

    tracing::info!("Herald notifier starting...");

    // Load configuration
    let config = AppConfig::from_env()?;
    config.log_channel_status();

    // Connect to the queue and recover anything a previous run left in flight
    let redis = create_redis_pool(&config.redis_url).await?;
    let mut queue = RedisQueue::new(redis, &config.queue_name);
    queue.requeue_in_flight().await?;

    let dispatcher = Dispatcher::from_config(&config.channels)?;
    let processor = MessageProcessor::new(dispatcher);

    let mut receiver = ReceiveLoop::new(queue, processor)
        .with_receive_timeout(Duration::from_secs(config.receive_timeout_secs))
        .with_backoff(FixedBackoff(Duration::from_millis(config.receive_backoff_ms)))
        .with_failure_policy(config.failure_policy);

    tracing::info!(queue = %config.queue_name, "Notification service started");

    // Stop between messages on Ctrl+C
    receiver
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await;

    tracing::info!("Herald notifier stopped.");
    Ok(())
}
