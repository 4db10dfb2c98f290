//! Gateway client entry point
//!
//! Run with:
//! ```bash
//! CHATLINK_TOKEN=... cargo run -p chatlink-gateway
//! ```
//!
//! Configuration is loaded from environment variables. Dispatched events are
//! logged until Ctrl-C.

use std::sync::Arc;

use chatlink_common::{try_init_tracing, try_init_tracing_with_config, ClientConfig, TracingConfig};
use chatlink_core::Message;
use chatlink_gateway::{CacheManager, EventRouter, EventType, GatewayClient};
use chatlink_http::RestClient;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let _ = try_init_tracing();
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let tracing_config =
        TracingConfig::for_environment(config.env).with_level_name(config.log_level.as_deref());
    if let Err(e) = try_init_tracing_with_config(tracing_config) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway client stopped with an error");
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        env = ?config.env,
        intents = config.gateway.intents.bits(),
        compress = config.gateway.compress,
        "Starting chatlink gateway client..."
    );

    let rest = RestClient::from_config(&config)?;
    let cache = CacheManager::new_shared(config.cache.clone());
    let router = build_router(Arc::clone(&cache));

    let client = GatewayClient::connect_with_rest(&config, &rest, router).await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown signal received");
        }
        () = client.session().stopped() => {}
    }

    let result = client.shutdown().await;
    let stats = cache.stats();
    info!(
        guilds = stats.guilds,
        channels = stats.channels,
        users = stats.users,
        messages = stats.messages,
        "Gateway client stopped"
    );
    result?;
    Ok(())
}

fn build_router(cache: Arc<CacheManager>) -> EventRouter {
    let mut router = EventRouter::new().with_cache(Arc::clone(&cache));

    router
        .on(EventType::Ready, move |ctx| {
            let user = cache.current_user();
            info!(
                seq = ?ctx.sequence(),
                user = ?user.as_ref().map(|u| u.username.as_str()),
                "Ready"
            );
            Ok(())
        })
        .on(EventType::MessageCreate, |ctx| {
            let message: Message = ctx.decode()?;
            info!(
                channel_id = %message.channel_id,
                guild_id = ?message.guild_id,
                author = %message.author.username,
                "Message received"
            );
            Ok(())
        })
        .on_any(|ctx| {
            debug!(
                event = %ctx.event(),
                seq = ?ctx.sequence(),
                guild_id = ?ctx.guild_id(),
                channel_id = ?ctx.channel_id(),
                "Event dispatched"
            );
            Ok(())
        });

    router
}
