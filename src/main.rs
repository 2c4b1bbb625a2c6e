//! # Wedding RSVP Bot Main Entry Point
//!
//! Initializes logging, loads configuration, sets up the database, starts the
//! reminder service and health server, and runs the Telegram bot.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::dispatching::dialogue::InMemStorage;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;
use wedding_rsvp_bot::bot::handlers::{BotHandler, BotState};
use wedding_rsvp_bot::config::Config;
use wedding_rsvp_bot::database::connection::DatabaseManager;
use wedding_rsvp_bot::services::content::{EventContentProvider, StaticEventContent};
use wedding_rsvp_bot::services::delivery_tracker::DeliveryTracker;
use wedding_rsvp_bot::services::enhanced_broadcast::BroadcastCoordinator;
use wedding_rsvp_bot::services::health::HealthService;
use wedding_rsvp_bot::services::reminder::ReminderService;
use wedding_rsvp_bot::services::transport::{MessageTransport, TelegramTransport};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wedding_rsvp_bot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!("Starting Wedding RSVP Bot v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded - Database: {}, HTTP Port: {}, admins: {}",
        config.database_url, config.http_port, config.admin_user_ids.len());

    if let Err(e) = config.broadcast.validate() {
        tracing::warn!("{}", e);
    }

    info!("Initializing database connection...");
    let db_manager = DatabaseManager::new(&config.database_url).await?;
    db_manager.run_migrations().await?;
    let db_arc = Arc::new(db_manager);
    info!("Database initialized successfully");

    let bot = Bot::new(&config.telegram_bot_token);
    let transport: Arc<dyn MessageTransport> = Arc::new(TelegramTransport::new(bot.clone()));
    let content: Arc<dyn EventContentProvider> = Arc::new(StaticEventContent::from_config(&config.event));
    let tracker = DeliveryTracker::new();

    let coordinator = BroadcastCoordinator::new(
        db_arc.as_ref().clone(),
        transport.clone(),
        content.clone(),
        config.broadcast.clone(),
        tracker.clone(),
    );

    let mut reminder_service = ReminderService::new(
        db_arc.as_ref().clone(),
        transport,
        config.event.clone(),
        config.broadcast.clone(),
        tracker.clone(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create reminder service: {}", e))?;

    if let Err(e) = reminder_service.start().await {
        tracing::error!("Failed to start reminder service: {}", e);
    }

    let config = Arc::new(config);
    let handler = BotHandler::new(BotState {
        db: db_arc.as_ref().clone(),
        config: config.clone(),
        content,
        coordinator,
    });

    let health_service = HealthService::new(db_arc.clone(), tracker);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to port {}: {}", config.http_port, e))?;

    info!("Health check server starting on port {}", config.http_port);

    let bot_task = tokio::spawn(async move {
        let storage: Arc<InMemStorage<()>> = InMemStorage::new();
        Dispatcher::builder(bot, handler.schema())
            .dependencies(dptree::deps![storage])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    });

    let health_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_service.router).await {
            tracing::error!("Health server error: {}", e);
        }
    });

    tokio::select! {
        result = bot_task => {
            if let Err(e) = result {
                tracing::error!("Bot task error: {}", e);
            }
        }
        result = health_task => {
            if let Err(e) = result {
                tracing::error!("Health task error: {}", e);
            }
        }
    }

    if let Err(e) = reminder_service.stop().await {
        tracing::warn!("Error stopping reminder service: {}", e);
    }

    info!("Application stopped");
    Ok(())
}
