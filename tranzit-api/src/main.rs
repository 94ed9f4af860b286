use std::net::SocketAddr;
use std::sync::Arc;
use tranzit_api::{app, AppState};
use tranzit_core::messaging::{LogMessenger, Messenger};
use tranzit_core::repository::RecordStore;
use tranzit_dispatch::{BookingStateMachine, DispatchMetrics};
use tranzit_store::{DbClient, PgRecordStore, TelegramMessenger};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tranzit_api=debug,tranzit_dispatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = tranzit_store::app_config::Config::load()?;
    tracing::info!("Starting Tranzit dispatch API on port {}", config.server.port);

    // Database
    let db = DbClient::new(&config.database.url, config.database.max_connections).await?;
    db.migrate().await?;
    let store: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(db.pool.clone()));

    // Customer messaging
    let messenger: Arc<dyn Messenger> = match config.messaging.telegram_bot_token.clone() {
        Some(token) if !token.trim().is_empty() => Arc::new(TelegramMessenger::new(&config.messaging, token)?),
        _ => {
            tracing::warn!("No Telegram bot token configured; notifications will only be logged");
            Arc::new(LogMessenger)
        }
    };

    let machine = BookingStateMachine::new(
        store.clone(),
        messenger,
        config.dispatch.notification_timeout(),
        DispatchMetrics::new()?,
    );

    let app = app(AppState::new(machine, store));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
