use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use shop_assist::calendar::{CalendarBackend, GoogleCalendar, UnconfiguredCalendar};
use shop_assist::channels::build_messenger;
use shop_assist::config::{AppConfig, MessagingProvider};
use shop_assist::dialogue::{ConversationEngine, DialogueRouter, SlotGenerator};
use shop_assist::session::{InMemorySessionStore, SessionStore, spawn_expiry_task};
use shop_assist::store::{Database, LibSqlBackend};
use shop_assist::webhook::{AppState, webhook_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    // Initialize tracing; the guard flushes the file writer on exit.
    let (file_writer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "shop-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
        .init();

    eprintln!("🛍️  Shop Assist v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Calendar ─────────────────────────────────────────────────────────
    let calendar: Arc<dyn CalendarBackend> = match &config.calendar {
        Some(cal) => Arc::new(GoogleCalendar::new(cal)),
        None => Arc::new(UnconfiguredCalendar),
    };
    eprintln!("   Calendar: {}", calendar.name());

    // ── Messaging ────────────────────────────────────────────────────────
    let messenger = build_messenger(&config.messaging);
    eprintln!("   Messaging: {}", config.messaging.name());
    let verify_token = match &config.messaging {
        MessagingProvider::CloudApi { verify_token, .. } => Some(verify_token.clone()),
        _ => None,
    };

    // ── Sessions ─────────────────────────────────────────────────────────
    let sessions: Arc<dyn SessionStore> = InMemorySessionStore::new();
    let _expiry_handle = spawn_expiry_task(
        Arc::clone(&sessions),
        config.session_idle_timeout,
        config.session_sweep_interval,
    );
    eprintln!(
        "   Sessions: idle timeout {}s",
        config.session_idle_timeout.as_secs()
    );

    // ── Dialogue ─────────────────────────────────────────────────────────
    let router = DialogueRouter::new(
        db,
        calendar,
        SlotGenerator::new(&config.scheduling),
        config.scheduling.summary_prefix.clone(),
    );
    let engine = Arc::new(ConversationEngine::new(sessions, router, messenger));

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = webhook_routes(AppState {
        engine,
        verify_token,
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", config.port);
    tracing::info!(port = config.port, "Webhook server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}
