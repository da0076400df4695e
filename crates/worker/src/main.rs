//! Delivery worker: claims queued deliveries and pushes them through the
//! channel providers, plus the cascade scanner and scheduled-send promoter.
//!
//! Runs separately from the API so providers with slow or flaky upstreams
//! never hold an HTTP request hostage. Scale out by running more worker
//! processes; the lease-based queue keeps them from stepping on each other.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portaria_core::channel::Channel;
use portaria_engine::bus::EngineBus;
use portaria_engine::dispatcher::Dispatcher;
use portaria_engine::escalation::CascadeScanner;
use portaria_engine::scheduler::ScheduledPromoter;
use portaria_engine::sender::SenderRegistry;
use portaria_engine::senders::email::{EmailConfig, EmailSender};
use portaria_engine::senders::gateway::{GatewayConfig, GatewaySender};
use portaria_engine::senders::internal::InternalSender;

/// How many concurrent dispatcher loops to run per process.
const DEFAULT_CONCURRENCY: usize = 4;

/// How long to wait for background tasks after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portaria_worker=debug,portaria_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = portaria_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    portaria_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    // --- Channel providers ---
    let registry = Arc::new(build_registry());

    // --- Event bus ---
    let event_bus = Arc::new(EngineBus::default());

    // Log every engine event; this is the worker's only bus consumer.
    let mut events = event_bus.subscribe();
    let event_log_handle = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!(
                event_type = %event.event_type,
                condominio_id = ?event.condominio_id,
                notificacao_id = ?event.notificacao_id,
                "Engine event"
            );
        }
    });

    // --- Background loops ---
    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CONCURRENCY);
    let worker_base = std::env::var("WORKER_ID")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "portaria-worker".to_string());

    for n in 0..concurrency {
        let dispatcher = Dispatcher::new(
            pool.clone(),
            Arc::clone(&registry),
            Arc::clone(&event_bus),
            format!("{worker_base}-{n}"),
        );
        handles.push(tokio::spawn(dispatcher.run(cancel.clone())));
    }
    tracing::info!(concurrency, worker_id = %worker_base, "Dispatchers started");

    let scanner = CascadeScanner::new(pool.clone(), Arc::clone(&event_bus));
    handles.push(tokio::spawn(scanner.run(cancel.clone())));

    let promoter = ScheduledPromoter::new(pool.clone());
    handles.push(tokio::spawn(promoter.run(cancel.clone())));

    tracing::info!("Cascade scanner and scheduled-send promoter started");

    // --- Shutdown ---
    shutdown_signal().await;
    cancel.cancel();

    for handle in handles {
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, handle).await;
    }
    drop(event_bus);
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, event_log_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Build the channel provider registry from the environment.
///
/// Channels without configuration are simply not registered; the dispatcher
/// fails their deliveries with `channel_unconfigured` instead of retrying.
fn build_registry() -> SenderRegistry {
    let mut registry = SenderRegistry::new();

    // In-app and mural deliveries never leave the database.
    registry.register(Arc::new(InternalSender::new(Channel::InApp)));
    registry.register(Arc::new(InternalSender::new(Channel::Mural)));

    match EmailConfig::from_env() {
        Some(config) => match EmailSender::new(config) {
            Ok(sender) => {
                registry.register(Arc::new(sender));
                tracing::info!("Email provider registered");
            }
            Err(e) => {
                tracing::error!(error = %e, "Email provider configured but failed to initialize");
            }
        },
        None => tracing::warn!("SMTP_HOST not set; email deliveries will fail"),
    }

    let client = reqwest::Client::new();
    for channel in [Channel::Push, Channel::Whatsapp, Channel::Sms, Channel::Voz] {
        match GatewayConfig::from_env(channel) {
            Some(config) => {
                registry.register(Arc::new(GatewaySender::new(
                    channel,
                    config,
                    client.clone(),
                )));
                tracing::info!(canal = channel.as_str(), "Gateway provider registered");
            }
            None => {
                tracing::warn!(
                    canal = channel.as_str(),
                    "Gateway not configured; deliveries on this channel will fail"
                );
            }
        }
    }

    registry
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
