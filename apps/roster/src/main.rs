use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roster::config::Config;
use roster::directory::esi::EsiClient;
use roster::models::permission::SERVER_ADMINS;
use roster::models::RoleKind;
use roster::platform::discord::DiscordClient;
use roster::queue::messages::{MEMBERS_TOPIC, ROLES_TOPIC};
use roster::queue::RedisQueue;
use roster::store::postgres::PgStore;
use roster::store::Store;
use roster::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run(Config::from_env()).await {
        tracing::error!(%err, "roster exited");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> roster::error::Result<()> {
    let port = config.port;

    let pool = roster::db::pool::connect(&config.database_url)?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let queue = RedisQueue::connect(&config.redis_url, &config.queue_prefix).await?;
    for topic in [ROLES_TOPIC, MEMBERS_TOPIC] {
        let recovered = queue.recover(topic).await?;
        if recovered > 0 {
            tracing::warn!(topic, recovered, "requeued unsettled messages");
        }
    }

    bootstrap_permissions(store.as_ref(), &config.server_admins).await?;

    let platform = Arc::new(DiscordClient::new(&config.discord_token));
    let directory = Arc::new(EsiClient::new(&config.esi_url));

    tracing::info!(guild_id = %config.guild_id, esi_url = %config.esi_url, "roster configured");

    let state = AppState::new(config, store, platform, directory, Arc::new(queue));
    let cancel = state.cancel.clone();

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(
        state.sync.clone().run(state.config.sync_interval),
    ));
    tasks.push(tokio::spawn(state.roles.clone().run(
        state.config.reconcile_interval,
        state.reconcile_trigger.clone(),
        cancel.clone(),
    )));
    for topic in [ROLES_TOPIC, MEMBERS_TOPIC] {
        for worker in 0..state.config.actuator_workers {
            tasks.push(tokio::spawn(
                state.actuator.clone().run(topic, worker, cancel.clone()),
            ));
        }
    }

    let app = Router::new()
        .merge(roster::routes::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "roster listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| roster::error::Error::fatal(format!("failed to bind {addr}: {e}")))?;

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            shutdown.cancel();
        })
        .await
        .map_err(|e| roster::error::Error::fatal(format!("server error: {e}")))?;

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

/// Make sure the admin permissions exist and grant the configured server admins.
async fn bootstrap_permissions(store: &dyn Store, server_admins: &[String]) -> roster::error::Result<()> {
    for kind in RoleKind::ALL {
        store
            .ensure_permission(kind.admin_permission(), &format!("Manage {kind} roles"))
            .await?;
    }
    store
        .ensure_permission(SERVER_ADMINS, "Manage everything")
        .await?;

    for user_id in server_admins {
        match store.grant_permission(SERVER_ADMINS, user_id).await {
            Ok(()) => tracing::info!(user = %user_id, "granted server_admins"),
            Err(err) if err.is_noop() => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
