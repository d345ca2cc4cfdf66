//! Tessera API server binary.
//!
//! Prints `{"addr": "..."}` to stdout once the listener is bound so a
//! supervising process can discover the port.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tessera_api::AppState;
use tessera_api::config::ApiConfig;
use tessera_core::auth::{AuthError, normalize_email};
use tessera_core::models::auth::AdminRole;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments. Anything not given here comes from `ApiConfig::from_env`.
#[derive(Parser, Debug)]
#[command(name = "tessera_server", about = "Tessera API server")]
struct Args {
    /// Address to listen on; overrides `BIND_ADDR`.
    #[arg(long)]
    bind: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    /// Create this super admin at startup if no admin has the email yet.
    #[arg(long, env = "SEED_ADMIN_EMAIL")]
    seed_admin_email: Option<String>,

    #[arg(long, env = "SEED_ADMIN_PASSWORD", hide_env_values = true)]
    seed_admin_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Write logs to stderr so stdout is reserved for the JSON address line.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tessera_api=debug,tessera_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = args.database_url {
        config.pg_connection_url = url;
    }
    info!(config = ?config, "starting tessera_server");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    tessera_api::migrate(&pool).await?;

    let state = AppState::postgres(config.clone(), pool);

    if let (Some(email), Some(password)) = (&args.seed_admin_email, &args.seed_admin_password) {
        seed_super_admin(&state, email, password).await?;
    }

    let shutdown = CancellationToken::new();
    let purge = tokio::spawn(purge_loop(
        state.clone(),
        Duration::from_secs(config.ledger_purge_interval_secs.max(1)),
        shutdown.clone(),
    ));

    let app = tessera_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    println!("{}", serde_json::json!({ "addr": local_addr.to_string() }));
    info!(addr = %local_addr, "REST API listening");

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("interrupt received, shutting down"),
                _ = shutdown.cancelled() => {}
            }
        }
    })
    .await;

    shutdown.cancel();
    let _ = purge.await;

    result?;
    Ok(())
}

async fn seed_super_admin(state: &AppState, email: &str, password: &str) -> Result<(), AuthError> {
    let existing = state
        .auth
        .credentials()
        .find_admin_by_email(&normalize_email(email))
        .await?;
    if existing.is_some() {
        info!(email = %normalize_email(email), "seed admin already present");
        return Ok(());
    }
    let admin = state
        .auth
        .create_admin(email, password, AdminRole::SuperAdmin)
        .await?;
    info!(admin_id = %admin.id, email = %admin.email, "seeded super admin");
    Ok(())
}

/// Drop dead ledger rows and idle throttle windows until shutdown.
async fn purge_loop(state: AppState, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match state.auth.ledger().purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "purged expired ledger entries"),
                    Err(e) => warn!(error = %e, "ledger purge failed"),
                }
                state.auth.throttle().prune();
            }
        }
    }
}
