//! EventHub Platform Server
//!
//! Serves the REST API under `/api`, the `/ws` live channel and the
//! operational endpoints.
//!
//! ## Configuration
//!
//! Read from the TOML file named by `EH_CONFIG` (optional), then overridden
//! by `EH_*` environment variables. The most common ones:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `EH_API_PORT` | `5000` | HTTP port |
//! | `EH_MONGO_URL` | `mongodb://localhost:27017` | MongoDB connection URL |
//! | `EH_MONGO_DB` | `eventhub` | MongoDB database name |
//! | `EH_USE_MEMORY_STORE` | `false` | Keep all data in process memory |
//! | `EH_JWT_SECRET` | - | HS256 signing secret (required outside dev mode) |
//! | `EH_DEV_MODE` | `false` | Development fallbacks and error details |
//! | `EH_EMAIL_ENABLED` | `false` | Send mail over SMTP instead of logging it |
//! | `RUST_LOG` | `info` | Log level |

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use eh_config::AppConfig;
use eh_platform::api::{create_router, PageLimits};
use eh_platform::error::expose_internal_details;
use eh_platform::repository::{mongo::ensure_indexes, Repositories};
use eh_platform::service::{
    AccountSettings, AuthConfig, LogMailer, Mailer, PlatformServices, PlatformSettings,
    RealtimeHub, SmtpMailer, SmtpSettings,
};

fn init_tracing(json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(config.server.log_json);

    info!("Starting EventHub Platform Server");
    expose_internal_details(config.server.dev_mode);

    let repos = if config.mongo.use_memory_store {
        warn!("Using the in-memory store; data is lost on restart");
        Repositories::in_memory()
    } else {
        info!("Connecting to MongoDB: {}/{}", config.mongo.url, config.mongo.database);
        let client = mongodb::Client::with_uri_str(&config.mongo.url).await?;
        let db = client.database(&config.mongo.database);
        ensure_indexes(&db).await?;
        Repositories::mongo(&db)
    };

    let mailer: Arc<dyn Mailer> = if config.email.enabled {
        info!(host = %config.email.host, port = config.email.port, "SMTP delivery enabled");
        Arc::new(SmtpMailer::new(&SmtpSettings {
            host: config.email.host.clone(),
            port: config.email.port,
            secure: config.email.secure,
            username: config.email.username.clone(),
            password: config.email.password.clone(),
            from: config.email.from.clone(),
        })?)
    } else {
        info!("Email delivery disabled, messages will be logged");
        Arc::new(LogMailer)
    };

    let settings = PlatformSettings {
        auth: AuthConfig {
            secret_key: config.auth.jwt_secret.clone(),
            issuer: config.auth.jwt_issuer.clone(),
            access_token_expiry_secs: config.auth.token_expiry_secs,
        },
        accounts: AccountSettings {
            client_url: config.auth.client_url.clone(),
            reset_token_ttl_secs: config.auth.reset_token_ttl_secs,
        },
        require_moderation: config.events.require_moderation,
    };

    let hub = Arc::new(RealtimeHub::new());
    let services = PlatformServices::build(&repos, hub, mailer, settings)?;

    if let Some((email, username, password)) = config.admin.seed_credentials() {
        if services.accounts.seed_admin(email, username, password).await? {
            info!(email, "Seeded admin account");
        }
    }

    let limits = PageLimits {
        default_limit: config.events.default_page_size,
        max_limit: config.events.max_page_size,
    };
    let tasks = services.tasks.clone();

    let app = create_router(services, limits)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(in_flight = tasks.in_flight(), "Shutdown signal received, draining background tasks");
    let grace = Duration::from_secs(config.server.shutdown_grace_secs);
    if !tasks.drain(grace).await {
        warn!(in_flight = tasks.in_flight(), "Background tasks still running after grace period");
    }

    info!("EventHub Platform Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
