//! East Website

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use east_website::{
    api::{self, AppState},
    cache::AssetCache,
    config::{AssetKind, Config},
    db::{
        self,
        repositories::{SqlxSessionRepository, SqlxUserRepository},
    },
    endpoints::{build_asset, minify_command},
    services::user::UserService,
    templating::TemplateEngine,
};

/// Interval between two purges of expired sessions
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "east-website", version, about)]
struct Cli {
    /// Configuration file
    #[arg(long, short, env = "EAST_CONFIG", default_value = "config.yml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Build a minified asset set
    Minify {
        /// `css` or `js`
        kind: AssetKind,
        set: String,
        /// Version written in the file name, the configured default otherwise
        #[arg(long)]
        version: Option<String>,
    },
    /// Register a user; the first one becomes administrator
    CreateUser {
        email: String,
        #[arg(long, env = "EAST_USER_PASSWORD")]
        password: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "east_website=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load_with_env(&cli.config)?;
    tracing::info!("Configuration loaded from {}", cli.config.display());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Minify { kind, set, version } => {
            let recipe = minify_command(Arc::new(config.assets.clone()), AssetCache::new());
            let path = build_asset(&recipe, kind, &set, version.as_deref()).await?;
            tracing::info!("Written {}", path.display());
            Ok(())
        }
        Command::CreateUser {
            email,
            password,
            first_name,
            last_name,
        } => {
            let pool = db::create_pool(&config.database).await?;
            db::migrations::run_migrations(&pool).await?;
            let users = UserService::new(
                SqlxUserRepository::boxed(pool.clone()),
                SqlxSessionRepository::boxed(pool),
            );
            let user = users
                .register(&email, &password, &first_name, &last_name)
                .await
                .with_context(|| format!("Failed to create user {}", email))?;
            tracing::info!("User {} created (admin: {})", user.email, user.is_admin());
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting {}...", config.server.site_name);

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {}", config.database.url);

    db::ping(&pool).await?;

    // Run migrations
    let pending = db::migrations::pending_count(&pool).await?;
    if pending > 0 {
        tracing::info!("{} database migrations pending", pending);
    }
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    let engine = TemplateEngine::new(&config.templates.path)
        .context("Failed to load templates")?
        .with_global("site_name", config.server.site_name.clone())
        .with_global("base_url", config.server.base_url.clone());
    tracing::info!("Template engine initialized ({} templates)", engine.template_names().len());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, pool, Arc::new(engine));

    // Start expired session cleanup task
    {
        let users = state.user_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match users.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!("Removed {} expired sessions", removed),
                    Err(e) => tracing::warn!("Failed to remove expired sessions: {}", e),
                }
            }
        });
    }

    // Start login rate limiter cleanup task
    {
        let limiter = state.rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }

    let app = api::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
