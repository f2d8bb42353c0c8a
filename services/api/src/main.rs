use anyhow::{Context, Result};
use clap::Parser;
use photobooth_api::config::Config;
use photobooth_api::{AppState, router};
use photobooth_core::catalog::PromptCatalog;
use photobooth_core::controller::DialogueController;
use photobooth_core::dispatch::{CommandQueue, FcmPublisher};
use photobooth_core::planner::ResponsePlanner;
use photobooth_core::uploads::clients::{
    DEFAULT_SOCIAL_API, HttpObjectStore, RealtimeDatabase, ShortenerClient, SocialClient,
};
use photobooth_core::uploads::{SocialPoster, UploadNotifier};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Voice assistant backend for the photobooth")]
struct Cli {
    /// Prompt catalog to load instead of PROMPTS_PATH
    #[arg(long)]
    prompts: Option<PathBuf>,
    /// Address to listen on instead of BIND_ADDRESS
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let args = Cli::parse();
    let mut config = Config::from_env().context("Failed to load application configuration")?;
    if let Some(prompts) = args.prompts {
        config.prompts_path = prompts;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!(
        flow = ?config.flow,
        "Configuration loaded successfully. Starting photobooth service..."
    );

    // --- 3. Load Prompts ---
    let catalog = PromptCatalog::load(&config.prompts_path)
        .with_context(|| format!("Failed to load prompts from {}", config.prompts_path.display()))?;
    tracing::info!("Loaded {} prompts successfully.", catalog.len());

    let controller = DialogueController::new(
        ResponsePlanner::new(catalog),
        config.photo_booth_id.clone(),
        config.flow,
    )
    .context("Prompt catalog is incomplete")?;

    // --- 4. Command Dispatch ---
    let publisher = Arc::new(FcmPublisher::new(
        config.fcm_endpoint.clone(),
        config.fcm_server_key.clone(),
        config.command_topic.clone(),
    ));
    let (commands, queue_worker) = CommandQueue::start(
        publisher,
        config.command_topic.clone(),
        config.command_journal.clone(),
    );

    // --- 5. Upload Pipeline ---
    let social = config.twitter_bearer_token.clone().map(|token| {
        Arc::new(SocialClient::new(DEFAULT_SOCIAL_API.to_string(), token)) as Arc<dyn SocialPoster>
    });
    if social.is_none() {
        tracing::warn!("TWITTER_BEARER_TOKEN not set, social posting is disabled");
    }
    let uploads = UploadNotifier::new(
        Arc::new(ShortenerClient::new(
            config.shortener_endpoint.clone(),
            config.shortener_key.clone(),
        )),
        Arc::new(RealtimeDatabase::new(
            config.database_url.clone(),
            config.database_secret.clone(),
        )),
        Arc::new(HttpObjectStore::new()),
        social,
    );

    // --- 6. Serve ---
    let state = Arc::new(AppState {
        controller,
        commands,
        uploads,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    tracing::info!("Listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The router held the last queue handle; wait for delayed commands to go out.
    tracing::info!("Server stopped, flushing pending commands...");
    queue_worker.await.context("Command queue worker panicked")?;
    tracing::info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
