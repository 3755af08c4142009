use std::sync::Arc;

use tracing::{error, info, warn};

use devrant_bot::bot::{Router, SessionRegistry, SlackClient, SocketSession, Started};
use devrant_bot::config::Config;
use devrant_bot::devrant::Client as DevRantClient;
use devrant_bot::logging;
use devrant_bot::report::TracingReporter;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let _guard = match logging::init(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to open log file {}: {e}", config.log_file.display());
            std::process::exit(1);
        }
    };

    info!("🚀 Starting devrant-bot...");
    info!("devRant API: {} (timeout {:?})", config.devrant_api_url, config.devrant_timeout);

    let Some(credentials) = config.slack.clone() else {
        // Only reachable in the test environment.
        warn!("No Slack credentials in {:?} environment, not connecting", config.environment);
        return;
    };

    let devrant = match DevRantClient::new(config.devrant_api_url.clone(), config.devrant_timeout) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create devRant client: {e}");
            std::process::exit(1);
        }
    };

    let slack = match SlackClient::new(config.slack_api_url.clone(), credentials.bot_token.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create Slack client: {e}");
            std::process::exit(1);
        }
    };

    let router = Arc::new(Router::new(devrant, slack.clone(), Arc::new(TracingReporter)));
    let registry = Arc::new(SessionRegistry::new());

    let session = SocketSession::new(credentials.app_token.clone(), slack, router, registry)
        .with_installer(config.installer_user.clone());

    let shutdown = session.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = shutdown.send(());
        }
    });

    match session.run().await {
        Ok(Started::Finished) => info!("Session ended"),
        Ok(Started::AlreadyRunning) => warn!("Session was already running"),
        Err(e) => {
            error!("Session failed: {e}");
            std::process::exit(1);
        }
    }
}
