//! Orchestrator server binary.
//!
//! Builds the composition root from environment configuration and keeps it
//! alive until a shutdown signal arrives. The chat platform's transport
//! (receiving mention/slash-command events and delivering them to
//! [`Orchestrator::submit_mention`]/[`submit_slash_command`]) is an external
//! collaborator and is wired in by whatever adapter embeds this binary's
//! library crate; this entry point only proves the root constructs and
//! shuts down cleanly.

use std::sync::Arc;

use orchestrator_chat::{ChatClient, HttpChatClient, ProgressNotifier, QuestionHandler, QuestionHandlerConfig};
use orchestrator_sandbox::{HttpContainerPlatform, SandboxManager};
use orchestrator_shared::logging;
use orchestrator_shared::messaging::PubSubClient;
use orchestrator_shared::OrchestratorConfig;
use orchestrator_concurrency::ConcurrencyController;
use orchestrator_server::Orchestrator;
use orchestrator_task::TaskManager;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();

    info!("starting orchestrator server");
    info!(version = env!("CARGO_PKG_VERSION"));

    let config = OrchestratorConfig::load()?;

    let pubsub = PubSubClient::redis(config.pubsub_url.clone());
    pubsub.connect().await?;

    let chat: Arc<dyn ChatClient> = Arc::new(HttpChatClient::new(
        config.chat_api_base_url.clone(),
        config.chat_bot_token.clone(),
    ));

    let container_platform = Arc::new(HttpContainerPlatform::new(
        config.container_platform_base_url.clone(),
        config.container_subscription_id.clone(),
        config.container_resource_group.clone(),
        config.container_location.clone(),
    ));
    let sandbox_manager = Arc::new(SandboxManager::new(container_platform, config.container_location.clone()));

    let concurrency = Arc::new(ConcurrencyController::new(config.max_concurrent_tasks));
    let question_handler = Arc::new(QuestionHandler::with_config(
        pubsub.clone(),
        chat.clone(),
        QuestionHandlerConfig {
            timeout_seconds: config.question_timeout_seconds,
        },
    ));
    let task_manager = Arc::new(
        TaskManager::new(pubsub.clone())
            .with_concurrency_controller(concurrency)
            .with_question_tracker(question_handler.clone()),
    );
    let progress_notifier = Arc::new(ProgressNotifier::new(pubsub.clone(), chat.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        pubsub.clone(),
        chat,
        task_manager,
        sandbox_manager,
        progress_notifier,
        question_handler,
        config.repository_host.clone(),
        config.sandbox_image.clone(),
        config.repository_credential_token.clone(),
    ));
    // Held alive for the process lifetime; a transport adapter would clone
    // this handle to call submit_mention/submit_slash_command as events
    // arrive from the chat platform.
    let _orchestrator = orchestrator;

    info!("orchestrator server started, press Ctrl+C to shut down");
    shutdown_signal().await;

    info!("shutdown signal received");
    pubsub.disconnect().await;
    info!("orchestrator server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
