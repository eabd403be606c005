//! End-to-end coverage of the composition root (`Orchestrator`) wired
//! entirely with in-memory fakes: a mention comes in, a sandbox is
//! "created", a result is published on its `result:{task_id}` channel, and
//! the final answer shows up back in the chat thread.
//!
//! No real Redis, HTTP chat platform, or container platform is involved;
//! that boundary is what `orchestrator-shared::messaging::InMemoryTransport`,
//! `InMemoryChatClient`, and `InMemoryContainerPlatform` exist to stand in
//! for in tests.

use std::sync::Arc;
use std::time::Duration;

use orchestrator_chat::{ChatClient, InMemoryChatClient, ProgressNotifier, QuestionHandler};
use orchestrator_concurrency::ConcurrencyController;
use orchestrator_sandbox::SandboxManager;
use orchestrator_sandbox::platform::InMemoryContainerPlatform;
use orchestrator_server::{MentionEvent, MentionOutcome, Orchestrator};
use orchestrator_shared::domain::Task;
use orchestrator_shared::messaging::PubSubClient;
use orchestrator_task::TaskManager;

/// Republishes `message` on `channel` every 20ms until it shows up in
/// `chat`'s sent messages, up to a 2s budget. Covers the inherent race
/// between this test and the orchestrator's background result-channel
/// subscriber spinning up.
async fn wait_until_with_nudge(
    pubsub: &PubSubClient,
    channel: &str,
    message: &str,
    chat: &InMemoryChatClient,
) {
    for _ in 0..100 {
        if chat.sent_messages().iter().any(|m| m.text.contains(message)) {
            return;
        }
        pubsub.publish(channel, message).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("result was never delivered within the test's wait budget");
}

#[tokio::test]
async fn a_mention_runs_through_sandbox_execution_to_a_posted_result() {
    let pubsub = PubSubClient::in_memory();
    pubsub.connect().await.unwrap();

    let chat_fake = Arc::new(InMemoryChatClient::new());
    let chat: Arc<dyn ChatClient> = chat_fake.clone();
    let container_platform = Arc::new(InMemoryContainerPlatform::new());
    let sandbox_manager = Arc::new(SandboxManager::new(container_platform, "local"));

    let concurrency = Arc::new(ConcurrencyController::new(1));
    let question_handler = Arc::new(QuestionHandler::new(pubsub.clone(), chat.clone()));
    let task_manager = Arc::new(
        TaskManager::new(pubsub.clone())
            .with_concurrency_controller(concurrency)
            .with_question_tracker(question_handler.clone()),
    );
    let progress_notifier = Arc::new(ProgressNotifier::new(pubsub.clone(), chat.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        pubsub.clone(),
        chat.clone(),
        task_manager,
        sandbox_manager,
        progress_notifier,
        question_handler,
        "github.com",
        "assistant-runner:latest",
        None,
    ));

    let event = MentionEvent {
        channel: "C1".into(),
        thread: "1.000".into(),
        user: "U1".into(),
        text: "<@BOT> https://github.com/acme/widgets please fix the flaky test".into(),
    };

    let outcome = orchestrator.submit_mention(event, 0.0).await.unwrap();
    let task_id = match outcome {
        MentionOutcome::Started { task_id, .. } => task_id,
        _ => panic!("expected the task to start immediately, got a different outcome"),
    };

    // The orchestrator's worker races this test to subscribe to the result
    // channel, and a publish with nobody subscribed yet is simply missed
    // (the same as a real pub/sub server). Keep republishing until the
    // subscriber has caught up rather than guessing a single delay.
    let result_channel = Task::result_channel(task_id);
    wait_until_with_nudge(&pubsub, &result_channel, "all tests pass now", &chat_fake).await;

    let sent = chat_fake.sent_messages();
    assert!(sent.iter().any(|m| m.text.contains("起動中")));
}
