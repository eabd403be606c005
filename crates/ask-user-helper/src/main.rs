//! Standalone helper invoked from inside a running sandbox to ask the user
//! a question mid-task and wait for their reply.
//!
//! Usage: `ask-user-helper "<question>"`, with `TASK_ID` and `PUBSUB_URL` set
//! in the environment. Prints the answer on stdout and exits `0`; exits `1`
//! on a configuration error, `2` on timeout, `3` on a connection failure.

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use orchestrator_shared::domain::{HumanQuestion, Task};
use orchestrator_shared::messaging::PubSubClient;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_TIMEOUT: u8 = 2;
const EXIT_CONNECTION_ERROR: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let question = match env::args().nth(1) {
        Some(q) if !q.trim().is_empty() => q,
        _ => {
            eprintln!("usage: ask-user-helper <question>");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let task_id = match env::var("TASK_ID").ok().and_then(|v| Uuid::parse_str(&v).ok()) {
        Some(id) => id,
        None => {
            eprintln!("missing or malformed TASK_ID");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let pubsub_url = match env::var("PUBSUB_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            eprintln!("missing PUBSUB_URL");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let timeout_seconds = env::var("QUESTION_TIMEOUT_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(HumanQuestion::DEFAULT_TIMEOUT_SECONDS);

    let client = PubSubClient::redis(pubsub_url);
    if client.connect().await.is_err() {
        eprintln!("could not connect to pub/sub server");
        return ExitCode::from(EXIT_CONNECTION_ERROR);
    }

    match ask(&client, task_id, &question, timeout_seconds).await {
        Some(answer) => {
            println!("{answer}");
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("timed out waiting for an answer");
            ExitCode::from(EXIT_TIMEOUT)
        }
    }
}

/// Subscribes to `answer:{task_id}` before publishing on `question:{task_id}`,
/// so the reply can't arrive before anyone is listening for it.
async fn ask(client: &PubSubClient, task_id: Uuid, question: &str, timeout_seconds: u64) -> Option<String> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(1);
    let cancel = CancellationToken::new();
    let listener_cancel = cancel.clone();
    let listener_client = client.clone();
    let answer_channel = Task::answer_channel(task_id);
    let listener = tokio::spawn(async move {
        let _ = listener_client
            .subscribe(&answer_channel, listener_cancel, |message| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(message).await;
                }
            })
            .await;
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    client.publish(&Task::question_channel(task_id), question).await;

    let outcome = tokio::time::timeout(Duration::from_secs(timeout_seconds), rx.recv()).await;
    cancel.cancel();
    let _ = listener.await;

    outcome.ok().flatten()
}
