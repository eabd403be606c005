//! The resilient Pub/Sub Client: reconnect-with-backoff, a bounded local
//! outbox for publish, and fail-fast set/get — layered over a raw
//! [`RawTransport`] that knows nothing about any of that.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::MessagingError;

use super::transport::{RawPoll, RawTransport};

const LOCAL_QUEUE_MAX_SIZE: usize = 100;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const SUBSCRIBE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

struct Buffered {
    channel: String,
    message: String,
}

struct ClientState {
    connected: AtomicBool,
    buffer: AsyncMutex<VecDeque<Buffered>>,
    reconnecting: AtomicBool,
    reconnect_handle: AsyncMutex<Option<JoinHandle<()>>>,
    transport: RawTransport,
}

/// Resilient pub/sub and keyed-store client. Cheap to clone — internally
/// `Arc`-wrapped — so every component that needs it can hold its own handle.
#[derive(Clone)]
pub struct PubSubClient {
    state: Arc<ClientState>,
}

impl std::fmt::Debug for PubSubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubClient")
            .field("connected", &self.state.connected.load(Ordering::SeqCst))
            .finish()
    }
}

impl PubSubClient {
    pub fn redis(url: impl Into<String>) -> Self {
        Self::from_transport(RawTransport::redis(url))
    }

    pub fn in_memory() -> Self {
        Self::from_transport(RawTransport::in_memory())
    }

    fn from_transport(transport: RawTransport) -> Self {
        Self {
            state: Arc::new(ClientState {
                connected: AtomicBool::new(false),
                buffer: AsyncMutex::new(VecDeque::with_capacity(LOCAL_QUEUE_MAX_SIZE)),
                reconnecting: AtomicBool::new(false),
                reconnect_handle: AsyncMutex::new(None),
                transport,
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Pings the server. On success the client is marked connected; on
    /// failure a connection fault is returned and the client stays
    /// disconnected.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<(), MessagingError> {
        self.state.transport.ping().await?;
        self.state.connected.store(true, Ordering::SeqCst);
        debug!("pub/sub client connected");
        Ok(())
    }

    /// Cancels any background reconnection work and releases the server
    /// handle.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        self.state.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = self.state.reconnect_handle.lock().await.take() {
            handle.abort();
        }
        self.state.reconnecting.store(false, Ordering::SeqCst);
    }

    /// Delivers `message` to all current subscribers of `channel`. Never
    /// fails the caller: a transport failure (or a client that is already
    /// disconnected) buffers the message and starts background reconnection.
    #[instrument(skip(self, message))]
    pub async fn publish(&self, channel: &str, message: &str) {
        if self.is_connected() {
            match self.state.transport.publish_now(channel, message).await {
                Ok(()) => return,
                Err(err) => {
                    warn!(%channel, error = %err, "publish failed, buffering and reconnecting");
                    self.state.connected.store(false, Ordering::SeqCst);
                }
            }
        }
        self.buffer_message(channel, message).await;
        self.ensure_reconnecting();
    }

    async fn buffer_message(&self, channel: &str, message: &str) {
        let mut buffer = self.state.buffer.lock().await;
        if buffer.len() >= LOCAL_QUEUE_MAX_SIZE {
            buffer.pop_front();
        }
        buffer.push_back(Buffered {
            channel: channel.to_string(),
            message: message.to_string(),
        });
    }

    fn ensure_reconnecting(&self) {
        if self
            .state
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(reconnect_loop(state));
        // `try_lock` is sufficient here: this runs right after the
        // compare-exchange above, so no other caller can be racing to read
        // the handle slot concurrently.
        if let Ok(mut slot) = self.state.reconnect_handle.try_lock() {
            *slot = Some(handle);
        }
    }

    /// Stores `value` under `key`, optionally with expiration. Requires a
    /// connected client; failure marks the client disconnected without
    /// buffering — the caller decides whether to retry.
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), MessagingError> {
        if !self.is_connected() {
            return Err(MessagingError::NotConnected);
        }
        match self.state.transport.set_now(key, value, ttl).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.state.connected.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Returns the stored value, or `None` for an absent key. Requires a
    /// connected client; failure marks the client disconnected.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Option<String>, MessagingError> {
        if !self.is_connected() {
            return Err(MessagingError::NotConnected);
        }
        match self.state.transport.get_now(key).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.state.connected.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Subscribes to `channel`, invoking `callback` with each subsequent
    /// message until `cancel` is triggered. Requires a connected client.
    /// Cleans up the subscription on every exit path, cancelled or not.
    #[instrument(skip(self, callback))]
    pub async fn subscribe<F, Fut>(
        &self,
        channel: &str,
        cancel: CancellationToken,
        mut callback: F,
    ) -> Result<(), MessagingError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = ()>,
    {
        if !self.is_connected() {
            return Err(MessagingError::NotConnected);
        }

        let mut subscription = self.state.transport.raw_subscribe(channel).await?;
        debug!(%channel, "subscribed");

        let result = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                poll = subscription.poll(SUBSCRIBE_POLL_TIMEOUT) => {
                    match poll {
                        Ok(RawPoll::Message(message)) => callback(message).await,
                        Ok(RawPoll::Timeout) => continue,
                        Err(err) => break Err(err),
                    }
                }
            }
        };

        debug!(%channel, "unsubscribed");
        result
    }
}

async fn reconnect_loop(state: Arc<ClientState>) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        tokio::time::sleep(backoff).await;

        if state.transport.ping().await.is_err() {
            backoff = (backoff * 2).min(MAX_BACKOFF);
            continue;
        }

        state.connected.store(true, Ordering::SeqCst);

        match flush_buffer(&state).await {
            Ok(()) => {
                debug!("pub/sub client reconnected and flushed buffer");
                break;
            }
            Err(()) => {
                state.connected.store(false, Ordering::SeqCst);
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        }
    }
    state.reconnecting.store(false, Ordering::SeqCst);
}

/// Flushes the buffer in insertion order. On the first publish failure, the
/// remaining items (including the one that failed) are pushed back to the
/// head of the queue in their original order, and `Err(())` is returned so
/// the caller knows to treat this as a failed reconnection attempt.
async fn flush_buffer(state: &Arc<ClientState>) -> Result<(), ()> {
    loop {
        let next = {
            let mut buffer = state.buffer.lock().await;
            buffer.pop_front()
        };
        let Some(item) = next else {
            return Ok(());
        };

        if state
            .transport
            .publish_now(&item.channel, &item.message)
            .await
            .is_err()
        {
            let mut buffer = state.buffer.lock().await;
            buffer.push_front(item);
            return Err(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn in_memory_transport(client: &PubSubClient) -> &super::super::transport::InMemoryTransport {
        match &client.state.transport {
            RawTransport::InMemory(t) => t,
            RawTransport::Redis(_) => panic!("expected in-memory transport"),
        }
    }

    #[tokio::test]
    async fn connect_marks_client_connected() {
        let client = PubSubClient::in_memory();
        assert!(!client.is_connected());
        client.connect().await.unwrap();
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn connect_fails_during_simulated_outage() {
        let client = PubSubClient::in_memory();
        in_memory_transport(&client).begin_outage();
        assert!(client.connect().await.is_err());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn set_and_get_round_trip_when_connected() {
        let client = PubSubClient::in_memory();
        client.connect().await.unwrap();
        client.set("task:1", "hello", None).await.unwrap();
        assert_eq!(client.get("task:1").await.unwrap(), Some("hello".into()));
    }

    #[tokio::test]
    async fn get_returns_none_for_missing_key() {
        let client = PubSubClient::in_memory();
        client.connect().await.unwrap();
        assert_eq!(client.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_requires_connection() {
        let client = PubSubClient::in_memory();
        assert!(matches!(
            client.set("k", "v", None).await,
            Err(MessagingError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn publish_while_connected_delivers_immediately() {
        let client = PubSubClient::in_memory();
        client.connect().await.unwrap();

        let received = Arc::new(StdMutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let sub_client = client.clone();
        let sub_cancel = cancel.clone();
        let sub_received = Arc::clone(&received);
        let handle = tokio::spawn(async move {
            sub_client
                .subscribe("progress:1", sub_cancel, |msg| {
                    let received = Arc::clone(&sub_received);
                    async move {
                        received.lock().unwrap().push(msg);
                    }
                })
                .await
        });

        // Give the subscribe loop a moment to register before publishing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.publish("progress:1", "hello").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(*received.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn publish_while_disconnected_buffers_and_flushes_on_reconnect() {
        let client = PubSubClient::in_memory();
        client.connect().await.unwrap();
        in_memory_transport(&client).begin_outage();

        client.publish("progress:1", "one").await;
        client.publish("progress:1", "two").await;
        assert!(!client.is_connected());

        let received = Arc::new(StdMutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let sub_client = client.clone();
        let sub_cancel = cancel.clone();
        let sub_received = Arc::clone(&received);

        // Subscribing requires a connected client in the real protocol, but
        // here we need the receiver registered before the flush happens;
        // register it on the underlying transport directly to observe the
        // flushed messages regardless of the client's connected flag.
        let raw = match &client.state.transport {
            RawTransport::InMemory(t) => t,
            RawTransport::Redis(_) => unreachable!(),
        };
        let _ = raw; // channel creation happens lazily on first subscribe/publish

        tokio::spawn(async move {
            loop {
                if sub_client.is_connected() {
                    let _ = sub_client
                        .subscribe("progress:1", sub_cancel.clone(), |msg| {
                            let received = Arc::clone(&sub_received);
                            async move {
                                received.lock().unwrap().push(msg);
                            }
                        })
                        .await;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        in_memory_transport(&client).end_outage();
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        cancel.cancel();

        assert!(client.is_connected());
        assert_eq!(
            *received.lock().unwrap(),
            vec!["one".to_string(), "two".to_string()]
        );
    }

    #[tokio::test]
    async fn buffer_discards_oldest_beyond_capacity() {
        let client = PubSubClient::in_memory();
        client.connect().await.unwrap();
        for i in 0..(LOCAL_QUEUE_MAX_SIZE + 10) {
            client.buffer_message("progress:1", &i.to_string()).await;
        }
        let buffer = client.state.buffer.lock().await;
        assert_eq!(buffer.len(), LOCAL_QUEUE_MAX_SIZE);
        assert_eq!(buffer.front().unwrap().message, "10");
        assert_eq!(buffer.back().unwrap().message, "109");
    }

    #[tokio::test]
    async fn subscribe_requires_connection() {
        let client = PubSubClient::in_memory();
        let cancel = CancellationToken::new();
        let result = client
            .subscribe("progress:1", cancel, |_| async {})
            .await;
        assert!(matches!(result, Err(MessagingError::NotConnected)));
    }

    #[tokio::test]
    async fn subscribe_stops_on_cancellation() {
        let client = PubSubClient::in_memory();
        client.connect().await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = client
            .subscribe("progress:1", cancel, |_| async {})
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn disconnect_aborts_background_reconnection() {
        let client = PubSubClient::in_memory();
        client.connect().await.unwrap();
        in_memory_transport(&client).begin_outage();
        client.publish("progress:1", "one").await;
        assert!(!client.is_connected());

        client.disconnect().await;
        assert!(!client.is_connected());
        assert!(!client.state.reconnecting.load(Ordering::SeqCst));
    }
}
