//! Low-level transports the resilient [`super::client::PubSubClient`] is
//! built over: a real Redis-backed transport, and an in-process fake used
//! by tests. Neither transport retries, buffers, or backs off — that is
//! entirely the client's job. A transport only ever does the one raw
//! operation it's asked for.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::error::MessagingError;

/// One message received off a raw subscription, or a timed-out poll (used to
/// make cancellation responsive without indicating any failure).
pub(crate) enum RawPoll {
    Message(String),
    Timeout,
}

pub(crate) enum RawTransport {
    Redis(RedisTransport),
    InMemory(InMemoryTransport),
}

impl RawTransport {
    pub(crate) fn redis(url: impl Into<String>) -> Self {
        RawTransport::Redis(RedisTransport::new(url.into()))
    }

    pub(crate) fn in_memory() -> Self {
        RawTransport::InMemory(InMemoryTransport::new())
    }

    pub(crate) async fn ping(&self) -> Result<(), MessagingError> {
        match self {
            RawTransport::Redis(t) => t.ping().await,
            RawTransport::InMemory(t) => t.ping(),
        }
    }

    pub(crate) async fn publish_now(
        &self,
        channel: &str,
        message: &str,
    ) -> Result<(), MessagingError> {
        match self {
            RawTransport::Redis(t) => t.publish_now(channel, message).await,
            RawTransport::InMemory(t) => t.publish_now(channel, message),
        }
    }

    pub(crate) async fn set_now(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), MessagingError> {
        match self {
            RawTransport::Redis(t) => t.set_now(key, value, ttl).await,
            RawTransport::InMemory(t) => t.set_now(key, value, ttl),
        }
    }

    pub(crate) async fn get_now(&self, key: &str) -> Result<Option<String>, MessagingError> {
        match self {
            RawTransport::Redis(t) => t.get_now(key).await,
            RawTransport::InMemory(t) => t.get_now(key),
        }
    }

    pub(crate) async fn raw_subscribe(
        &self,
        channel: &str,
    ) -> Result<RawSubscription, MessagingError> {
        match self {
            RawTransport::Redis(t) => t.raw_subscribe(channel).await,
            RawTransport::InMemory(t) => t.raw_subscribe(channel),
        }
    }
}

pub(crate) enum RawSubscription {
    Redis(RedisSubscription),
    InMemory(broadcast::Receiver<String>),
}

impl RawSubscription {
    /// Waits for the next message, up to `poll_timeout`. A timeout is not an
    /// error — it exists purely so the caller's cancellation check runs
    /// regularly.
    pub(crate) async fn poll(&mut self, poll_timeout: Duration) -> Result<RawPoll, MessagingError> {
        match self {
            RawSubscription::Redis(sub) => sub.poll(poll_timeout).await,
            RawSubscription::InMemory(rx) => match tokio::time::timeout(poll_timeout, rx.recv()).await
            {
                Ok(Ok(message)) => Ok(RawPoll::Message(message)),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => Ok(RawPoll::Timeout),
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    Err(MessagingError::ConnectionFailed(
                        "in-memory subscription channel closed".into(),
                    ))
                }
                Err(_) => Ok(RawPoll::Timeout),
            },
        }
    }
}

/// Real transport speaking to an external Redis-compatible pub/sub and
/// key-value server.
pub(crate) struct RedisTransport {
    client: redis::Client,
}

impl RedisTransport {
    fn new(url: String) -> Self {
        // Client construction is infallible (it only parses the URL lazily
        // on first connection attempt); genuine connection failures surface
        // from `ping`, `publish_now`, etc.
        let client = redis::Client::open(url.as_str())
            .unwrap_or_else(|_| redis::Client::open("redis://invalid").expect("static fallback URL parses"));
        Self { client }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, MessagingError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| MessagingError::ConnectionFailed(e.to_string()))
    }

    async fn ping(&self) -> Result<(), MessagingError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| MessagingError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }

    async fn publish_now(&self, channel: &str, message: &str) -> Result<(), MessagingError> {
        let mut conn = self.connection().await?;
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| MessagingError::PublishFailed {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn set_now(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), MessagingError> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs());
        }
        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(|e| MessagingError::StoreFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn get_now(&self, key: &str) -> Result<Option<String>, MessagingError> {
        let mut conn = self.connection().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| MessagingError::StoreFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn raw_subscribe(&self, channel: &str) -> Result<RawSubscription, MessagingError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| MessagingError::ConnectionFailed(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| MessagingError::ConnectionFailed(e.to_string()))?;
        Ok(RawSubscription::Redis(RedisSubscription {
            channel: channel.to_string(),
            pubsub,
        }))
    }
}

pub(crate) struct RedisSubscription {
    channel: String,
    pubsub: redis::aio::PubSub,
}

impl RedisSubscription {
    async fn poll(&mut self, poll_timeout: Duration) -> Result<RawPoll, MessagingError> {
        use futures_util::StreamExt;

        // `on_message` borrows `self.pubsub` fresh each call; the stream
        // itself never needs to outlive a single poll, so no borrow-checker
        // trouble comes from not storing it as a field.
        let mut stream = self.pubsub.on_message();
        match tokio::time::timeout(poll_timeout, stream.next()).await {
            Ok(Some(msg)) => {
                let payload: String = msg
                    .get_payload()
                    .map_err(|_| MessagingError::InvalidEncoding)?;
                Ok(RawPoll::Message(payload))
            }
            Ok(None) => Err(MessagingError::ConnectionFailed(format!(
                "subscription stream for '{}' ended",
                self.channel
            ))),
            Err(_) => Ok(RawPoll::Timeout),
        }
    }
}

/// In-process fake transport used by tests. Carries its own simulated
/// outage flag so scenario tests can exercise reconnect/backoff/buffering
/// without any network dependency.
pub(crate) struct InMemoryTransport {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    store: Mutex<HashMap<String, (String, Option<Instant>)>>,
    outage: AtomicBool,
}

impl InMemoryTransport {
    fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            store: Mutex::new(HashMap::new()),
            outage: AtomicBool::new(false),
        }
    }

    /// Test hook: makes every subsequent raw operation fail until
    /// [`Self::end_outage`] is called.
    pub fn begin_outage(&self) {
        self.outage.store(true, Ordering::SeqCst);
    }

    pub fn end_outage(&self) {
        self.outage.store(false, Ordering::SeqCst);
    }

    fn check_outage(&self) -> Result<(), MessagingError> {
        if self.outage.load(Ordering::SeqCst) {
            Err(MessagingError::ConnectionFailed("simulated outage".into()))
        } else {
            Ok(())
        }
    }

    fn ping(&self) -> Result<(), MessagingError> {
        self.check_outage()
    }

    fn publish_now(&self, channel: &str, message: &str) -> Result<(), MessagingError> {
        self.check_outage().map_err(|_| MessagingError::PublishFailed {
            channel: channel.to_string(),
            reason: "simulated outage".into(),
        })?;
        let mut channels = self.channels.lock().expect("channels mutex poisoned");
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(1024).0);
        // No active receiver is not a publish failure; it simply means no
        // one is listening right now, same as a real pub/sub server.
        let _ = sender.send(message.to_string());
        Ok(())
    }

    fn set_now(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), MessagingError> {
        self.check_outage().map_err(|_| MessagingError::StoreFailed {
            key: key.to_string(),
            reason: "simulated outage".into(),
        })?;
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.store
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    fn get_now(&self, key: &str) -> Result<Option<String>, MessagingError> {
        self.check_outage().map_err(|_| MessagingError::StoreFailed {
            key: key.to_string(),
            reason: "simulated outage".into(),
        })?;
        let mut store = self.store.lock().expect("store mutex poisoned");
        match store.get(key) {
            Some((_, Some(expires_at))) if Instant::now() >= *expires_at => {
                store.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    fn raw_subscribe(&self, channel: &str) -> Result<RawSubscription, MessagingError> {
        self.check_outage()?;
        let mut channels = self.channels.lock().expect("channels mutex poisoned");
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(1024).0);
        Ok(RawSubscription::InMemory(sender.subscribe()))
    }
}
