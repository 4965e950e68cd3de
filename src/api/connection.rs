//! Push-channel connection lifecycle.
//!
//! A [`ConnectionManager`] keeps at most one live connection, scoped to the
//! signed-in user. Each connection gets a new generation number and every
//! event it delivers is tagged with it, so the consumer can drop frames that
//! a superseded connection still had in flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::api::events::IncomingEvent;
use crate::error::{ChatError, Result};

pub type EventStream = BoxStream<'static, Result<IncomingEvent>>;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a push channel for `user_id`. The stream ends when the server closes it.
    async fn open(&self, user_id: &str) -> Result<EventStream>;
}

/// WebSocket transport. Frames are JSON event objects or `[name, payload]` arrays.
pub struct WsTransport {
    url: Url,
    token: Option<String>,
}

impl WsTransport {
    pub fn new(ws_url: &str, token: Option<String>) -> Result<Self> {
        Ok(Self { url: Url::parse(ws_url)?, token })
    }

    fn url_for(&self, user_id: &str) -> Url {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("userId", user_id);
            if let Some(token) = &self.token {
                query.append_pair("token", token);
            }
        }
        url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, user_id: &str) -> Result<EventStream> {
        let url = self.url_for(user_id);
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        debug!("websocket connected to {}", self.url);
        let events = ws_stream.filter_map(|frame| async move {
            match frame {
                Ok(WsMessage::Text(text)) => Some(IncomingEvent::from_json(&text)),
                Ok(WsMessage::Binary(bytes)) => Some(serde_json::from_slice(&bytes).map_err(ChatError::from)),
                Ok(_) => None,
                Err(e) => Some(Err(ChatError::from(e))),
            }
        });
        Ok(events.boxed())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Consecutive failed attempts before giving up; 0 retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { initial_delay_ms: 500, max_delay_ms: 30_000, max_attempts: 0 }
    }
}

impl ReconnectPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: IncomingEvent,
}

struct ActiveConnection {
    user_id: String,
    generation: u64,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    events_tx: mpsc::Sender<TaggedEvent>,
    last_generation: u64,
    active: Option<ActiveConnection>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, policy: ReconnectPolicy) -> (Self, mpsc::Receiver<TaggedEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let manager = Self {
            transport,
            policy,
            events_tx,
            last_generation: 0,
            active: None,
        };
        (manager, events_rx)
    }

    pub fn current_user(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.user_id.as_str())
    }

    /// Generation of the live connection, if any.
    pub fn generation(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.generation)
    }

    pub fn is_current(&self, event: &TaggedEvent) -> bool {
        self.generation() == Some(event.generation)
    }

    /// Points the connection at `user_id`. The previous connection is fully torn
    /// down before a new one is opened. Returns `false` if nothing changed.
    pub async fn set_identity(&mut self, user_id: Option<String>) -> bool {
        if self.current_user() == user_id.as_deref() {
            return false;
        }
        self.close().await;
        if let Some(user_id) = user_id {
            self.open(user_id);
        }
        true
    }

    pub async fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
            let _ = active.task.await;
            info!("closed push connection for {} (generation {})", active.user_id, active.generation);
        }
    }

    fn open(&mut self, user_id: String) {
        self.last_generation += 1;
        let generation = self.last_generation;
        let task = tokio::spawn(run_connection(
            Arc::clone(&self.transport),
            self.policy,
            user_id.clone(),
            generation,
            self.events_tx.clone(),
        ));
        self.active = Some(ActiveConnection { user_id, generation, task });
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

async fn run_connection(
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    user_id: String,
    generation: u64,
    tx: mpsc::Sender<TaggedEvent>,
) {
    let mut attempt = 0u32;
    loop {
        match transport.open(&user_id).await {
            Ok(mut stream) => {
                info!("push connection open for {} (generation {})", user_id, generation);
                attempt = 0;
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(event) => {
                            if tx.send(TaggedEvent { generation, event }).await.is_err() {
                                return;
                            }
                        }
                        Err(e) if e.is_frame_local() => warn!("skipping undecodable frame: {}", e),
                        Err(e) => {
                            warn!("push connection for {} failed: {}", user_id, e);
                            break;
                        }
                    }
                }
                info!("push connection for {} ended", user_id);
            }
            Err(e) => warn!("could not open push connection for {}: {}", user_id, e),
        }
        if tx.is_closed() || policy.exhausted(attempt) {
            return;
        }
        let delay = policy.delay(attempt);
        attempt += 1;
        debug!("reconnecting {} in {:?}", user_id, delay);
        tokio::time::sleep(delay).await;
    }
}
