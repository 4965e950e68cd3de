#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, Semaphore};

use partychat::api::connection::EventStream;
use partychat::{ChatBackend, ChatError, ChatUpdate, Conversation, Draft, IncomingEvent, Message, Result, Transport};

pub type Feed = mpsc::UnboundedSender<Result<IncomingEvent>>;

/// Transport whose connections are fed by the test. Every `open` hands the
/// test a `(user_id, feed)` pair through `opened`.
pub struct FakeTransport {
    opened: mpsc::UnboundedSender<(String, Feed)>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Feed)>) {
        let (opened, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { opened }), rx)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, user_id: &str) -> Result<EventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.opened.send((user_id.to_string(), tx));
        Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// Answer with the stored message, id `srv-<n>`.
    Echo,
    /// Answer with an empty body.
    Accept,
    Reject,
}

pub struct FakeBackend {
    pub conversations: Mutex<Vec<Conversation>>,
    pub history: Mutex<HashMap<String, Vec<Message>>>,
    pub mode: Mutex<SubmitMode>,
    /// Submissions wait for a permit, so tests decide when the REST call returns.
    pub submit_gate: Semaphore,
    pub history_calls: AtomicUsize,
    pub submitted: AtomicUsize,
}

impl FakeBackend {
    pub fn new(mode: SubmitMode) -> Arc<Self> {
        Arc::new(Self {
            conversations: Mutex::new(vec![conversation("c1")]),
            history: Mutex::new(HashMap::new()),
            mode: Mutex::new(mode),
            submit_gate: Semaphore::new(0),
            history_calls: AtomicUsize::new(0),
            submitted: AtomicUsize::new(0),
        })
    }

    pub fn release_submissions(&self, n: usize) {
        self.submit_gate.add_permits(n);
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn fetch_messages(&self, conversation_id: &str, _limit: usize) -> Result<Vec<Message>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.history.lock().unwrap().get(conversation_id).cloned().unwrap_or_default())
    }

    async fn submit_message(&self, conversation_id: &str, _temp_id: &str, draft: &Draft) -> Result<Option<Message>> {
        self.submit_gate.acquire().await.expect("gate closed").forget();
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        let mode = *self.mode.lock().unwrap();
        match mode {
            SubmitMode::Echo => Ok(Some(message(
                &format!("srv-{n}"),
                conversation_id,
                "u1",
                draft.content.as_deref().unwrap_or_default(),
            ))),
            SubmitMode::Accept => Ok(None),
            SubmitMode::Reject => Err(ChatError::Status(500)),
        }
    }

    async fn start_conversation(&self, provider_id: &str) -> Result<Conversation> {
        let mut c = conversation(&format!("with-{provider_id}"));
        c.participants.provider = Some(partychat::Participant { id: provider_id.to_string(), ..Default::default() });
        Ok(c)
    }
}

pub fn conversation(id: &str) -> Conversation {
    serde_json::from_value(json!({"id": id})).unwrap()
}

pub fn message(id: &str, conversation_id: &str, sender_id: &str, content: &str) -> Message {
    serde_json::from_value(wire_message(id, conversation_id, sender_id, content)).unwrap()
}

pub fn wire_message(id: &str, conversation_id: &str, sender_id: &str, content: &str) -> Value {
    json!({
        "id": id,
        "conversationId": conversation_id,
        "senderId": sender_id,
        "content": content,
        "createdAt": "2024-05-01T10:00:00Z"
    })
}

pub fn frame(event: &str, data: Value) -> Result<IncomingEvent> {
    Ok(IncomingEvent::new(event, data))
}

/// Waits for the next update matching `want`, failing the test after a few seconds.
pub async fn wait_for(updates: &mut broadcast::Receiver<ChatUpdate>, want: ChatUpdate) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match updates.recv().await {
                Ok(update) if update == want => return,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("update channel closed: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {want:?}"));
}
