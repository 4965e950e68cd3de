//! The chat session: one task that owns all chat state.
//!
//! Push events, user commands and finished REST calls are all funnelled into
//! [`ChatSession::run`] and applied one at a time, so readers never observe a
//! half-applied event. Views talk to the session through a cloneable
//! [`ChatHandle`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::api::client::ChatBackend;
use crate::api::connection::{ConnectionManager, ReconnectPolicy, TaggedEvent, Transport};
use crate::api::models::{Conversation, Draft, Message};
use crate::app::AppState;
use crate::error::{ChatError, Result};
use crate::router::{EventRouter, SubscriptionId};
use crate::store::{ChatState, ChatUpdate, SendOutcome};
use crate::utils::temp_id;

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub history_page_size: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { history_page_size: 50, reconnect: ReconnectPolicy::default() }
    }
}

impl From<&AppState> for SessionOptions {
    fn from(state: &AppState) -> Self {
        Self { history_page_size: state.history_page_size, reconnect: state.reconnect }
    }
}

enum Command {
    SetIdentity { user_id: Option<String>, reply: oneshot::Sender<()> },
    OpenConversation { conversation_id: String, reply: oneshot::Sender<Result<()>> },
    CloseConversation { conversation_id: String, reply: oneshot::Sender<()> },
    RefreshConversations { reply: oneshot::Sender<Result<()>> },
    Send { conversation_id: String, draft: Draft, reply: oneshot::Sender<Result<String>> },
    StartConversation { provider_id: String, reply: oneshot::Sender<Result<Conversation>> },
    Conversations { reply: oneshot::Sender<Vec<Conversation>> },
    Conversation { id: String, reply: oneshot::Sender<Option<Conversation>> },
    Messages { conversation_id: String, reply: oneshot::Sender<Vec<Message>> },
    Shutdown { reply: oneshot::Sender<()> },
}

enum Completion {
    ConversationsLoaded(Result<Vec<Conversation>>),
    HistoryLoaded { conversation_id: String, result: Result<Vec<Message>> },
    Submitted { conversation_id: String, temp_id: String, result: Result<Option<Message>> },
    ConversationStarted { result: Result<Conversation>, reply: oneshot::Sender<Result<Conversation>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fetch {
    Loading,
    Loaded,
}

/// Which REST reads have been made for the current user.
#[derive(Debug, Default)]
struct QueryCache {
    conversations: Option<Fetch>,
    histories: HashMap<String, Fetch>,
}

impl QueryCache {
    /// Marks the history as loading; `false` when it is loaded or already on its way.
    fn begin_history(&mut self, conversation_id: &str) -> bool {
        if self.histories.contains_key(conversation_id) {
            return false;
        }
        self.histories.insert(conversation_id.to_string(), Fetch::Loading);
        true
    }
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    connection: ConnectionManager,
    events: mpsc::Receiver<TaggedEvent>,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<(u64, Completion)>,
    completions: mpsc::UnboundedReceiver<(u64, Completion)>,
    router: EventRouter,
    store_subscriptions: Vec<SubscriptionId>,
    state: ChatState,
    cache: QueryCache,
    updates: broadcast::Sender<ChatUpdate>,
    user_id: Option<String>,
    /// Bumped on every sign-in change; REST results from an older epoch are discarded.
    epoch: u64,
    options: SessionOptions,
}

impl ChatSession {
    /// Starts the session task on the current Tokio runtime.
    pub fn spawn(backend: Arc<dyn ChatBackend>, transport: Arc<dyn Transport>, options: SessionOptions) -> ChatHandle {
        let (connection, events) = ConnectionManager::new(transport, options.reconnect);
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let session = ChatSession {
            backend,
            connection,
            events,
            commands,
            completions_tx,
            completions,
            router: EventRouter::new(),
            store_subscriptions: Vec::new(),
            state: ChatState::new(),
            cache: QueryCache::default(),
            updates: updates.clone(),
            user_id: None,
            epoch: 0,
            options,
        };
        tokio::spawn(session.run());
        ChatHandle { commands: command_tx, updates }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.connection.close().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(tagged) = self.events.recv() => self.handle_event(tagged),
                Some((epoch, done)) = self.completions.recv() => self.handle_completion(epoch, done),
            }
        }
        self.connection.close().await;
        info!("chat session stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetIdentity { user_id, reply } => {
                self.set_identity(user_id).await;
                let _ = reply.send(());
            }
            Command::OpenConversation { conversation_id, reply } => {
                let _ = reply.send(self.open_conversation(conversation_id));
            }
            Command::CloseConversation { conversation_id, reply } => {
                self.cache.histories.remove(&conversation_id);
                let update = self.state.close_conversation(&conversation_id);
                self.publish(update);
                let _ = reply.send(());
            }
            Command::RefreshConversations { reply } => {
                let result = match self.user_id {
                    Some(_) => {
                        self.fetch_conversations();
                        Ok(())
                    }
                    None => Err(ChatError::NotAuthenticated),
                };
                let _ = reply.send(result);
            }
            Command::Send { conversation_id, draft, reply } => {
                let _ = reply.send(self.send(conversation_id, draft));
            }
            Command::StartConversation { provider_id, reply } => {
                if self.user_id.is_none() {
                    let _ = reply.send(Err(ChatError::NotAuthenticated));
                    return;
                }
                let backend = Arc::clone(&self.backend);
                self.spawn_completion(async move {
                    let result = backend.start_conversation(&provider_id).await;
                    Completion::ConversationStarted { result, reply }
                });
            }
            Command::Conversations { reply } => {
                let _ = reply.send(self.state.conversations().get_all().to_vec());
            }
            Command::Conversation { id, reply } => {
                let _ = reply.send(self.state.conversations().get_by_id(&id).cloned());
            }
            Command::Messages { conversation_id, reply } => {
                let _ = reply.send(self.state.messages().get(&conversation_id).to_vec());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn set_identity(&mut self, user_id: Option<String>) {
        if self.user_id == user_id {
            return;
        }
        for id in self.store_subscriptions.drain(..) {
            self.router.off(id);
        }
        self.connection.set_identity(user_id.clone()).await;
        self.epoch += 1;
        self.state.reset();
        self.cache = QueryCache::default();
        self.user_id = user_id;
        self.publish(ChatUpdate::ConversationsReplaced);

        if let Some(user_id) = &self.user_id {
            info!("signed in as {}", user_id);
            self.store_subscriptions = self.router.attach_store_handlers();
            self.fetch_conversations();
        }
    }

    fn open_conversation(&mut self, conversation_id: String) -> Result<()> {
        if self.user_id.is_none() {
            return Err(ChatError::NotAuthenticated);
        }
        if !self.cache.begin_history(&conversation_id) {
            debug!("history for {} already requested", conversation_id);
            return Ok(());
        }
        let backend = Arc::clone(&self.backend);
        let limit = self.options.history_page_size;
        self.spawn_completion(async move {
            let result = backend.fetch_messages(&conversation_id, limit).await;
            Completion::HistoryLoaded { conversation_id, result }
        });
        Ok(())
    }

    fn fetch_conversations(&mut self) {
        if self.cache.conversations == Some(Fetch::Loading) {
            return;
        }
        self.cache.conversations = Some(Fetch::Loading);
        let backend = Arc::clone(&self.backend);
        self.spawn_completion(async move { Completion::ConversationsLoaded(backend.fetch_conversations().await) });
    }

    fn send(&mut self, conversation_id: String, draft: Draft) -> Result<String> {
        let sender_id = self.user_id.clone().ok_or(ChatError::NotAuthenticated)?;
        let temp_id = temp_id();
        let update = self.state.begin_send(&conversation_id, &sender_id, &draft, &temp_id)?;
        self.publish(update);

        let backend = Arc::clone(&self.backend);
        let pending = temp_id.clone();
        self.spawn_completion(async move {
            let result = backend.submit_message(&conversation_id, &pending, &draft).await;
            Completion::Submitted { conversation_id, temp_id: pending, result }
        });
        Ok(temp_id)
    }

    fn handle_event(&mut self, tagged: TaggedEvent) {
        if !self.connection.is_current(&tagged) {
            debug!("dropping {} from superseded connection {}", tagged.event.event, tagged.generation);
            return;
        }
        for update in self.router.dispatch(&mut self.state, &tagged.event) {
            if update == ChatUpdate::ConversationsReplaced {
                self.cache.conversations = Some(Fetch::Loaded);
            }
            self.publish(update);
        }
    }

    fn handle_completion(&mut self, epoch: u64, done: Completion) {
        if epoch != self.epoch {
            match done {
                Completion::ConversationStarted { result, reply } => {
                    let _ = reply.send(result);
                }
                _ => debug!("discarding a response that belongs to a previous sign-in"),
            }
            return;
        }
        match done {
            Completion::ConversationsLoaded(Ok(list)) => {
                self.cache.conversations = Some(Fetch::Loaded);
                let update = self.state.replace_conversations(list);
                self.publish(update);
            }
            Completion::ConversationsLoaded(Err(e)) => {
                self.cache.conversations = None;
                warn!("could not load conversations: {}", e);
            }
            Completion::HistoryLoaded { conversation_id, result: Ok(page) } => {
                self.cache.histories.insert(conversation_id.clone(), Fetch::Loaded);
                let update = self.state.load_history(&conversation_id, page);
                self.publish(update);
            }
            Completion::HistoryLoaded { conversation_id, result: Err(e) } => {
                self.cache.histories.remove(&conversation_id);
                warn!("could not load messages for {}: {}", conversation_id, e);
            }
            Completion::Submitted { conversation_id, temp_id, result } => {
                let outcome = match result {
                    Ok(Some(message)) => SendOutcome::Confirmed(message),
                    Ok(None) => SendOutcome::Accepted,
                    Err(e) => {
                        warn!("sending {} to {} failed: {}", temp_id, conversation_id, e);
                        SendOutcome::Rejected
                    }
                };
                if let Some(update) = self.state.resolve_send(&conversation_id, &temp_id, outcome) {
                    self.publish(update);
                }
            }
            Completion::ConversationStarted { result, reply } => {
                if let Ok(conversation) = &result {
                    let update = self.state.upsert_conversation(conversation.clone());
                    self.publish(update);
                }
                let _ = reply.send(result);
            }
        }
    }

    fn spawn_completion<F>(&self, task: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let done = task.await;
            let _ = tx.send((epoch, done));
        });
    }

    fn publish(&self, update: ChatUpdate) {
        // No subscribers is fine.
        let _ = self.updates.send(update);
    }
}

/// Cloneable access to a running [`ChatSession`]. The session stops once every handle is dropped.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<ChatUpdate>,
}

impl ChatHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        rx.await.map_err(|_| ChatError::SessionClosed)
    }

    pub fn updates(&self) -> broadcast::Receiver<ChatUpdate> {
        self.updates.subscribe()
    }

    /// Signs a user in or out. Returns once the previous connection is gone.
    pub async fn set_identity(&self, user_id: Option<String>) -> Result<()> {
        self.request(|reply| Command::SetIdentity { user_id, reply }).await
    }

    /// Requests the first history page unless it was already loaded.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<()> {
        let conversation_id = conversation_id.to_string();
        self.request(|reply| Command::OpenConversation { conversation_id, reply }).await?
    }

    pub async fn close_conversation(&self, conversation_id: &str) -> Result<()> {
        let conversation_id = conversation_id.to_string();
        self.request(|reply| Command::CloseConversation { conversation_id, reply }).await
    }

    pub async fn refresh_conversations(&self) -> Result<()> {
        self.request(|reply| Command::RefreshConversations { reply }).await?
    }

    /// Adds the message locally and submits it. Returns its temporary id; the
    /// entry is already visible in [`messages`](Self::messages) when this returns.
    pub async fn send_message(&self, conversation_id: &str, draft: Draft) -> Result<String> {
        let conversation_id = conversation_id.to_string();
        self.request(|reply| Command::Send { conversation_id, draft, reply }).await?
    }

    pub async fn start_conversation(&self, provider_id: &str) -> Result<Conversation> {
        let provider_id = provider_id.to_string();
        self.request(|reply| Command::StartConversation { provider_id, reply }).await?
    }

    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        self.request(|reply| Command::Conversations { reply }).await
    }

    pub async fn conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let id = id.to_string();
        self.request(|reply| Command::Conversation { id, reply }).await
    }

    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conversation_id = conversation_id.to_string();
        self.request(|reply| Command::Messages { conversation_id, reply }).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
