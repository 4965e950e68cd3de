//! In-memory chat state.
//!
//! [`ChatState`] owns the conversation table and the per-conversation message
//! lists. Everything that changes them goes through the reducer methods here,
//! each of which reports what changed as a [`ChatUpdate`].

pub mod conversations;
pub mod messages;

pub use conversations::ConversationStore;
pub use messages::MessageStore;

use chrono::Utc;

use crate::api::events::ServerEvent;
use crate::api::models::{Attachment, Conversation, Draft, Message, MessageState};
use crate::error::{ChatError, Result};

/// What a reducer touched, for views that re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    ConversationsReplaced,
    ConversationChanged(String),
    MessagesChanged(String),
}

/// How the REST submission of an optimistic message ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The server answered with the stored message.
    Confirmed(Message),
    /// The server accepted the message; `message:ack` will carry it.
    Accepted,
    Rejected,
}

#[derive(Debug, Default)]
pub struct ChatState {
    conversations: ConversationStore,
    messages: MessageStore,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn apply(&mut self, event: ServerEvent) -> ChatUpdate {
        match event {
            ServerEvent::ConversationList(list) => self.replace_conversations(list),
            ServerEvent::ConversationUpdated(conversation) => self.upsert_conversation(conversation),
            ServerEvent::MessageNew(message) | ServerEvent::MessageAck { temp_id: None, message } => {
                let conversation_id = message.conversation_id.clone();
                self.refresh_preview(&message);
                self.messages.append_local(&conversation_id, message);
                ChatUpdate::MessagesChanged(conversation_id)
            }
            ServerEvent::MessageAck { temp_id: Some(temp_id), message } => {
                let conversation_id = message.conversation_id.clone();
                self.refresh_preview(&message);
                self.messages.replace_by_temp_id(&conversation_id, &temp_id, message);
                ChatUpdate::MessagesChanged(conversation_id)
            }
        }
    }

    /// Known conversations show the latest pushed message in their list entry.
    fn refresh_preview(&mut self, message: &Message) {
        let preview = message.preview();
        if preview.is_empty() {
            return;
        }
        if let Some(conversation) = self.conversations.get_mut(&message.conversation_id) {
            conversation.last_message_preview = Some(preview);
        }
    }

    pub fn replace_conversations(&mut self, list: Vec<Conversation>) -> ChatUpdate {
        self.conversations.replace_all(list);
        ChatUpdate::ConversationsReplaced
    }

    pub fn upsert_conversation(&mut self, conversation: Conversation) -> ChatUpdate {
        let id = conversation.id.clone();
        self.conversations.upsert(conversation);
        ChatUpdate::ConversationChanged(id)
    }

    pub fn load_history(&mut self, conversation_id: &str, page: Vec<Message>) -> ChatUpdate {
        self.messages.load_history(conversation_id, page);
        ChatUpdate::MessagesChanged(conversation_id.to_string())
    }

    pub fn close_conversation(&mut self, conversation_id: &str) -> ChatUpdate {
        self.messages.clear(conversation_id);
        ChatUpdate::MessagesChanged(conversation_id.to_string())
    }

    /// Appends the optimistic `Sending` entry for a draft.
    pub fn begin_send(
        &mut self,
        conversation_id: &str,
        sender_id: &str,
        draft: &Draft,
        temp_id: &str,
    ) -> Result<ChatUpdate> {
        if draft.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let attachment = draft.attachment.as_ref().map(|upload| Attachment {
            file_name: upload.file_name.clone(),
            file_size: upload.bytes.len() as u64,
            file_url: None,
        });
        let message = Message {
            state: MessageState::Sending { temp_id: temp_id.to_string() },
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: draft.content.clone().filter(|c| !c.trim().is_empty()),
            attachment,
            created_at: Utc::now().to_rfc3339(),
        };
        self.messages.append_local(conversation_id, message);
        Ok(ChatUpdate::MessagesChanged(conversation_id.to_string()))
    }

    pub fn resolve_send(&mut self, conversation_id: &str, temp_id: &str, outcome: SendOutcome) -> Option<ChatUpdate> {
        match outcome {
            SendOutcome::Confirmed(message) => {
                self.messages.replace_by_temp_id(conversation_id, temp_id, message);
            }
            SendOutcome::Accepted => return None,
            SendOutcome::Rejected => {
                if !self.messages.mark_failed(conversation_id, temp_id) {
                    return None;
                }
            }
        }
        Some(ChatUpdate::MessagesChanged(conversation_id.to_string()))
    }

    /// Drops everything; used when a different user signs in.
    pub fn reset(&mut self) {
        self.conversations.clear();
        self.messages.clear_all();
    }
}
