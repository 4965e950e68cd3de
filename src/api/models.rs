use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChatError, Result};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Both sides of a conversation. Either may be missing until the server has loaded it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Participants {
    #[serde(default)]
    pub requester: Option<Participant>,
    #[serde(default)]
    pub provider: Option<Participant>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub participants: Participants,
    #[serde(default, alias = "lastMessage")]
    pub last_message_preview: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            participants: Participants::default(),
            last_message_preview: None,
            unread_count: 0,
        }
    }

    /// Display label: the other side's name when known, else the conversation id.
    pub fn title_for(&self, user_id: &str) -> String {
        let Participants { requester, provider } = &self.participants;
        let other = match requester {
            Some(r) if r.id == user_id => provider.as_ref(),
            _ => requester.as_ref().or(provider.as_ref()),
        };
        other
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Client-side lifecycle of a message. Only `Sent` carries a server id.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum MessageState {
    Sending { temp_id: String },
    Sent { id: String },
    Failed { temp_id: String },
}

impl MessageState {
    pub fn id(&self) -> Option<&str> {
        match self {
            MessageState::Sent { id } => Some(id),
            MessageState::Sending { .. } | MessageState::Failed { .. } => None,
        }
    }

    pub fn temp_id(&self) -> Option<&str> {
        match self {
            MessageState::Sending { temp_id } | MessageState::Failed { temp_id } => Some(temp_id),
            MessageState::Sent { .. } => None,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(flatten)]
    pub state: MessageState,
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub created_at: String,
}

impl Message {
    pub fn id(&self) -> Option<&str> {
        self.state.id()
    }

    pub fn temp_id(&self) -> Option<&str> {
        self.state.temp_id()
    }

    pub fn is_pending(&self) -> bool {
        !matches!(self.state, MessageState::Sent { .. })
    }

    /// Short text for conversation lists.
    pub fn preview(&self) -> String {
        match (&self.content, &self.attachment) {
            (Some(text), _) if !text.is_empty() => text.clone(),
            (_, Some(file)) => format!("[{}]", file.file_name),
            _ => String::new(),
        }
    }
}

/// A message as the server sends it. Client status never appears on the wire.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub temp_id: Option<String>,
    pub conversation_id: String,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl TryFrom<WireMessage> for Message {
    type Error = ChatError;

    fn try_from(wire: WireMessage) -> Result<Self> {
        let id = wire.id.ok_or(ChatError::MissingField("id"))?;
        let attachment = wire.file_name.map(|file_name| Attachment {
            file_name,
            file_size: wire.file_size.unwrap_or(0),
            file_url: wire.file_url,
        });
        Ok(Message {
            state: MessageState::Sent { id },
            conversation_id: wire.conversation_id,
            sender_id: wire.sender_id,
            content: wire.content,
            attachment,
            created_at: wire.created_at.unwrap_or_default(),
        })
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = WireMessage::deserialize(deserializer)?;
        Message::try_from(wire).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// What the user typed or attached before it becomes a message.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub content: Option<String>,
    pub attachment: Option<Upload>,
}

impl Draft {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), attachment: None }
    }

    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(|c| c.trim().is_empty()) && self.attachment.is_none()
    }
}

/// Pulls a list out of the shapes the backend answers with: a bare array,
/// or an object wrapping it under one of `keys`.
pub fn list_payload(json: Value, keys: &[&str]) -> Vec<Value> {
    match json {
        Value::Array(items) => items,
        Value::Object(mut map) => keys
            .iter()
            .find_map(|k| match map.remove(*k) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Unwraps a single object that may be nested under one of `keys`.
pub fn object_payload(json: Value, keys: &[&str]) -> Value {
    if let Value::Object(map) = &json {
        for k in keys {
            if let Some(inner @ Value::Object(_)) = map.get(*k) {
                return inner.clone();
            }
        }
    }
    json
}
