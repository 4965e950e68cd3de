use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::models::{list_payload, Conversation, Message, WireMessage};
use crate::error::Result;

pub const CONVERSATIONS: &str = "conversations";
pub const CONVERSATION_LIST: &str = "conversation:list";
pub const CONVERSATION_UPDATED: &str = "conversation:updated";
pub const MESSAGE_NEW: &str = "message:new";
pub const MESSAGE_ACK: &str = "message:ack";

pub const STORE_EVENTS: [&str; 5] = [
    CONVERSATIONS,
    CONVERSATION_LIST,
    CONVERSATION_UPDATED,
    MESSAGE_NEW,
    MESSAGE_ACK,
];

/// One named frame off the push channel.
///
/// Accepts `{"event": name, "data": payload}` as well as the socket.io style
/// `[name, payload]` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomingEvent {
    pub event: String,
    pub data: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFrame {
    Named {
        #[serde(alias = "type", alias = "event_type")]
        event: String,
        #[serde(default)]
        data: Value,
    },
    Tuple(String, Value),
}

impl<'de> Deserialize<'de> for IncomingEvent {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match RawFrame::deserialize(deserializer)? {
            RawFrame::Named { event, data } | RawFrame::Tuple(event, data) => IncomingEvent { event, data },
        })
    }
}

impl IncomingEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ConversationList(Vec<Conversation>),
    ConversationUpdated(Conversation),
    MessageNew(Message),
    MessageAck { temp_id: Option<String>, message: Message },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AckPayload {
    #[serde(default)]
    temp_id: Option<String>,
    message: WireMessage,
}

impl ServerEvent {
    /// Decodes a frame into a typed event. `Ok(None)` means the name is not a store event.
    pub fn decode(frame: &IncomingEvent) -> Result<Option<Self>> {
        let data = frame.data.clone();
        let event = match frame.event.as_str() {
            CONVERSATIONS | CONVERSATION_LIST => {
                let items = list_payload(data, &["conversations", "data"]);
                let list = items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<Vec<Conversation>, _>>()?;
                ServerEvent::ConversationList(list)
            }
            CONVERSATION_UPDATED => ServerEvent::ConversationUpdated(serde_json::from_value(data)?),
            MESSAGE_NEW => ServerEvent::MessageNew(serde_json::from_value(data)?),
            MESSAGE_ACK => {
                let ack: AckPayload = serde_json::from_value(data)?;
                let temp_id = ack.temp_id.or_else(|| ack.message.temp_id.clone());
                ServerEvent::MessageAck { temp_id, message: Message::try_from(ack.message)? }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ConversationList(_) => CONVERSATION_LIST,
            ServerEvent::ConversationUpdated(_) => CONVERSATION_UPDATED,
            ServerEvent::MessageNew(_) => MESSAGE_NEW,
            ServerEvent::MessageAck { .. } => MESSAGE_ACK,
        }
    }
}
