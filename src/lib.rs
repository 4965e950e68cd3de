//! Real-time chat synchronization for the party booking client.
//!
//! Conversations and messages live in a [`store::ChatState`] owned by a
//! [`session::ChatSession`] task. The REST backend ([`api::client`]) supplies
//! history and accepts submissions, and the push channel ([`api::connection`])
//! delivers live events that the [`router`] applies to the stores.

pub mod api;
pub mod app;
pub mod error;
pub mod router;
pub mod session;
pub mod store;
pub mod utils;

pub use api::client::{ApiClient, ChatBackend};
pub use api::connection::{ConnectionManager, ReconnectPolicy, Transport, WsTransport};
pub use api::events::{IncomingEvent, ServerEvent};
pub use api::models::{Attachment, Conversation, Draft, Message, MessageState, Participant, Participants, Upload};
pub use app::AppState;
pub use error::{ChatError, Result};
pub use session::{ChatHandle, ChatSession, SessionOptions};
pub use store::{ChatState, ChatUpdate};
