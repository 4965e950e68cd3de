use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered HTTP {0}")]
    Status(u16),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("payload is missing `{0}`")]
    MissingField(&'static str),

    #[error("message has neither text nor attachment")]
    EmptyMessage,

    #[error("no user is signed in")]
    NotAuthenticated,

    #[error("chat session has shut down")]
    SessionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(String),
}

impl ChatError {
    /// Errors that only concern one frame; the connection that produced them stays usable.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, ChatError::Payload(_) | ChatError::MissingField(_))
    }
}
