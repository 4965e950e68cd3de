use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde_json::Value;

use crate::api::models::{list_payload, object_payload, Conversation, Draft, Message};
use crate::error::{ChatError, Result};

/// The REST side of chat: history, submissions and conversation creation.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>>;

    /// Most recent page of a conversation, oldest first.
    async fn fetch_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>>;

    /// Submits a message. `Ok(None)` means the server accepted it without
    /// echoing the stored copy; a `message:ack` push will follow.
    async fn submit_message(&self, conversation_id: &str, temp_id: &str, draft: &Draft) -> Result<Option<Message>>;

    /// Returns the existing conversation with this provider or a new one.
    async fn start_conversation(&self, provider_id: &str) -> Result<Conversation>;
}

pub struct ApiClient {
    pub http: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.to_string(),
            token,
        }
    }

    fn base_api(base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/api") { trimmed.to_string() } else { format!("{}/api", trimmed) }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", Self::base_api(&self.base_url), path.trim_start_matches('/'))
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.header("Authorization", format!("Bearer {}", t)),
            None => req,
        }
    }

    async fn send_json(&self, req: reqwest::RequestBuilder) -> Result<Value> {
        let resp = self.with_auth(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ChatError::Status(status.as_u16()));
        }
        let body = resp.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        let json = self.send_json(self.http.get(self.endpoint("conversations"))).await?;
        let items = list_payload(json, &["conversations", "data"]);
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(serde_json::from_value(item)?);
        }
        debug!("fetched {} conversations", out.len());
        Ok(out)
    }

    async fn fetch_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<Message>> {
        let req = self
            .http
            .get(self.endpoint(&format!("conversations/{}/messages", conversation_id)))
            .query(&[("limit", limit)]);
        let json = self.send_json(req).await?;
        let items = list_payload(json, &["messages", "data"]);
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(serde_json::from_value(item)?);
        }
        Ok(out)
    }

    async fn submit_message(&self, conversation_id: &str, temp_id: &str, draft: &Draft) -> Result<Option<Message>> {
        let url = self.endpoint(&format!("conversations/{}/messages", conversation_id));
        let req = match &draft.attachment {
            Some(upload) => {
                let mut form = Form::new()
                    .text("tempId", temp_id.to_string())
                    .part("file", Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone()));
                if let Some(content) = &draft.content {
                    form = form.text("content", content.clone());
                }
                self.http.post(url).multipart(form)
            }
            None => self.http.post(url).json(&serde_json::json!({
                "content": draft.content,
                "tempId": temp_id,
            })),
        };
        let json = self.send_json(req).await?;
        if json.is_null() {
            return Ok(None);
        }
        let mut json = object_payload(json, &["message", "data"]);
        if json.get("id").is_none_or(Value::is_null) {
            return Ok(None);
        }
        if let Some(fields) = json.as_object_mut() {
            fields
                .entry("conversationId")
                .or_insert_with(|| Value::from(conversation_id));
        }
        // 2xx: stored even when the echo is unreadable, so wait for the ack.
        match serde_json::from_value(json) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                debug!("unreadable echo for {} in {}: {}", temp_id, conversation_id, e);
                Ok(None)
            }
        }
    }

    async fn start_conversation(&self, provider_id: &str) -> Result<Conversation> {
        let req = self
            .http
            .post(self.endpoint("conversations"))
            .json(&serde_json::json!({ "providerId": provider_id }));
        let json = self.send_json(req).await?;
        let json = object_payload(json, &["conversation", "data"]);
        if json.get("id").and_then(Value::as_str).is_none_or(str::is_empty) {
            return Err(ChatError::MissingField("id"));
        }
        Ok(serde_json::from_value(json)?)
    }
}
