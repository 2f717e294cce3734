//! Platform REST client and the trait seam the engine talks through.
//!
//! Two primitives reach the platform: gateway frames (owned by the
//! connection manager) and request/response calls, which all go through
//! [`RestClient::call`]. The [`Platform`] trait is what the workflow engine
//! and publisher consume, so tests can substitute a mock.

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::RestError;

/// Interaction callback type: reply with a message.
const CALLBACK_MESSAGE: u8 = 4;
/// Interaction callback type: open a modal.
const CALLBACK_MODAL: u8 = 9;
/// Message flag: visible only to the initiating user.
const FLAG_EPHEMERAL: u64 = 64;

/// Reply sent back on an interaction handle.
#[derive(Debug, Clone)]
pub enum InteractionResponse {
    /// Ephemeral text reply to the initiating user.
    Ephemeral(String),
    /// Open a modal described by an opaque payload.
    Modal(Value),
}

impl InteractionResponse {
    fn into_callback(self) -> Value {
        match self {
            Self::Ephemeral(content) => json!({
                "type": CALLBACK_MESSAGE,
                "data": { "content": content, "flags": FLAG_EPHEMERAL },
            }),
            Self::Modal(modal) => json!({
                "type": CALLBACK_MODAL,
                "data": modal,
            }),
        }
    }
}

/// One tag from the forum's live catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForumTag {
    pub id: String,
    pub name: String,
}

/// Request to create a forum thread.
#[derive(Debug, Clone)]
pub struct ThreadRequest {
    pub name: String,
    pub message: Value,
    pub applied_tags: Vec<String>,
}

/// The request/response surface of the platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Reply on an interaction handle.
    async fn respond(
        &self,
        interaction_id: &str,
        token: &str,
        response: InteractionResponse,
    ) -> Result<(), RestError>;

    /// Fetch the live tag catalog of a forum channel.
    async fn fetch_tag_catalog(&self, forum_channel_id: &str) -> Result<Vec<ForumTag>, RestError>;

    /// Create a forum thread; returns the new thread id.
    async fn create_forum_thread(
        &self,
        forum_channel_id: &str,
        request: ThreadRequest,
    ) -> Result<String, RestError>;

    /// Archive and lock a thread.
    async fn archive_thread(&self, thread_id: &str) -> Result<(), RestError>;

    /// Post a message to a channel.
    async fn post_message(&self, channel_id: &str, body: Value) -> Result<(), RestError>;
}

/// reqwest-backed platform client.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl RestClient {
    pub fn new(config: &Config) -> Result<Self, RestError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("trinketbot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Perform one REST call. Non-success statuses become
    /// [`RestError::Status`] carrying the response body.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, RestError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url).header(
            "Authorization",
            format!("Bot {}", self.token.expose_secret()),
        );
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RestError::Status {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RestError::InvalidBody(e.to_string()))
    }
}

#[async_trait]
impl Platform for RestClient {
    async fn respond(
        &self,
        interaction_id: &str,
        token: &str,
        response: InteractionResponse,
    ) -> Result<(), RestError> {
        let path = format!("/interactions/{interaction_id}/{token}/callback");
        self.call(Method::POST, &path, Some(&response.into_callback()))
            .await?;
        Ok(())
    }

    async fn fetch_tag_catalog(&self, forum_channel_id: &str) -> Result<Vec<ForumTag>, RestError> {
        let channel = self
            .call(Method::GET, &format!("/channels/{forum_channel_id}"), None)
            .await?;
        let tags = channel
            .get("available_tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|tag| {
                        Some(ForumTag {
                            id: tag.get("id")?.as_str()?.to_string(),
                            name: tag.get("name")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(tags)
    }

    async fn create_forum_thread(
        &self,
        forum_channel_id: &str,
        request: ThreadRequest,
    ) -> Result<String, RestError> {
        let body = json!({
            "name": request.name,
            "message": request.message,
            "applied_tags": request.applied_tags,
        });
        let thread = self
            .call(
                Method::POST,
                &format!("/channels/{forum_channel_id}/threads"),
                Some(&body),
            )
            .await?;
        thread
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| RestError::InvalidBody("thread response missing id".to_string()))
    }

    async fn archive_thread(&self, thread_id: &str) -> Result<(), RestError> {
        let body = json!({ "archived": true, "locked": true });
        self.call(Method::PATCH, &format!("/channels/{thread_id}"), Some(&body))
            .await?;
        Ok(())
    }

    async fn post_message(&self, channel_id: &str, body: Value) -> Result<(), RestError> {
        self.call(
            Method::POST,
            &format!("/channels/{channel_id}/messages"),
            Some(&body),
        )
        .await?;
        Ok(())
    }
}
