//! The event loop: dispatch frames in, workflow handling out.
//!
//! This is the crate's catch-all boundary. Whatever a handler returns, the
//! loop answers the interaction and keeps running; a handler error never
//! takes the process down.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::WorkflowError;
use crate::gateway::connection::DispatchEvent;
use crate::gateway::dispatcher;
use crate::gateway::InteractionEvent;
use crate::rest::{InteractionResponse, Platform};
use crate::store::DocumentStore;
use crate::workflow::Engine;

const SWEEP_PERIOD: Duration = Duration::from_secs(60);

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

pub struct Runtime<S: DocumentStore> {
    engine: Engine<S>,
    platform: std::sync::Arc<dyn Platform>,
}

impl<S: DocumentStore> Runtime<S> {
    pub fn new(engine: Engine<S>, platform: std::sync::Arc<dyn Platform>) -> Self {
        Self { engine, platform }
    }

    /// Consume dispatch frames until the gateway side closes the channel.
    pub async fn run(mut self, mut events: mpsc::Receiver<DispatchEvent>) {
        let mut sweep = tokio::time::interval(SWEEP_PERIOD);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("dispatch channel closed, event loop exiting");
                        return;
                    };
                    self.dispatch(event).await;
                }
                _ = sweep.tick() => {
                    self.engine.sweep_expired();
                }
            }
        }
    }

    async fn dispatch(&mut self, event: DispatchEvent) {
        if event.kind != "INTERACTION_CREATE" {
            return;
        }
        let Some(interaction) = dispatcher::normalize(&event.payload) else {
            return;
        };
        if let Err(err) = self.engine.handle(&interaction).await {
            self.report(&interaction, err).await;
        }
    }

    /// User-facing errors are reported verbatim; everything else is logged
    /// and reported as a generic failure carrying the error's message.
    async fn report(&self, interaction: &InteractionEvent, err: WorkflowError) {
        let message = if err.is_user_facing() {
            err.to_string()
        } else {
            error!(
                user = %interaction.user.id,
                error = %err,
                "interaction handler failed"
            );
            format!("{GENERIC_FAILURE} ({err})")
        };
        if let Err(reply_err) = self
            .platform
            .respond(
                &interaction.id,
                &interaction.token,
                InteractionResponse::Ephemeral(message),
            )
            .await
        {
            error!(
                user = %interaction.user.id,
                error = %reply_err,
                "failed to report handler error on interaction"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{RestError, StoreError, WorkflowError};
    use crate::listing::Publisher;
    use crate::rest::{ForumTag, ThreadRequest};
    use crate::store::{DocumentStore, MemoryStore};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    struct ReplyRecorder {
        replies: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Platform for ReplyRecorder {
        async fn respond(
            &self,
            _interaction_id: &str,
            _token: &str,
            response: InteractionResponse,
        ) -> Result<(), RestError> {
            if let InteractionResponse::Ephemeral(message) = response {
                self.replies.lock().unwrap().push(message);
            }
            Ok(())
        }

        async fn fetch_tag_catalog(&self, _: &str) -> Result<Vec<ForumTag>, RestError> {
            Ok(Vec::new())
        }

        async fn create_forum_thread(
            &self,
            _: &str,
            _: ThreadRequest,
        ) -> Result<String, RestError> {
            Ok("thread-1".to_string())
        }

        async fn archive_thread(&self, _: &str) -> Result<(), RestError> {
            Ok(())
        }

        async fn post_message(&self, _: &str, _: Value) -> Result<(), RestError> {
            Ok(())
        }
    }

    /// Store whose reads always fail, for driving internal errors through
    /// the boundary.
    struct BrokenStore;

    impl DocumentStore for BrokenStore {
        fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Read {
                key: key.to_string(),
                reason: "disk unplugged".to_string(),
            })
        }

        fn put(&self, key: &str, _value: &Value) -> Result<(), StoreError> {
            Err(StoreError::Write {
                key: key.to_string(),
                reason: "disk unplugged".to_string(),
            })
        }
    }

    fn test_config() -> Config {
        Config {
            token: secrecy::SecretString::from("test-token"),
            api_base_url: "https://api.example".to_string(),
            gateway_url: "wss://gateway.example".to_string(),
            forum_channel_id: "forum-1".to_string(),
            panel_channel_id: "panel-1".to_string(),
            admin_role_ids: Vec::new(),
            allowed_tag_ids: Vec::new(),
            cooldown_days: 14,
            reconnect_delay: Duration::from_secs(5),
            workflow_ttl: Duration::from_secs(1800),
            embed_color: 0xe0ad76,
            data_dir: std::path::PathBuf::from("data"),
        }
    }

    fn runtime_with<S: DocumentStore>(store: S) -> (Runtime<S>, Arc<ReplyRecorder>) {
        let platform = Arc::new(ReplyRecorder {
            replies: Mutex::new(Vec::new()),
        });
        let config = test_config();
        let publisher = Publisher::new(platform.clone(), store, &config);
        let engine = Engine::new(platform.clone(), publisher, &config);
        (Runtime::new(engine, platform.clone()), platform)
    }

    fn start_press() -> DispatchEvent {
        DispatchEvent {
            kind: "INTERACTION_CREATE".to_string(),
            payload: json!({
                "id": "i1",
                "token": "tok1",
                "type": 3,
                "user": { "id": "u1", "username": "seller" },
                "data": { "component_type": 2, "custom_id": "listing.start" },
            }),
        }
    }

    #[tokio::test]
    async fn internal_errors_reply_generic_failure_with_reason() {
        let (mut runtime, platform) = runtime_with(BrokenStore);

        runtime.dispatch(start_press()).await;

        let replies = platform.replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with(GENERIC_FAILURE));
        assert!(replies[0].contains("listings"), "reply should carry the cause: {}", replies[0]);
        assert!(replies[0].contains("disk unplugged"));
    }

    #[tokio::test]
    async fn user_facing_errors_reply_verbatim() {
        let (mut runtime, platform) = runtime_with(MemoryStore::new());

        // A form submission with no run behind it.
        runtime
            .dispatch(DispatchEvent {
                kind: "INTERACTION_CREATE".to_string(),
                payload: json!({
                    "id": "i2",
                    "token": "tok2",
                    "type": 5,
                    "user": { "id": "u1", "username": "seller" },
                    "data": { "custom_id": "listing.count", "components": [] },
                }),
            })
            .await;

        let replies = platform.replies.lock().unwrap();
        assert_eq!(replies[0], WorkflowError::SessionExpired.to_string());
        assert!(!replies[0].contains(GENERIC_FAILURE));
    }

    #[tokio::test]
    async fn non_interaction_dispatches_are_ignored() {
        let (mut runtime, platform) = runtime_with(MemoryStore::new());

        runtime
            .dispatch(DispatchEvent {
                kind: "GUILD_CREATE".to_string(),
                payload: json!({ "id": "g1" }),
            })
            .await;

        assert!(platform.replies.lock().unwrap().is_empty());
    }
}
