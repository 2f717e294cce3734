//! Listing publisher: turns a completed workflow into a forum thread.
//!
//! Publishing also retires the seller's previous listing: the prior thread
//! from the ledger is archived best-effort before the new one is created,
//! and the ledger is stamped once, after the thread exists.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::PublishError;
use crate::modals::shipping_label;
use crate::rest::{ForumTag, Platform, ThreadRequest};
use crate::store::{DocumentStore, ListingLedger};
use crate::workflow::steps::{TagSelection, WorkflowState};

/// Forum threads accept at most this many applied tags.
const MAX_APPLIED_TAGS: usize = 5;

/// Thread names are capped by the platform.
const MAX_THREAD_NAME: usize = 100;

pub struct Publisher<S: DocumentStore> {
    platform: Arc<dyn Platform>,
    ledger: ListingLedger<S>,
    forum_channel_id: String,
    allowed_tag_ids: Vec<String>,
    embed_color: u32,
}

impl<S: DocumentStore> Publisher<S> {
    pub fn new(platform: Arc<dyn Platform>, store: S, config: &Config) -> Self {
        Self {
            platform,
            ledger: ListingLedger::new(store),
            forum_channel_id: config.forum_channel_id.clone(),
            allowed_tag_ids: config.allowed_tag_ids.clone(),
            embed_color: config.embed_color,
        }
    }

    pub fn ledger(&self) -> &ListingLedger<S> {
        &self.ledger
    }

    /// Publish a completed workflow. Returns the new thread id.
    ///
    /// Tag resolution happens before any thread is created, so a selection
    /// that resolves to nothing refuses cleanly. A failing archive of the
    /// prior thread never blocks the new listing.
    pub async fn publish(&self, state: &WorkflowState) -> Result<String, PublishError> {
        if let Some(prior) = self.ledger.record(&state.user.id)? {
            if let Err(err) = self.platform.archive_thread(&prior.thread_id).await {
                warn!(
                    user = %state.user.id,
                    thread = %prior.thread_id,
                    error = %err,
                    "failed to archive previous listing thread"
                );
            }
        }

        let applied_tags = self.resolve_tags(state).await?;

        let thread_id = self
            .platform
            .create_forum_thread(
                &self.forum_channel_id,
                ThreadRequest {
                    name: thread_name(state),
                    message: self.render_message(state),
                    applied_tags,
                },
            )
            .await
            .map_err(|err| PublishError::CreationFailed {
                reason: err.to_string(),
            })?;

        let posted_at = Utc::now();
        self.ledger.stamp(&state.user.id, &thread_id, posted_at)?;
        info!(user = %state.user.id, thread = %thread_id, "listing published");
        Ok(thread_id)
    }

    /// Resolve the user's tag selection against the live catalog.
    ///
    /// A skipped tag step publishes untagged. An actual selection must
    /// survive the catalog-and-allowlist intersection or the publish is
    /// refused.
    async fn resolve_tags(&self, state: &WorkflowState) -> Result<Vec<String>, PublishError> {
        let selected = match &state.tags {
            None | Some(TagSelection::Skipped) => return Ok(Vec::new()),
            Some(TagSelection::Selected(ids)) => ids,
        };

        let catalog = self
            .platform
            .fetch_tag_catalog(&self.forum_channel_id)
            .await?;
        let resolved: Vec<String> = selected
            .iter()
            .filter(|id| catalog.iter().any(|tag| &tag.id == *id))
            .filter(|id| self.allowed_tag_ids.is_empty() || self.allowed_tag_ids.contains(id))
            .take(MAX_APPLIED_TAGS)
            .cloned()
            .collect();

        if resolved.is_empty() {
            return Err(PublishError::NoValidTags);
        }
        Ok(resolved)
    }

    fn render_message(&self, state: &WorkflowState) -> Value {
        let mut fields = Vec::new();
        for (index, item) in state.items.iter().enumerate() {
            let mut value = format!(
                "**Price:** ${}\n**Packaging:** {}\n**Condition:** {}",
                item.price, item.packaging, item.condition
            );
            if !item.notes.is_empty() {
                value.push_str("\n**Notes:** ");
                value.push_str(&item.notes);
            }
            fields.push(json!({
                "name": format!("{}. {}", index + 1, item.name),
                "value": value,
            }));
        }
        fields.push(json!({
            "name": "Payment",
            "value": state.payment_methods.join(", "),
            "inline": true,
        }));
        fields.push(json!({
            "name": "Shipping",
            "value": shipping_label(&state.shipping),
            "inline": true,
        }));

        let mut embeds = vec![json!({
            "author": {
                "name": format!("{}'s Shop", state.user.display_name),
                "icon_url": state.user.avatar_url,
            },
            "color": self.embed_color,
            "description": if state.general_info.is_empty() {
                Value::Null
            } else {
                Value::String(state.general_info.clone())
            },
            "fields": fields,
            "timestamp": Utc::now().to_rfc3339(),
        })];
        for url in &state.photo_urls {
            embeds.push(json!({
                "color": self.embed_color,
                "image": { "url": url },
            }));
        }

        json!({
            "content": format!("Listed by <@{}>", state.user.id),
            "embeds": embeds,
        })
    }
}

/// Tags visible in the catalog for the seller's tag form: the live catalog
/// filtered down to the configured allowlist (or the whole catalog when no
/// allowlist is set).
pub fn selectable_tags(catalog: Vec<ForumTag>, allowed_tag_ids: &[String]) -> Vec<ForumTag> {
    if allowed_tag_ids.is_empty() {
        return catalog;
    }
    catalog
        .into_iter()
        .filter(|tag| allowed_tag_ids.contains(&tag.id))
        .collect()
}

fn thread_name(state: &WorkflowState) -> String {
    let name = format!("{}'s Shop", state.user.display_name);
    if name.chars().count() <= MAX_THREAD_NAME {
        name
    } else {
        name.chars().take(MAX_THREAD_NAME).collect()
    }
}
