//! The per-user workflow engine.
//!
//! One engine instance owns every in-progress listing workflow, keyed by
//! user id, so a user has at most one active run. The engine is driven by
//! normalized interaction events from the dispatcher and replies on the
//! interaction handle itself; the caller only handles errors.
//!
//! State is mutated only after every input of a step validates, so a
//! rejected submission leaves the workflow exactly where it was.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::WorkflowError;
use crate::gateway::{InteractionEvent, InteractionKind};
use crate::listing::{selectable_tags, Publisher};
use crate::modals;
use crate::rest::{InteractionResponse, Platform};
use crate::store::DocumentStore;
use crate::workflow::steps::{
    ItemEntry, Step, StepToken, TagSelection, WorkflowState, FIELD_CONDITION, FIELD_CONFIRM,
    FIELD_COUNT, FIELD_INFO, FIELD_NAME, FIELD_NOTES, FIELD_PACKAGING, FIELD_PAYMENT,
    FIELD_PHOTOS, FIELD_PRICE, FIELD_SHIPPING, FIELD_TAGS,
};
use crate::workflow::validate;

/// Slash command that posts the listing panel.
pub const SETUP_COMMAND: &str = "setup_marketplace";

pub struct Engine<S: DocumentStore> {
    platform: Arc<dyn Platform>,
    publisher: Publisher<S>,
    forum_channel_id: String,
    panel_channel_id: String,
    admin_role_ids: Vec<String>,
    allowed_tag_ids: Vec<String>,
    cooldown_days: i64,
    embed_color: u32,
    workflow_ttl: std::time::Duration,
    sessions: HashMap<String, WorkflowState>,
}

impl<S: DocumentStore> Engine<S> {
    pub fn new(platform: Arc<dyn Platform>, publisher: Publisher<S>, config: &Config) -> Self {
        Self {
            platform,
            publisher,
            forum_channel_id: config.forum_channel_id.clone(),
            panel_channel_id: config.panel_channel_id.clone(),
            admin_role_ids: config.admin_role_ids.clone(),
            allowed_tag_ids: config.allowed_tag_ids.clone(),
            cooldown_days: config.cooldown_days,
            embed_color: config.embed_color,
            workflow_ttl: config.workflow_ttl,
            sessions: HashMap::new(),
        }
    }

    /// Route one normalized interaction. `Ok` means the interaction was
    /// answered (or was not ours to answer); `Err` means the caller must
    /// report the failure on the handle.
    pub async fn handle(&mut self, event: &InteractionEvent) -> Result<(), WorkflowError> {
        match event.kind {
            InteractionKind::SlashCommand => self.handle_command(event).await,
            InteractionKind::ButtonPress | InteractionKind::FormSubmit => {
                let Some(token) = event.custom_id.as_deref().and_then(StepToken::parse) else {
                    return Ok(());
                };
                self.handle_token(event, token).await
            }
            // Standalone select components are not part of the workflow;
            // selections arrive inside form submissions.
            InteractionKind::SelectionSubmit => Ok(()),
        }
    }

    /// Drop workflows idle past the TTL. Returns how many were swept.
    pub fn sweep_expired(&mut self) -> usize {
        let ttl = self.workflow_ttl;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, state| state.touched_at.elapsed() <= ttl);
        let swept = before - self.sessions.len();
        if swept > 0 {
            debug!(swept, remaining = self.sessions.len(), "swept idle workflows");
        }
        swept
    }

    async fn handle_command(&mut self, event: &InteractionEvent) -> Result<(), WorkflowError> {
        if event.command_name.as_deref() != Some(SETUP_COMMAND) {
            return Ok(());
        }
        if !event.is_admin(&self.admin_role_ids) {
            return Err(WorkflowError::PermissionDenied);
        }
        self.platform
            .post_message(
                &self.panel_channel_id,
                modals::panel_message(self.embed_color, self.cooldown_days),
            )
            .await?;
        info!(channel = %self.panel_channel_id, "marketplace panel posted");
        self.respond(event, InteractionResponse::Ephemeral("Marketplace panel posted.".to_string()))
            .await
    }

    async fn handle_token(
        &mut self,
        event: &InteractionEvent,
        token: StepToken,
    ) -> Result<(), WorkflowError> {
        if token == StepToken::Start {
            return self.handle_start(event).await;
        }

        let state = self
            .sessions
            .get(&event.user.id)
            .ok_or(WorkflowError::SessionExpired)?;
        if !state.step.accepts(token) {
            return Err(WorkflowError::SessionExpired);
        }

        match token {
            StepToken::Start => unreachable!("handled above"),
            StepToken::Count => self.handle_count(event).await,
            StepToken::PaymentShipping => self.handle_payment_shipping(event).await,
            StepToken::Item(index) => self.handle_item(event, index).await,
            StepToken::Tags => self.handle_tags(event).await,
            StepToken::Photos => self.handle_photos(event).await,
        }
    }

    /// Entry gate: the cooldown is checked before any state is created, and
    /// a fresh run replaces whatever was in progress.
    async fn handle_start(&mut self, event: &InteractionEvent) -> Result<(), WorkflowError> {
        if let Some(record) = self.publisher.ledger().record(&event.user.id)? {
            let next_eligible = next_eligible(record.posted_at, self.cooldown_days);
            if Utc::now() < next_eligible {
                return Err(WorkflowError::CooldownActive {
                    window_days: self.cooldown_days,
                    next_eligible: next_eligible.format("%b %-d, %Y").to_string(),
                });
            }
        }

        self.sessions
            .insert(event.user.id.clone(), WorkflowState::new(event.user.clone()));
        info!(user = %event.user.id, "listing workflow started");
        self.respond(event, InteractionResponse::Modal(modals::count_modal()))
            .await
    }

    async fn handle_count(&mut self, event: &InteractionEvent) -> Result<(), WorkflowError> {
        let count = validate::item_count(event.text_field(FIELD_COUNT).unwrap_or(""))?;
        let info = event.text_field(FIELD_INFO).unwrap_or("").trim().to_string();

        let state = self.session_mut(&event.user.id)?;
        state.item_total = count;
        state.general_info = info;
        state.advance(Step::CollectingPaymentShipping);

        self.respond(event, InteractionResponse::Modal(modals::payment_modal()))
            .await
    }

    async fn handle_payment_shipping(
        &mut self,
        event: &InteractionEvent,
    ) -> Result<(), WorkflowError> {
        let payment: Vec<String> = event
            .selection_field(FIELD_PAYMENT)
            .unwrap_or(&[])
            .to_vec();
        if payment.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "Please select at least one payment method.".to_string(),
            ));
        }
        let shipping = event
            .selection_field(FIELD_SHIPPING)
            .and_then(|values| values.first())
            .cloned()
            .ok_or_else(|| {
                WorkflowError::InvalidInput("Please select a shipping policy.".to_string())
            })?;

        let state = self.session_mut(&event.user.id)?;
        state.payment_methods = payment;
        state.shipping = shipping;
        let total = state.item_total;
        state.advance(Step::CollectingItem(0));

        self.respond(event, InteractionResponse::Modal(modals::item_modal(0, total)))
            .await
    }

    async fn handle_item(
        &mut self,
        event: &InteractionEvent,
        index: usize,
    ) -> Result<(), WorkflowError> {
        let name = validate::required_text("item name", event.text_field(FIELD_NAME).unwrap_or(""))?;
        let price = validate::price(event.text_field(FIELD_PRICE).unwrap_or(""))?;
        let notes = event.text_field(FIELD_NOTES).unwrap_or("").trim().to_string();
        let packaging = single_selection(event, FIELD_PACKAGING, "packaging condition")?;
        let condition = single_selection(event, FIELD_CONDITION, "item condition")?;

        let state = self.session_mut(&event.user.id)?;
        state.items.push(ItemEntry {
            name,
            price,
            notes,
            packaging,
            condition,
        });
        let total = state.item_total;

        if index + 1 < total {
            state.advance(Step::CollectingItem(index + 1));
            return self
                .respond(
                    event,
                    InteractionResponse::Modal(modals::item_modal(index + 1, total)),
                )
                .await;
        }

        // All items collected: offer tags if the catalog has any, otherwise
        // skip straight to photos.
        let catalog = match self.platform.fetch_tag_catalog(&self.forum_channel_id).await {
            Ok(catalog) => selectable_tags(catalog, &self.allowed_tag_ids),
            Err(err) => {
                warn!(error = %err, "tag catalog unavailable, skipping tag step");
                Vec::new()
            }
        };

        let state = self.session_mut(&event.user.id)?;
        if catalog.is_empty() {
            state.tags = Some(TagSelection::Skipped);
            state.advance(Step::CollectingPhotos);
            self.respond(event, InteractionResponse::Modal(modals::photos_modal()))
                .await
        } else {
            state.advance(Step::CollectingTags);
            self.respond(event, InteractionResponse::Modal(modals::tags_modal(&catalog)))
                .await
        }
    }

    async fn handle_tags(&mut self, event: &InteractionEvent) -> Result<(), WorkflowError> {
        let selected: Vec<String> = event.selection_field(FIELD_TAGS).unwrap_or(&[]).to_vec();
        validate::tag_selection(&selected)?;

        let state = self.session_mut(&event.user.id)?;
        state.tags = Some(TagSelection::Selected(selected));
        state.advance(Step::CollectingPhotos);

        self.respond(event, InteractionResponse::Modal(modals::photos_modal()))
            .await
    }

    /// Terminal step. Publish failures keep the state so the user can
    /// resubmit the form.
    async fn handle_photos(&mut self, event: &InteractionEvent) -> Result<(), WorkflowError> {
        let photos = event.attachment_field(FIELD_PHOTOS).unwrap_or(&[]);
        validate::photo_count(photos.len())?;
        validate::confirmation(event.text_field(FIELD_CONFIRM).unwrap_or(""))?;
        let photo_urls: Vec<String> = photos.iter().map(|a| a.url.clone()).collect();

        let state = self.session_mut(&event.user.id)?;
        state.photo_urls = photo_urls;

        let snapshot = state.clone();
        let thread_id = self.publisher.publish(&snapshot).await?;

        self.sessions.remove(&event.user.id);
        self.respond(
            event,
            InteractionResponse::Ephemeral(format!(
                "Your listing is live: <#{thread_id}>"
            )),
        )
        .await
    }

    fn session_mut(&mut self, user_id: &str) -> Result<&mut WorkflowState, WorkflowError> {
        self.sessions
            .get_mut(user_id)
            .ok_or(WorkflowError::SessionExpired)
    }

    async fn respond(
        &self,
        event: &InteractionEvent,
        response: InteractionResponse,
    ) -> Result<(), WorkflowError> {
        self.platform
            .respond(&event.id, &event.token, response)
            .await?;
        Ok(())
    }
}

/// Extracts the single selected value for `field` from an interaction
/// event, or reports an invalid-input error naming `label`.
fn single_selection(
    event: &InteractionEvent,
    field: &str,
    label: &str,
) -> Result<String, WorkflowError> {
    event
        .selection_field(field)
        .and_then(|v| v.first())
        .cloned()
        .ok_or_else(|| WorkflowError::InvalidInput(format!("Please select a {label}.")))
}

/// First instant a user may publish again after a listing stamped at
/// `posted_at`.
pub fn next_eligible(posted_at: DateTime<Utc>, cooldown_days: i64) -> DateTime<Utc> {
    posted_at + Duration::days(cooldown_days)
}
