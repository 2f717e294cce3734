//! Workflow steps, the inbound step-token enumeration, and per-user state.
//!
//! Inbound `custom_id` strings are parsed exactly once, at the edge, into
//! the closed [`StepToken`] enumeration; from there on routing is an enum
//! match against an explicit transition table. A step only ever advances
//! forward, stays put on validation failure, or the whole state is
//! dropped — it never regresses.

use std::time::Instant;

use crate::gateway::ActingUser;

/// Correlation id of the panel entry button.
pub const START_BUTTON_ID: &str = "listing.start";

/// Form correlation ids, one per collection step.
pub const FORM_COUNT_ID: &str = "listing.count";
pub const FORM_PAYMENT_ID: &str = "listing.payment";
pub const FORM_ITEM_PREFIX: &str = "listing.item.";
pub const FORM_TAGS_ID: &str = "listing.tags";
pub const FORM_PHOTOS_ID: &str = "listing.photos";

/// Field ids carried end-to-end between the form builders and the engine.
pub const FIELD_COUNT: &str = "count";
pub const FIELD_INFO: &str = "info";
pub const FIELD_PAYMENT: &str = "payment";
pub const FIELD_SHIPPING: &str = "shipping";
pub const FIELD_NAME: &str = "name";
pub const FIELD_PRICE: &str = "price";
pub const FIELD_NOTES: &str = "notes";
pub const FIELD_PACKAGING: &str = "packaging";
pub const FIELD_CONDITION: &str = "condition";
pub const FIELD_TAGS: &str = "tags";
pub const FIELD_PHOTOS: &str = "photos";
pub const FIELD_CONFIRM: &str = "confirm";

/// The closed set of workflow-relevant correlation ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepToken {
    /// Entry button press.
    Start,
    /// Step 1 form: item count + general info.
    Count,
    /// Step 2 form: payment methods + shipping policy.
    PaymentShipping,
    /// Per-item form, 0-based index.
    Item(usize),
    /// Tag selection form.
    Tags,
    /// Photos + confirmation form.
    Photos,
}

impl StepToken {
    /// Parse an inbound `custom_id`. `None` for ids the workflow does not
    /// own.
    pub fn parse(custom_id: &str) -> Option<Self> {
        match custom_id {
            START_BUTTON_ID => Some(Self::Start),
            FORM_COUNT_ID => Some(Self::Count),
            FORM_PAYMENT_ID => Some(Self::PaymentShipping),
            FORM_TAGS_ID => Some(Self::Tags),
            FORM_PHOTOS_ID => Some(Self::Photos),
            other => other
                .strip_prefix(FORM_ITEM_PREFIX)
                .and_then(|index| index.parse().ok())
                .map(Self::Item),
        }
    }

    /// Render the correlation id this token stands for.
    pub fn custom_id(&self) -> String {
        match self {
            Self::Start => START_BUTTON_ID.to_string(),
            Self::Count => FORM_COUNT_ID.to_string(),
            Self::PaymentShipping => FORM_PAYMENT_ID.to_string(),
            Self::Item(index) => format!("{FORM_ITEM_PREFIX}{index}"),
            Self::Tags => FORM_TAGS_ID.to_string(),
            Self::Photos => FORM_PHOTOS_ID.to_string(),
        }
    }
}

/// The step a workflow is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CollectingCount,
    CollectingPaymentShipping,
    /// Waiting for item `i` of `item_total`.
    CollectingItem(usize),
    CollectingTags,
    CollectingPhotos,
}

impl Step {
    /// Transition table: the one token each step accepts. Anything else is
    /// a session-state error.
    pub fn accepts(&self, token: StepToken) -> bool {
        matches!(
            (self, token),
            (Self::CollectingCount, StepToken::Count)
                | (Self::CollectingPaymentShipping, StepToken::PaymentShipping)
                | (Self::CollectingTags, StepToken::Tags)
                | (Self::CollectingPhotos, StepToken::Photos)
        ) || matches!((self, token), (Self::CollectingItem(i), StepToken::Item(j)) if *i == j)
    }
}

/// Tag-step outcome. `Skipped` (catalog empty or unreachable) is distinct
/// from selecting nothing: a skipped step publishes untagged, while a real
/// selection that resolves to nothing refuses to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSelection {
    Skipped,
    Selected(Vec<String>),
}

/// One collected item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEntry {
    pub name: String,
    /// Normalized to two decimal places.
    pub price: String,
    pub notes: String,
    pub packaging: String,
    pub condition: String,
}

/// Per-user workflow state. Lives only for the duration of one run;
/// deliberately not persisted.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub user: ActingUser,
    pub step: Step,
    pub general_info: String,
    pub payment_methods: Vec<String>,
    pub shipping: String,
    pub item_total: usize,
    pub items: Vec<ItemEntry>,
    pub tags: Option<TagSelection>,
    pub photo_urls: Vec<String>,
    /// For the TTL sweep.
    pub touched_at: Instant,
}

impl WorkflowState {
    pub fn new(user: ActingUser) -> Self {
        Self {
            user,
            step: Step::CollectingCount,
            general_info: String::new(),
            payment_methods: Vec::new(),
            shipping: String::new(),
            item_total: 0,
            items: Vec::new(),
            tags: None,
            photo_urls: Vec::new(),
            touched_at: Instant::now(),
        }
    }

    /// Advance to the next step and refresh the TTL stamp.
    pub fn advance(&mut self, next: Step) {
        self.step = next;
        self.touched_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_parse_round_trips() {
        for token in [
            StepToken::Start,
            StepToken::Count,
            StepToken::PaymentShipping,
            StepToken::Item(0),
            StepToken::Item(7),
            StepToken::Tags,
            StepToken::Photos,
        ] {
            assert_eq!(StepToken::parse(&token.custom_id()), Some(token));
        }
    }

    #[test]
    fn foreign_ids_do_not_parse() {
        assert_eq!(StepToken::parse("other.module.button"), None);
        assert_eq!(StepToken::parse("listing.item.x"), None);
        assert_eq!(StepToken::parse(""), None);
    }

    #[test]
    fn each_step_accepts_exactly_its_token() {
        assert!(Step::CollectingCount.accepts(StepToken::Count));
        assert!(!Step::CollectingCount.accepts(StepToken::Photos));

        assert!(Step::CollectingItem(2).accepts(StepToken::Item(2)));
        assert!(!Step::CollectingItem(2).accepts(StepToken::Item(1)));
        assert!(!Step::CollectingItem(2).accepts(StepToken::Tags));

        assert!(Step::CollectingPhotos.accepts(StepToken::Photos));
        assert!(!Step::CollectingPhotos.accepts(StepToken::Count));
    }
}
