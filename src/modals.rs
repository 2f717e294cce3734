//! Modal and panel payload builders.
//!
//! These emit opaque interaction payloads; the engine never inspects them.
//! Field and form correlation ids come from the same constants the step
//! tokens parse, so field identity is carried end-to-end.

use serde_json::{json, Value};

use crate::rest::ForumTag;
use crate::workflow::steps::{
    StepToken, FIELD_CONDITION, FIELD_CONFIRM, FIELD_COUNT, FIELD_INFO, FIELD_NAME, FIELD_NOTES,
    FIELD_PACKAGING, FIELD_PAYMENT, FIELD_PHOTOS, FIELD_PRICE, FIELD_SHIPPING, FIELD_TAGS,
    START_BUTTON_ID,
};
use crate::workflow::validate::{MAX_ITEMS, MAX_PHOTOS, MIN_ITEMS, MIN_PHOTOS};

const PAYMENT_OPTIONS: &[(&str, &str)] = &[
    ("PayPal G&S", "PayPal G&S"),
    ("Venmo G&S", "Venmo G&S"),
    ("Other", "Other"),
];

const SHIPPING_OPTIONS: &[(&str, &str)] = &[
    ("Included in price", "included"),
    ("Additional (buyer pays)", "additional"),
];

const PACKAGING_OPTIONS: &[(&str, &str)] = &[
    ("Box sealed", "Box sealed"),
    ("Box resealed", "Box resealed"),
    ("No box", "No box"),
    ("Tags attached", "Tags attached"),
    ("Tags detached", "Tags detached"),
    ("No tags", "No tags"),
    ("Other (see notes)", "Other (see notes)"),
];

const CONDITION_OPTIONS: &[(&str, &str)] = &[
    ("Sealed", "Sealed"),
    ("Opened", "Opened"),
    ("New", "New"),
    ("Other (see notes)", "Other (see notes)"),
];

/// Human label for a stored shipping value.
pub fn shipping_label(value: &str) -> &'static str {
    if value == "included" {
        "Included in price"
    } else {
        "Additional (buyer pays)"
    }
}

fn label(text: &str, description: &str, component: Value) -> Value {
    json!({
        "type": 18,
        "label": text,
        "description": description,
        "component": component,
    })
}

fn text_input(field_id: &str, placeholder: &str, paragraph: bool, required: bool) -> Value {
    json!({
        "type": 4,
        "custom_id": field_id,
        "style": if paragraph { 2 } else { 1 },
        "placeholder": placeholder,
        "required": required,
    })
}

fn string_select(field_id: &str, options: &[(&str, &str)], min: usize, max: usize) -> Value {
    let options: Vec<Value> = options
        .iter()
        .map(|(label, value)| json!({ "label": label, "value": value }))
        .collect();
    json!({
        "type": 3,
        "custom_id": field_id,
        "options": options,
        "min_values": min,
        "max_values": max,
        "required": true,
    })
}

fn file_upload(field_id: &str, min: usize, max: usize) -> Value {
    json!({
        "type": 19,
        "custom_id": field_id,
        "min_values": min,
        "max_values": max,
        "required": true,
    })
}

/// Step 1: item count + optional general info.
pub fn count_modal() -> Value {
    json!({
        "custom_id": StepToken::Count.custom_id(),
        "title": "Create Listing — Step 1",
        "components": [
            label(
                &format!("How many items? ({MIN_ITEMS}–{MAX_ITEMS})"),
                "Enter a whole number",
                text_input(FIELD_COUNT, "e.g. 3", false, true),
            ),
            label(
                "General info (optional)",
                "Shipping notes, bundle deals, location…",
                text_input(FIELD_INFO, "", true, false),
            ),
        ],
    })
}

/// Step 2: payment methods + shipping policy.
pub fn payment_modal() -> Value {
    json!({
        "custom_id": StepToken::PaymentShipping.custom_id(),
        "title": "Create Listing — Step 2",
        "components": [
            label(
                "Payment methods",
                "Select all that apply",
                string_select(FIELD_PAYMENT, PAYMENT_OPTIONS, 1, PAYMENT_OPTIONS.len()),
            ),
            label(
                "Shipping policy",
                "Is shipping included or additional?",
                string_select(FIELD_SHIPPING, SHIPPING_OPTIONS, 1, 1),
            ),
        ],
    })
}

/// Per-item form, `index` 0-based out of `total`.
pub fn item_modal(index: usize, total: usize) -> Value {
    json!({
        "custom_id": StepToken::Item(index).custom_id(),
        "title": format!("Item {} of {}", index + 1, total),
        "components": [
            label(
                "Item name",
                "Full name of the item",
                text_input(FIELD_NAME, "", false, true),
            ),
            label(
                "Price (USD)",
                "Number only, no $ symbol",
                text_input(FIELD_PRICE, "35.00", false, true),
            ),
            label(
                "Notes (optional)",
                "Condition details, flaws, extras",
                text_input(FIELD_NOTES, "", true, false),
            ),
            label(
                "Packaging condition",
                "How is the item packaged?",
                string_select(FIELD_PACKAGING, PACKAGING_OPTIONS, 1, 1),
            ),
            label(
                "Item condition",
                "What condition is the item itself?",
                string_select(FIELD_CONDITION, CONDITION_OPTIONS, 1, 1),
            ),
        ],
    })
}

/// Tag selection form built from the live catalog.
pub fn tags_modal(catalog: &[ForumTag]) -> Value {
    let options: Vec<Value> = catalog
        .iter()
        .map(|tag| json!({ "label": tag.name, "value": tag.id }))
        .collect();
    let max = options.len().min(25);
    json!({
        "custom_id": StepToken::Tags.custom_id(),
        "title": "Create Listing — Tags",
        "components": [
            label(
                "Listing tags",
                "Select all tags that describe your items",
                json!({
                    "type": 3,
                    "custom_id": FIELD_TAGS,
                    "options": options,
                    "min_values": 1,
                    "max_values": max,
                    "required": true,
                }),
            ),
        ],
    })
}

/// Photos + confirmation form.
pub fn photos_modal() -> Value {
    json!({
        "custom_id": StepToken::Photos.custom_id(),
        "title": "Create Listing — Photos",
        "components": [
            label(
                &format!("Photos ({MIN_PHOTOS}–{MAX_PHOTOS} files)"),
                "Each photo must show a handwritten note: username, server name, today's date",
                file_upload(FIELD_PHOTOS, MIN_PHOTOS, MAX_PHOTOS),
            ),
            label(
                "Confirm handwritten note",
                "Type YES to confirm every photo includes the required note",
                text_input(FIELD_CONFIRM, "YES", false, true),
            ),
        ],
    })
}

/// The panel message with the entry button, posted by `setup_marketplace`.
pub fn panel_message(embed_color: u32, cooldown_days: i64) -> Value {
    json!({
        "embeds": [{
            "title": "Marketplace Listings",
            "color": embed_color,
            "description": format!(
                "Ready to sell? Click **Create Listing** to build your shop post!\n\n\
                 **Requirements:**\n\
                 - Photos must include a handwritten note: username, server name, and today's date\n\
                 - {MIN_PHOTOS}–{MAX_PHOTOS} photos required\n\
                 - One listing per **{cooldown_days} days**\n\n\
                 Creating a new listing will automatically close your previous one."
            ),
        }],
        "components": [{
            "type": 1,
            "components": [{
                "type": 2,
                "style": 2,
                "label": "Create Listing",
                "custom_id": START_BUTTON_ID,
            }],
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modal_ids_round_trip_through_step_tokens() {
        for (modal, token) in [
            (count_modal(), StepToken::Count),
            (payment_modal(), StepToken::PaymentShipping),
            (item_modal(2, 5), StepToken::Item(2)),
            (tags_modal(&[ForumTag { id: "t1".into(), name: "Plush".into() }]), StepToken::Tags),
            (photos_modal(), StepToken::Photos),
        ] {
            let custom_id = modal["custom_id"].as_str().unwrap();
            assert_eq!(StepToken::parse(custom_id), Some(token));
        }
    }

    #[test]
    fn item_modal_title_is_one_based() {
        let modal = item_modal(0, 3);
        assert_eq!(modal["title"], "Item 1 of 3");
    }

    #[test]
    fn tags_modal_caps_max_values_at_catalog_size() {
        let catalog = vec![
            ForumTag { id: "a".into(), name: "A".into() },
            ForumTag { id: "b".into(), name: "B".into() },
        ];
        let modal = tags_modal(&catalog);
        assert_eq!(modal["components"][0]["component"]["max_values"], 2);
    }

    #[test]
    fn panel_button_uses_start_id() {
        let panel = panel_message(0xe0ad76, 14);
        assert_eq!(
            panel["components"][0]["components"][0]["custom_id"],
            START_BUTTON_ID
        );
    }
}
