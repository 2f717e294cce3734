//! Per-step input validation.
//!
//! Every function here rejects without touching workflow state; the engine
//! only advances on `Ok`.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::WorkflowError;

/// Inclusive item-count bounds per listing.
pub const MIN_ITEMS: usize = 1;
pub const MAX_ITEMS: usize = 10;

/// Inclusive photo-attachment bounds per listing.
pub const MIN_PHOTOS: usize = 1;
pub const MAX_PHOTOS: usize = 10;

/// Parse the item count: a whole number between 1 and 10.
pub fn item_count(raw: &str) -> Result<usize, WorkflowError> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|count| (MIN_ITEMS..=MAX_ITEMS).contains(count))
        .ok_or_else(|| {
            WorkflowError::InvalidInput(format!(
                "Please enter a whole number between {MIN_ITEMS} and {MAX_ITEMS}."
            ))
        })
}

/// Parse a price: currency symbols and thousands separators are stripped,
/// the value must be strictly positive, and the result is normalized to
/// two decimal places.
pub fn price(raw: &str) -> Result<String, WorkflowError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    let value = Decimal::from_str(&cleaned)
        .ok()
        .filter(|value| value.is_sign_positive() && !value.is_zero())
        .ok_or_else(|| {
            WorkflowError::InvalidInput(
                "Price must be a positive number (e.g. 25.00).".to_string(),
            )
        })?;
    Ok(format!(
        "{:.2}",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    ))
}

/// Validate the photo confirmation: a case-insensitive match of the whole
/// token `YES`.
pub fn confirmation(raw: &str) -> Result<(), WorkflowError> {
    if raw.trim().eq_ignore_ascii_case("YES") {
        Ok(())
    } else {
        Err(WorkflowError::InvalidInput(
            "You must type YES to confirm every photo includes the required handwritten note."
                .to_string(),
        ))
    }
}

/// Validate the number of uploaded photos.
pub fn photo_count(count: usize) -> Result<(), WorkflowError> {
    if (MIN_PHOTOS..=MAX_PHOTOS).contains(&count) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidInput(format!(
            "Please upload between {MIN_PHOTOS} and {MAX_PHOTOS} photos."
        )))
    }
}

/// Validate a tag selection submit: at least one id. Unknown ids are
/// dropped later, at the terminal step, not here.
pub fn tag_selection(selected: &[String]) -> Result<(), WorkflowError> {
    if selected.is_empty() {
        Err(WorkflowError::InvalidInput(
            "Please select at least one tag.".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Require a non-empty text field.
pub fn required_text(field: &str, raw: &str) -> Result<String, WorkflowError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(WorkflowError::InvalidInput(format!(
            "Please fill in the {field} field."
        )))
    } else {
        Ok(trimmed.to_string())
    }
}
