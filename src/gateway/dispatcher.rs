//! Event dispatcher: normalizes raw INTERACTION_CREATE dispatches.
//!
//! Everything downstream of the gateway works with [`InteractionEvent`];
//! nothing else in the crate touches raw interaction JSON. This layer only
//! normalizes — it never replies.

use std::collections::HashMap;

use serde_json::Value;

/// Administrator bit in the member permission mask.
pub const PERMISSION_ADMINISTRATOR: u64 = 1 << 3;

const CDN_BASE: &str = "https://cdn.discordapp.com";

/// The interaction kinds the workflow engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    SlashCommand,
    ButtonPress,
    SelectionSubmit,
    FormSubmit,
}

/// The user acting on an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingUser {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

/// A single submitted form field, keyed by its field id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Selection(Vec<String>),
    Attachments(Vec<Attachment>),
}

/// An uploaded file reference resolved to its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub url: String,
}

/// One normalized user-triggered interaction.
#[derive(Debug, Clone)]
pub struct InteractionEvent {
    /// Interaction id, half of the reply handle.
    pub id: String,
    /// Reply token, the other half of the reply handle.
    pub token: String,
    pub kind: InteractionKind,
    pub user: ActingUser,
    /// Roles of the acting member (empty outside a guild context).
    pub member_roles: Vec<String>,
    /// Permission mask of the acting member.
    pub member_permissions: u64,
    /// Command name for slash commands.
    pub command_name: Option<String>,
    /// Component or form correlation id.
    pub custom_id: Option<String>,
    /// Field id → submitted value, for form submissions.
    pub fields: HashMap<String, FieldValue>,
}

/// Normalize a raw interaction payload. Returns `None` for interaction
/// types the bot does not handle (autocomplete, pings).
pub fn normalize(payload: &Value) -> Option<InteractionEvent> {
    let id = payload.get("id")?.as_str()?.to_string();
    let token = payload.get("token")?.as_str()?.to_string();
    let data = payload.get("data").cloned().unwrap_or(Value::Null);

    let kind = match payload.get("type")?.as_u64()? {
        2 => InteractionKind::SlashCommand,
        3 => match data.get("component_type").and_then(Value::as_u64) {
            Some(2) => InteractionKind::ButtonPress,
            Some(3) => InteractionKind::SelectionSubmit,
            _ => return None,
        },
        5 => InteractionKind::FormSubmit,
        _ => return None,
    };

    let user = acting_user(payload)?;
    let member = payload.get("member");
    let member_roles = member
        .and_then(|m| m.get("roles"))
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let member_permissions = member
        .and_then(|m| m.get("permissions"))
        .and_then(Value::as_str)
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);

    let command_name = (kind == InteractionKind::SlashCommand)
        .then(|| data.get("name").and_then(Value::as_str).map(String::from))
        .flatten();
    let custom_id = data
        .get("custom_id")
        .and_then(Value::as_str)
        .map(String::from);

    let mut fields = HashMap::new();
    if kind == InteractionKind::FormSubmit {
        let resolved = data.get("resolved").cloned().unwrap_or(Value::Null);
        if let Some(components) = data.get("components").and_then(Value::as_array) {
            collect_fields(components, &resolved, &mut fields);
        }
    }

    Some(InteractionEvent {
        id,
        token,
        kind,
        user,
        member_roles,
        member_permissions,
        command_name,
        custom_id,
        fields,
    })
}

impl InteractionEvent {
    /// True when the acting member is an administrator or holds one of the
    /// given roles.
    pub fn is_admin(&self, admin_role_ids: &[String]) -> bool {
        self.member_permissions & PERMISSION_ADMINISTRATOR != 0
            || self.member_roles.iter().any(|r| admin_role_ids.contains(r))
    }

    pub fn text_field(&self, field_id: &str) -> Option<&str> {
        match self.fields.get(field_id)? {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn selection_field(&self, field_id: &str) -> Option<&[String]> {
        match self.fields.get(field_id)? {
            FieldValue::Selection(values) => Some(values),
            _ => None,
        }
    }

    pub fn attachment_field(&self, field_id: &str) -> Option<&[Attachment]> {
        match self.fields.get(field_id)? {
            FieldValue::Attachments(files) => Some(files),
            _ => None,
        }
    }
}

fn acting_user(payload: &Value) -> Option<ActingUser> {
    let user = payload
        .get("member")
        .and_then(|m| m.get("user"))
        .or_else(|| payload.get("user"))?;
    let id = user.get("id")?.as_str()?.to_string();
    let username = user.get("username").and_then(Value::as_str).unwrap_or("");
    let display_name = user
        .get("global_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(username)
        .to_string();
    let avatar_url = match user.get("avatar").and_then(Value::as_str) {
        Some(hash) if !hash.is_empty() => format!("{CDN_BASE}/avatars/{id}/{hash}.png"),
        _ => format!("{CDN_BASE}/embed/avatars/0.png"),
    };
    Some(ActingUser {
        id,
        display_name,
        avatar_url,
    })
}

/// Walk the component tree of a form submission into a flat field map.
///
/// Fields arrive either wrapped in a label component or inside action
/// rows; both nest the actual input one level down.
fn collect_fields(components: &[Value], resolved: &Value, fields: &mut HashMap<String, FieldValue>) {
    for component in components {
        if let Some(inner) = component.get("component") {
            collect_field(inner, resolved, fields);
        }
        if let Some(nested) = component.get("components").and_then(Value::as_array) {
            collect_fields(nested, resolved, fields);
        }
        collect_field(component, resolved, fields);
    }
}

fn collect_field(component: &Value, resolved: &Value, fields: &mut HashMap<String, FieldValue>) {
    let Some(field_id) = component.get("custom_id").and_then(Value::as_str) else {
        return;
    };
    let value = match component.get("type").and_then(Value::as_u64) {
        // Text input
        Some(4) => FieldValue::Text(
            component
                .get("value")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        ),
        // String select
        Some(3) => FieldValue::Selection(
            component
                .get("values")
                .and_then(Value::as_array)
                .map(|values| {
                    values
                        .iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        ),
        // File upload: values are attachment ids resolved out of band.
        Some(19) => {
            let attachments = resolved.get("attachments");
            FieldValue::Attachments(
                component
                    .get("values")
                    .and_then(Value::as_array)
                    .map(|ids| {
                        ids.iter()
                            .filter_map(Value::as_str)
                            .filter_map(|id| {
                                let url = attachments?
                                    .get(id)?
                                    .get("url")?
                                    .as_str()?
                                    .to_string();
                                Some(Attachment {
                                    id: id.to_string(),
                                    url,
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            )
        }
        _ => return,
    };
    fields.insert(field_id.to_string(), value);
}
