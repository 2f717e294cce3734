//! Gateway layer: connection lifecycle and inbound event normalization.

pub mod connection;
pub mod dispatcher;
pub mod frames;

pub use connection::{DispatchEvent, GatewayClient, GatewayHandle};
pub use dispatcher::{ActingUser, Attachment, FieldValue, InteractionEvent, InteractionKind};
