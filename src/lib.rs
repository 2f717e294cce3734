//! trinketbot: a marketplace listing bot for Discord forum channels.
//!
//! The crate is split along the runtime's seams: [`gateway`] owns the
//! websocket session and normalizes inbound interactions, [`workflow`]
//! drives the per-user listing state machine, [`listing`] publishes
//! completed runs as forum threads, and [`store`] persists the per-user
//! listing ledger. [`runtime`] ties them together in one event loop.

pub mod config;
pub mod error;
pub mod gateway;
pub mod listing;
pub mod modals;
pub mod rest;
pub mod runtime;
pub mod store;
pub mod workflow;

pub use config::Config;
pub use error::{Error, Result};
