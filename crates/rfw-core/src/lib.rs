//! Core domain + forwarding pipeline for the restricted forwarder.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind ports
//! (traits) implemented in the adapter crate.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod governor;
pub mod locator;
pub mod logging;
pub mod messaging;
pub mod remote;
pub mod security;
pub mod sequencer;
pub mod status;
#[cfg(test)]
mod testing;
pub mod tracker;
pub mod transfer;
pub mod utils;

pub use errors::{Error, Result};
