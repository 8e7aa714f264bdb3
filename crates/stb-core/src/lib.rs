//! Core conversation logic for the sticker bot.
//!
//! This crate is intentionally transport-agnostic. The messaging transport and
//! media downloads live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod presence;
pub mod replies;
pub mod router;
pub mod session;
pub mod sticker;

pub use errors::{Error, Result, StickerError};
