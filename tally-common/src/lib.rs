//! # Tally Common Library
//!
//! Shared code for Tally services including:
//! - Error types
//! - Configuration loading and root folder resolution
//! - Event types (TallyEvent) and the broadcast EventBus
//! - Server-Sent Events helpers
//! - Survey definitions and the read-only survey catalog
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod survey;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, TallyEvent};
pub use survey::{FormField, Survey, SurveyCatalog};
