//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`locate`] - Single fix and continuous tracking from a fix recording
//! - [`geocode`] - Forward and reverse address lookups

pub mod common;
pub mod geocode;
pub mod locate;
