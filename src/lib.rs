//! # Punch Clock
//!
//! Live punch tracking and work-duration reconciliation against a remote
//! attendance service.
//!
//! ## Architecture
//!
//! - **models**: Punch state and its sequenced reducer
//! - **calculate**: Pure worked/remaining/overtime arithmetic
//! - **client**: Attendance service HTTP client
//! - **engine**: Ticker, reconciler and punch mutator coordination
//! - **clock** / **geo** / **notify**: Injectable collaborator seams
//! - **config**: Configuration loading and validation

pub mod calculate;
pub mod client;
pub mod clock;
pub mod config;
pub mod engine;
pub mod geo;
pub mod models;
pub mod notify;

pub use models::*;

/// Format a second count as `HH:MM:SS`.
pub fn format_hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Format a minute count as `HH:MM`.
pub fn format_hm(total_minutes: i64) -> String {
    let total_minutes = total_minutes.max(0);
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}
