//! Core data structures.

pub mod punch;

pub use punch::*;
