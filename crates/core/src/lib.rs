//! `catalogsync-core` — shared foundation types.
//!
//! This crate contains **pure** primitives (no infrastructure concerns): strongly
//! typed identifiers and the validation error model used by every other crate.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::JobId;
