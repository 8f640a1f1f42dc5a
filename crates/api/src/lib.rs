//! HTTP API: job submission, polling and service wiring.

pub mod app;
pub mod config;
