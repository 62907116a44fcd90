//! Common test utilities for offramp-preview integration tests

#[allow(dead_code)]
pub mod services;

pub use services::*;
