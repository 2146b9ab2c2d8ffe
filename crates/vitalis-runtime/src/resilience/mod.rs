//! Resilience patterns for vitalis-runtime.
//!
//! This module provides:
//! - The ordered chain of (provider, model) backends a request walks
//! - Retry with exponential backoff per backend

mod chain;
mod retry;

pub use chain::{BackendSlot, FallbackChain, DEFAULT_MODELS};
pub use retry::RetryPolicy;
