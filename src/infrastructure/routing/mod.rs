//! Retry and multi-model routing

mod dispatcher;
mod retry;

pub use dispatcher::{order_models, DispatchOutcome, ModelDispatcher};
pub use retry::{failure_message, RetryExecutor, DEFAULT_JITTER_MS};
