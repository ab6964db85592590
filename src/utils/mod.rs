// Private module declarations
mod retry;

pub use retry::{retry_with_backoff, IsTransient, RetryConfig, RetryResult};
