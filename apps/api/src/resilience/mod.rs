//! Bounded retry policies and cooperative cancellation shared by the
//! generation and render stages.

pub mod cancel;
pub mod retry;

pub use cancel::CancelSignal;
pub use retry::{retry, AttemptOutcome, AttemptRecord, RetryError, RetryPolicy, Step};
