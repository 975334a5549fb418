//! HTTP adapter to the external financial system ("SOF").
//!
//! [`SofClient`] implements [`engine::ExternalLedger`]: commitment inquiries
//! by note, process or budget line, and the budgeted-amount inquiry. Requests
//! failing with a transient status are retried per [`RetryPolicy`].

pub use client::{DEFAULT_BASE_URL, SofClient};
pub use error::{Result, SofError};
pub use retry::{RETRYABLE_STATUSES, RetryPolicy};

mod client;
mod error;
mod retry;
mod wire;
