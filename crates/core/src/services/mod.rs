//! Business logic services.

#![allow(missing_docs)]

pub mod poll;
pub mod retry;

pub use poll::{PollResults, PollService, PollSummary, VoteReceipt};
pub use retry::{RetryPolicy, StoreAccess};
