//! Voting engine for votebot.

pub mod services;

pub use services::*;
