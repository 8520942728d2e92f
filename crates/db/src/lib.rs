//! Poll storage for votebot.
//!
//! [`entities`] holds the poll record and its invariants, [`tuple`] its wire
//! layout, and [`repositories`] the store adapters that persist it.

pub mod entities;
pub mod repositories;
pub mod tuple;

use std::sync::Arc;

use tracing::{info, warn};
use votebot_common::config::StoreBackend;
use votebot_common::{AppResult, Config};

pub use repositories::{DynPollStore, PollFilter, PollStore, ScanCursor, VoteOutcome};

/// Open the poll store selected by `config.store.backend`.
pub async fn connect(config: &Config) -> AppResult<DynPollStore> {
    match config.store.backend {
        StoreBackend::Redis => {
            info!(url = %config.redis.url, "Connecting to Redis...");
            let store = repositories::RedisPollStore::connect(&config.redis, &config.store).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory poll store; polls are lost on restart");
            Ok(Arc::new(repositories::MemoryPollStore::new()))
        }
    }
}
