//! Shared handler state.

#![allow(missing_docs)]

use std::sync::Arc;

use votebot_common::config::MattermostConfig;
use votebot_common::{AppError, AppResult};

use crate::dispatcher::Dispatcher;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub mattermost: Arc<MattermostConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, mattermost: MattermostConfig) -> Self {
        if mattermost.tokens.is_empty() {
            tracing::warn!("No Mattermost tokens configured; webhook requests are not verified");
        }
        Self {
            dispatcher,
            mattermost: Arc::new(mattermost),
        }
    }

    /// Check a request token against the configured ones.
    ///
    /// With no tokens configured every request passes.
    pub fn verify_token(&self, token: &str) -> AppResult<()> {
        let tokens = &self.mattermost.tokens;
        if tokens.is_empty() || tokens.iter().any(|t| t == token) {
            Ok(())
        } else {
            Err(AppError::Unauthorized)
        }
    }
}
