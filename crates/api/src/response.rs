//! Webhook response types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Where Mattermost posts a command reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Threaded under the triggering post.
    Comment,
    /// Visible to the whole channel.
    InChannel,
}

/// Reply body understood by Mattermost webhooks and slash commands.
#[derive(Debug, Serialize)]
pub struct ChatReply {
    /// Message body.
    pub text: String,
    /// Where Mattermost shows it.
    pub response_type: ResponseType,
}

impl ChatReply {
    /// Reply threaded under the triggering post.
    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            response_type: ResponseType::Comment,
        }
    }

    /// Reply posted to the channel.
    pub fn in_channel(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            response_type: ResponseType::InChannel,
        }
    }
}

impl IntoResponse for ChatReply {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// No reply at all.
#[must_use]
pub fn no_reply() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_serialization() {
        let json = serde_json::to_value(ChatReply::comment("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"text": "hi", "response_type": "comment"}));

        let json = serde_json::to_value(ChatReply::in_channel("hi")).unwrap();
        assert_eq!(json["response_type"], "in_channel");
    }
}
