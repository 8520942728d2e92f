//! Mattermost callback endpoints.

use axum::{
    Form, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use votebot_common::AppResult;

use crate::{
    command::strip_trigger,
    middleware::AppState,
    response::{ChatReply, no_reply},
};

/// Outgoing webhook payload.
#[derive(Debug, Deserialize)]
pub struct OutgoingWebhook {
    #[serde(default)]
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub trigger_word: String,
}

/// Slash command payload.
#[derive(Debug, Deserialize)]
pub struct SlashCommand {
    #[serde(default)]
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
}

/// Handle a post forwarded by an outgoing webhook.
///
/// Posts by the bot itself, posts from other channels and posts that do not
/// start with the trigger word get no reply.
async fn outgoing_webhook(
    State(state): State<AppState>,
    Form(hook): Form<OutgoingWebhook>,
) -> AppResult<Response> {
    if let Err(e) = state.verify_token(&hook.token) {
        tracing::warn!(user_id = %hook.user_id, channel_id = %hook.channel_id, "Rejected webhook with bad token");
        return Err(e);
    }

    let config = &state.mattermost;
    if config.bot_user_id.as_deref() == Some(hook.user_id.as_str()) {
        return Ok(no_reply());
    }
    if config
        .channel_id
        .as_deref()
        .is_some_and(|channel| channel != hook.channel_id)
    {
        tracing::debug!(channel_id = %hook.channel_id, "Ignoring post from another channel");
        return Ok(no_reply());
    }
    let Some(text) = strip_trigger(&hook.text, &config.trigger) else {
        return Ok(no_reply());
    };

    tracing::debug!(
        user_id = %hook.user_id,
        user_name = %hook.user_name,
        post_id = %hook.post_id,
        trigger_word = %hook.trigger_word,
        "Outgoing webhook command"
    );
    let reply = state.dispatcher.dispatch_text(&hook.user_id, text).await;
    Ok(ChatReply::comment(reply).into_response())
}

/// Handle a slash command invocation.
async fn slash_command(
    State(state): State<AppState>,
    Form(cmd): Form<SlashCommand>,
) -> AppResult<ChatReply> {
    if let Err(e) = state.verify_token(&cmd.token) {
        tracing::warn!(user_id = %cmd.user_id, command = %cmd.command, "Rejected slash command with bad token");
        return Err(e);
    }

    let text = strip_trigger(&cmd.text, &state.mattermost.trigger).unwrap_or(&cmd.text);
    tracing::debug!(
        user_id = %cmd.user_id,
        user_name = %cmd.user_name,
        channel_id = %cmd.channel_id,
        command = %cmd.command,
        "Slash command"
    );
    let reply = state.dispatcher.dispatch_text(&cmd.user_id, text).await;
    Ok(ChatReply::in_channel(reply))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/outgoing", post(outgoing_webhook))
        .route("/command", post(slash_command))
}
