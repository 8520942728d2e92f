//! Command dispatch and reply formatting.

use std::fmt::Write as _;

use votebot_common::AppError;
use votebot_core::{PollResults, PollService, PollSummary};

use crate::command::Command;

/// Reply to `help` and to anything that does not parse.
pub const HELP_TEXT: &str = "📝 **Available commands:**
/vote create [question] [option1] [option2]... - Create new poll
/vote vote [pollID] [option] - Vote in a poll
/vote results [pollID] - Show poll results
/vote close [pollID] - Close a poll (creator only)
/vote delete [pollID] - Delete a poll (creator only)
/vote list - Show active polls
Wrap multi-word arguments in double quotes.";

const STORE_TROUBLE: &str = "❌ Something went wrong while talking to the poll store. Please try again.";

const NO_ACTIVE_POLLS: &str = "No active polls available";

/// Turns chat commands into poll operations and their text replies.
#[derive(Clone)]
pub struct Dispatcher {
    polls: PollService,
    list_limit: usize,
}

impl Dispatcher {
    /// Create a dispatcher. Listings show at most `list_limit` polls.
    #[must_use]
    pub const fn new(polls: PollService, list_limit: usize) -> Self {
        Self { polls, list_limit }
    }

    /// Parse and run the text following the trigger word.
    pub async fn dispatch_text(&self, user_id: &str, text: &str) -> String {
        self.dispatch(user_id, Command::parse(text)).await
    }

    /// Run one command on behalf of `user_id`. Always yields exactly one reply.
    pub async fn dispatch(&self, user_id: &str, command: Command) -> String {
        let verb = command.verb();
        tracing::debug!(user_id, verb, "Dispatching command");

        let result = match command {
            Command::Create { question, options } => self
                .polls
                .create_poll(&question, &options, user_id)
                .await
                .map(|poll| {
                    format!(
                        "🗳️ New poll created!\nID: `{}`\nQuestion: {}\nOptions: {}",
                        poll.id,
                        poll.question,
                        quoted_list(&poll.labels())
                    )
                }),
            Command::Vote { poll_id, label } => self
                .polls
                .cast_vote(&poll_id, user_id, &label)
                .await
                .map(|receipt| {
                    format!(
                        "✅ Vote for '{}' recorded! It now has {}.",
                        receipt.label,
                        votes(receipt.count)
                    )
                }),
            Command::Results { poll_id } => self
                .polls
                .get_results(&poll_id)
                .await
                .map(|results| format_results(&results)),
            Command::Close { poll_id } => {
                self.polls
                    .close_poll(&poll_id, user_id)
                    .await
                    .map(|closed| {
                        if closed {
                            "✅ Poll closed!".to_string()
                        } else {
                            "ℹ️ This poll is already closed.".to_string()
                        }
                    })
            }
            Command::Delete { poll_id } => self
                .polls
                .delete_poll(&poll_id, user_id)
                .await
                .map(|()| "✅ Poll deleted!".to_string()),
            Command::List => {
                let polls = self.polls.active_polls(self.list_limit).await;
                Ok(format!("📋 Active polls:\n{}", format_summaries(&polls)))
            }
            Command::Help => Ok(HELP_TEXT.to_string()),
        };

        match result {
            Ok(reply) => reply,
            Err(err) => self.error_reply(verb, user_id, err).await,
        }
    }

    async fn error_reply(&self, verb: &str, user_id: &str, err: AppError) -> String {
        if err.is_server_error() {
            tracing::error!(verb, user_id, error = %err, code = err.error_code(), "Command failed");
        } else {
            tracing::debug!(verb, user_id, error = %err, code = err.error_code(), "Command rejected");
        }

        match err {
            AppError::InvalidArguments(reason) => format!("❌ {reason}"),
            AppError::PollNotFound(_) => {
                let polls = self.polls.active_polls(self.list_limit).await;
                format!("❌ Poll not found. Active polls:\n{}", format_summaries(&polls))
            }
            AppError::PollClosed(_) => "❌ This poll is closed".to_string(),
            AppError::UnknownOption { valid, .. } => {
                let mut reply = "❌ Invalid option. Valid options:".to_string();
                for label in valid {
                    let _ = write!(reply, "\n- {label}");
                }
                reply
            }
            AppError::AlreadyVoted(_) => "❌ You have already voted in this poll!".to_string(),
            AppError::NotCreator => format!("❌ Only the poll creator can {verb} it"),
            _ => STORE_TROUBLE.to_string(),
        }
    }
}

fn votes(count: u64) -> String {
    if count == 1 {
        "1 vote".to_string()
    } else {
        format!("{count} votes")
    }
}

fn quoted_list(labels: &[String]) -> String {
    labels
        .iter()
        .map(|label| format!("`{label}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_results(results: &PollResults) -> String {
    let mut reply = format!("📊 Results for poll *{}*\n", results.question);
    for (label, count) in &results.options {
        let _ = writeln!(reply, "- {label}: {}", votes(*count));
    }
    let _ = write!(reply, "\nTotal voters: {}", results.voter_count);
    if !results.active {
        reply.push_str("\nThis poll is closed.");
    }
    reply
}

fn format_summaries(polls: &[PollSummary]) -> String {
    if polls.is_empty() {
        return NO_ACTIVE_POLLS.to_string();
    }
    polls
        .iter()
        .map(|p| format!("- {}: {}", p.poll_id, p.question))
        .collect::<Vec<_>>()
        .join("\n")
}
