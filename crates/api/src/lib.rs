//! Chat front end for votebot.
//!
//! - **Command**: tokenizing and parsing `/vote` commands
//! - **Dispatcher**: running commands and formatting the text replies
//! - **Endpoints**: Mattermost outgoing webhook and slash command callbacks
//!
//! Built on Axum 0.8.

pub mod command;
pub mod dispatcher;
pub mod endpoints;
pub mod middleware;
pub mod response;

pub use command::Command;
pub use dispatcher::Dispatcher;
pub use endpoints::router;
