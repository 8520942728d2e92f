//! Common utilities and shared types for votebot.
//!
//! This crate provides foundational components used across all votebot crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: The poll error taxonomy via [`AppError`] and [`AppResult`]
//! - **ID Generation**: Random 128-bit poll identifiers via [`IdGenerator`]
//!
//! # Example
//!
//! ```no_run
//! use votebot_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID: {} (store: {:?})", id, config.store.backend);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
