//! Store entities.

pub mod poll;

pub use poll::Poll;
