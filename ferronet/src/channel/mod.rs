//! Channel layer for pattern matching and synchronized I/O.
//!
//! This module handles the interactive session stream, including
//! pattern-based prompt detection and ANSI stripping.

mod buffer;
mod patterns;
mod sync;

pub use buffer::PatternBuffer;
pub use patterns::{Expectation, joined_prompt_pattern};
pub use sync::{Channel, ChannelConfig};
