//! Common utilities shared by the tally crates.
#![warn(missing_docs)]

mod macros;
mod time;

pub use crate::time::*;
