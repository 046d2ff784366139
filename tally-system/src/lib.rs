//! Foundational system components for tally's services.
//!
//! Services own their state exclusively and are only reachable through a bounded [`Addr`]. A
//! [`Controller`] broadcasts the process shutdown to all services that hold a
//! [`ShutdownHandle`].
#![warn(missing_docs)]

mod controller;
mod service;

pub use self::controller::*;
pub use self::service::*;
