//! Event system for sowcrew runs
//!
//! This crate provides the event types emitted by the execution coordinator
//! and the bus live observers subscribe to.

mod bus;
mod types;

pub use bus::{EventBus, DEFAULT_BACKLOG};
pub use types::*;
