//! Domain types shared by every sowcrew crate.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::{CoreError, Result};
