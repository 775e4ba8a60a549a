//! Montage Core - Foundation types for the timeline engine
//!
//! This crate provides the fundamental types used throughout Montage:
//! - Time representation (RationalTime, TimeRange)
//! - The error taxonomy shared by all editing and persistence operations

pub mod error;
pub mod time;

pub use error::{MontageError, Result};
pub use time::{RationalTime, TimeRange};
