//! Integration test crate for the Montage timeline engine.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on montage-core and montage-timeline to verify they work
//! together.

#[cfg(test)]
mod timeline;

#[cfg(test)]
mod undo;
