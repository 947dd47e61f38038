//! Dependency resolution tests
//!
//! Required edges wait for every required source, optional-only nodes run on the first
//! source that settles.

mod optional;
mod required;
