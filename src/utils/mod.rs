//! The `utils` module provides shared definitions used across `popmesh`:
//! the crate-wide error type and the logging bootstrap.

pub mod error;
pub mod logging;
