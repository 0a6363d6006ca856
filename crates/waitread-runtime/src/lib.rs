//! Interception engine for waitread.
//!
//! Ties the tracing primitives of `waitread-core` to a growth policy: reads
//! of the watched file are held back until the file on disk has grown past
//! what the traced process has already consumed.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod growth;
