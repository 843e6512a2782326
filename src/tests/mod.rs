//! Crate-private test support.

pub mod helpers;
