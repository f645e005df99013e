//! Crate-wide test support and end-to-end pipeline tests.

pub mod support;
