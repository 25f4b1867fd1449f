//! Test utilities for the fanflow crates.
//!
//! This crate provides:
//! - Reference predicates and their expected results (primality)
//! - Random timing jitter for exercising thread interleavings
//! - Process thread counting for leak checks
//!
//! # Usage
//!
//! This crate is intended for the fanflow test suites and the `fanflow-cmd` tool.

pub mod jitter;
pub mod primes;
pub mod threads;
