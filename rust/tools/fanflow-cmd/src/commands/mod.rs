//! Command implementations for fanflow-cmd

pub mod find;
pub mod leak_check;
pub mod primes;
