//! Replica Backend Library
//!
//! Exposes the replication engine for the `replica` binary and for tests.

pub mod replication;
