//! Low-level building blocks shared by the storage executors.

/// Readers-writer locks keyed by storage unit and file.
pub mod concurrency;
