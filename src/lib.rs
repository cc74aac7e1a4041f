//! Query-rewrite and file-backed storage core of a federated polystore.
//!
//! [`query`] holds the predicate model, logical operator trees and the
//! rule-based rewrite engine that drives plans to a fixpoint. [`storage`]
//! holds the storage executor contract and a file-backed executor that pushes
//! filters down to key ranges and persists bitmap-encoded data views.

#![warn(missing_docs)]

pub mod primitives;
pub mod query;
pub mod storage;
pub mod types;
