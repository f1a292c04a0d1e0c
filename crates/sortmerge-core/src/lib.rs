#![forbid(unsafe_code)]
//! sortmerge-core: tuples, schemas, filter/projection descriptors, budget traits
//! and engine configuration shared by every crate of the sort-merge join engine.
//!
//! Pure data only; evaluation, buffering and I/O live in the other crates.

pub mod budget;
pub mod config;
pub mod error;
pub mod expr;
pub mod id;
pub mod order;
pub mod prelude;
pub mod schema;
pub mod types;
