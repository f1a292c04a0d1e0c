#![forbid(unsafe_code)]
//! sortmerge-mem: Hard memory budgeting and the sort-run spill manager.
//!
//! This crate provides concrete implementations for the *interfaces* defined
//! in `sortmerge-core::budget`. Every buffer the join or the external sort
//! keeps alive is accounted through a `BudgetGuardImpl` so the page budget is a
//! hard ceiling, never a hint.
//!
//! No object-store IO lives here. A generic `Storage` trait is exposed
//! (in `spill::`) and implemented by `sortmerge-io`.

pub mod error;
pub mod guard;
pub mod spill;
pub mod tracking;

pub use guard::{BudgetGuardImpl, MemoryBudgetImpl};
pub use spill::{Codec, SpillManager, Storage};
pub use tracking::PeakTracker;
