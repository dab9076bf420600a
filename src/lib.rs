//! Incremental computation over a dependency graph of adaptive values.
//!
//! Writes are collected in a [`Transaction`] and propagated to the dependents in level order
//! when it is committed. Derived values are recomputed lazily on the next read.

mod adaptive;
mod cell;
pub mod core;
mod effect;
mod error;
mod utils;

pub use adaptive::*;
pub use cell::*;
pub use crate::core::{
    AdaptiveObject, AdaptiveToken, CommitStats, EvaluationContext, IndirectOutput, Level,
    MarkOutcome, NodeHeader, NodeKey, Transaction, TransactionId, TransactionState, MAX_LEVEL,
};
pub use effect::*;
pub use error::*;
