//! Domain layer types and invariants.

pub mod diagnostics;
pub mod entries;
pub mod error;
pub mod scope;
pub mod strategy;
