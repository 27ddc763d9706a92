//! Analysis modules.
//!
//! This module turns the engine's event stream into the per-run outcome
//! tree.

pub mod aggregator;

pub use aggregator::*;
