//! Module metadata and per-attempt result records.
//!
//! # Responsibility
//! - Define the descriptor/request shapes that cross capability boundaries.
//! - Define the brief-info and error records handed to reporters.
//!
//! # Invariants
//! - Descriptors are immutable once resolved from the info provider.
//! - Brief infos and module errors are built per attempt and never persisted.

pub mod error;
pub mod module;
