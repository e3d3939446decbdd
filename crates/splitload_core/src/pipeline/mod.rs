//! Install and load batch pipelines.
//!
//! Install batches run first on the caller's thread; their results feed
//! load batches, which run serialized per runtime and activate modules on
//! the designated context.

pub mod install;
pub mod load;
