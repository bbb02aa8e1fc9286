//! Phase-scoped middleware wrapped around every call.

pub mod entry;
pub mod pipeline;

pub use entry::{HookCall, HookEntry, HookFn};
pub use pipeline::{HookPipeline, Stage};
