//! Append-only store of completed run records.

mod store;
mod types;

pub use store::RunHistory;
pub use types::{ProcessingRun, Verdict};
