//! Event log and the summaries built from it.

pub mod logger;
pub mod reporter;
