pub mod common;
pub mod completions;
pub mod order;
pub mod queue;
pub mod sync;
