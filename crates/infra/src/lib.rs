//! Infrastructure layer: list stores, the queue engine and its consumer loop.

pub mod jobs;
pub mod list_store;
