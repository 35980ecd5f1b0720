//! `indexq-core` — the change-propagation job model.
//!
//! This crate contains the **pure** data model shared by the queue engine, the
//! consumer loop and the admin surface (no store or transport concerns).

pub mod change;
pub mod error;
pub mod id;
pub mod queue;

pub use change::{ChangeJob, Operation};
pub use error::{DomainError, DomainResult, HandlerError};
pub use id::JobId;
pub use queue::{QueueKind, QueueNames, QueueStats};
