//! Runtime components
//!
//! By default, background work such as per-connection tasks and HTTP/2
//! streams is spawned on the ambient tokio runtime. The [`Executor`] trait
//! lets that work be placed on a different executor instead.

pub use crate::common::exec::{BoxSendFuture, Executor};
