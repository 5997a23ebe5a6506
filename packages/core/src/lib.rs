//! # scriptbridge-core
//!
//! Interpreter-agnostic building blocks of the scriptbridge host bridge.
//!
//! Script running inside a single-threaded interpreter cannot block on slow
//! host work, and cannot hold host-only resources (open byte streams, key
//! material) by value. This crate provides the pieces that make both possible:
//!
//! - [`IdGenerator`] produces opaque [`CorrelationId`] tokens.
//! - [`ResourceStore`] is a concurrent indirection table from token to
//!   host-owned [`StoredResource`].
//! - [`Executor`] spawns one worker per operation and delivers exactly one
//!   [`Settlement`] per operation back to the interpreter thread.
//!
//! ## Operation lifecycle
//!
//! ```text
//! interpreter thread                      worker thread
//! ------------------                      -------------
//! validate args (throw on error)
//! executor.spawn(op, work) -> OperationId
//!   register PendingOperation   ------->  work(&ctx) -> Completion
//!                                          Settler::settle(outcome)
//! executor.claim(settlement)    <-------   (or Settler drop guard)
//!   commit staged resources
//!   resolve / reject script promise
//! ```

pub mod deferred;
pub mod error;
pub mod executor;
pub mod id;
pub mod resource;

pub use deferred::{CancelToken, Completion, OperationId, Payload, Settlement, Settler};
pub use error::OperationError;
pub use executor::{Executor, PendingOperation, WorkerContext};
pub use id::{Clock, CorrelationId, IdGenerator, InvalidCorrelationId, SystemClock};
pub use resource::{ByteStream, KeyHandle, KeyKind, KeyMaterial, ResourceStore, StoredResource};
