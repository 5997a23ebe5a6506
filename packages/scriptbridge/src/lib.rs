//! # scriptbridge
//!
//! Umbrella crate re-exporting the scriptbridge layers:
//!
//! - [`core`]: correlation ids, the resource store and the deferred
//!   operation executor
//! - [`fetch`]: HTTP transport and in-process local handlers
//! - [`crypto`]: RSA key management behind opaque key descriptors
//! - [`runtime`]: the QuickJS embedding that ties them together
//!
//! Most hosts only need [`ScriptRuntime`]:
//!
//! ```ignore
//! use scriptbridge::{PathHandler, ScriptRuntime};
//!
//! let rt = ScriptRuntime::builder()
//!     .local_handler(PathHandler::new("/echo", 200, "ok"))
//!     .build()?;
//! let body = rt.run("let res = fetch('/echo').then((r) => r.text());")?;
//! assert_eq!(body, "ok");
//! ```

pub use scriptbridge_core as core;
pub use scriptbridge_crypto as crypto;
pub use scriptbridge_fetch as fetch;
pub use scriptbridge_runtime as runtime;

pub use scriptbridge_core::{CorrelationId, IdGenerator, OperationError, ResourceStore};
pub use scriptbridge_fetch::{FetchRequest, FetchResponse, FnHandler, LocalHandler, PathHandler};
pub use scriptbridge_runtime::{RuntimeBuilder, RuntimeConfig, RuntimeError, ScriptRuntime};
