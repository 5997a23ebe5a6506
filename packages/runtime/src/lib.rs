//! # scriptbridge-runtime
//!
//! Embeds QuickJS and exposes a small web-platform surface to script:
//! `fetch` with `Headers`/`Request`/`Response`, `crypto.subtle` for RSA keys,
//! `crypto.randomUUID`/`getRandomValues`, `TextEncoder`/`TextDecoder`,
//! `atob`/`btoa` and `console`.
//!
//! Script runs on the thread that owns the [`ScriptRuntime`]. Host
//! operations run on workers and settle back through the core executor:
//!
//! ```text
//! script ── native ──▶ Executor::spawn ──▶ worker
//!   ▲                                        │
//!   └── __scriptbridge.settle ◀── deliver ◀──┘ Settlement
//! ```
//!
//! A run wraps the script so the promise bound to `res` reports through the
//! result or error channel. [`ScriptRuntime::run_promise`] pumps settlements
//! until one of them fires or the deadline passes.
//!
//! ```ignore
//! use scriptbridge_runtime::{RuntimeConfig, ScriptRuntime};
//!
//! let rt = ScriptRuntime::new(RuntimeConfig::default())?;
//! let status = rt.run(r#"
//!     let res = fetch("https://example.com").then((r) => r.status);
//! "#)?;
//! ```

mod bridge;
pub mod config;
pub mod convert;
pub mod error;
mod host;
mod runtime;

pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use runtime::{RuntimeBuilder, ScriptRuntime};
