//! # scriptbridge-fetch
//!
//! The fetch correlation layer: decodes a script-side request, serves it from
//! a local handler or the network, and decides whether the response body is
//! handed to script inline or left open in the resource store.
//!
//! ```ignore
//! use scriptbridge_fetch::{Fetcher, FetchRequest, PathHandler};
//!
//! let fetcher = Fetcher::builder()
//!     .local_handler(PathHandler::new("/echo", 200, "ok"))
//!     .build()?;
//!
//! // Served in process, no socket is opened.
//! let response = fetcher.fetch(&FetchRequest::get("http://localhost/echo"))?;
//! ```

pub mod error;
pub mod executor;
pub mod fetcher;
pub mod handler;
pub mod headers;
pub mod types;

pub use error::FetchError;
pub use executor::{HttpExecutor, ReqwestExecutor, DEFAULT_INLINE_BODY_LIMIT};
pub use fetcher::{into_response_like, Fetcher, FetcherBuilder, FetcherConfig, DEFAULT_USER_AGENT};
pub use handler::{FnHandler, LocalHandler, PathHandler};
pub use headers::HeaderList;
pub use types::{
    BodyType, FetchRequest, FetchResponse, Method, RedirectMode, ResponseBody, ResponseLike,
};
