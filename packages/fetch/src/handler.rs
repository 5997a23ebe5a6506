//! In-process responders that stand in for the network.

use crate::error::FetchError;
use crate::headers::HeaderList;
use crate::types::{FetchRequest, FetchResponse};

/// A predicate-driven substitute for network I/O.
///
/// When [`matches`](LocalHandler::matches) accepts a request the fetcher calls
/// [`handle`](LocalHandler::handle) instead of the transport, and no socket is
/// opened.
pub trait LocalHandler: Send + Sync {
    fn matches(&self, request: &FetchRequest) -> bool;

    fn handle(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Local handler built from two closures.
pub struct FnHandler<M, H> {
    matches: M,
    handle: H,
}

impl<M, H> FnHandler<M, H>
where
    M: Fn(&FetchRequest) -> bool + Send + Sync,
    H: Fn(&FetchRequest) -> Result<FetchResponse, FetchError> + Send + Sync,
{
    pub fn new(matches: M, handle: H) -> Self {
        Self { matches, handle }
    }
}

impl<M, H> LocalHandler for FnHandler<M, H>
where
    M: Fn(&FetchRequest) -> bool + Send + Sync,
    H: Fn(&FetchRequest) -> Result<FetchResponse, FetchError> + Send + Sync,
{
    fn matches(&self, request: &FetchRequest) -> bool {
        (self.matches)(request)
    }

    fn handle(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        (self.handle)(request)
    }
}

/// Answers every request for one URL path with a fixed response.
#[derive(Debug, Clone)]
pub struct PathHandler {
    path: String,
    status: u16,
    headers: HeaderList,
    body: Vec<u8>,
}

impl PathHandler {
    pub fn new(path: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            status,
            headers: HeaderList::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl LocalHandler for PathHandler {
    fn matches(&self, request: &FetchRequest) -> bool {
        request.path() == self.path
    }

    fn handle(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut response = FetchResponse::new(self.status)
            .with_body(self.body.clone())
            .with_url(&request.url);
        response.headers = self.headers.clone();
        Ok(response)
    }
}
