use std::sync::Arc;
use std::time::Duration;

use scriptbridge_core::{ByteStream, Completion, CorrelationId, WorkerContext};

use crate::error::FetchError;
use crate::executor::{HttpExecutor, ReqwestExecutor, DEFAULT_INLINE_BODY_LIMIT};
use crate::handler::LocalHandler;
use crate::types::{BodyType, FetchRequest, FetchResponse, ResponseBody, ResponseLike};

pub const DEFAULT_USER_AGENT: &str = concat!("scriptbridge/", env!("CARGO_PKG_VERSION"));

/// Transport settings for a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Whole-request timeout applied by the network transport.
    pub request_timeout: Duration,
    /// Largest declared body length returned inline instead of as a stream.
    pub inline_body_limit: u64,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            inline_body_limit: DEFAULT_INLINE_BODY_LIMIT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Routes a request to the local handler or the network.
#[derive(Clone)]
pub struct Fetcher {
    executor: Arc<dyn HttpExecutor>,
    local: Option<Arc<dyn LocalHandler>>,
}

impl Fetcher {
    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::default()
    }

    /// Fetcher with default settings and no local handler.
    pub fn with_defaults() -> Result<Self, FetchError> {
        Self::builder().build()
    }

    pub fn local_handler(&self) -> Option<&Arc<dyn LocalHandler>> {
        self.local.as_ref()
    }

    /// Perform `request`, blocking the calling thread.
    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        if let Some(local) = &self.local {
            if local.matches(request) {
                tracing::debug!(url = %request.url, method = ?request.method, "served by local handler");
                return local.handle(request);
            }
        }

        tracing::debug!(url = %request.url, method = ?request.method, "sending request");
        self.executor.execute(request)
    }

    /// Fetch on a worker, staging a streamed body under a fresh id.
    pub fn fetch_completion(
        &self,
        request: &FetchRequest,
        ctx: &WorkerContext,
    ) -> Result<Completion, FetchError> {
        let response = self.fetch(request)?;
        let (like, stream) = into_response_like(response, || ctx.generate_id());
        let mut completion = Completion::json(serde_json::to_value(&like)?);
        if let Some((id, stream)) = stream {
            completion = completion.with_resource(id, stream);
        }
        Ok(completion)
    }
}

/// Split a response into its script-visible shape and, for streamed bodies,
/// the stream to store under the minted id.
///
/// Only valid UTF-8 travels inline; other inline bytes are staged as a
/// stream so `arrayBuffer()` sees them unchanged.
pub fn into_response_like(
    response: FetchResponse,
    mint: impl FnOnce() -> CorrelationId,
) -> (ResponseLike, Option<(CorrelationId, ByteStream)>) {
    let ok = response.is_success();
    let stream = match response.body {
        ResponseBody::Inline(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Err(text),
            Err(invalid) => {
                tracing::debug!(url = %response.url, "inline body is not UTF-8, staging it");
                Ok(ByteStream::from_bytes(invalid.into_bytes()))
            }
        },
        ResponseBody::Stream(stream) => Ok(stream),
    };
    let (body, body_type, stream) = match stream {
        Err(text) => (text, BodyType::Inline, None),
        Ok(stream) => {
            let id = mint();
            (id.to_string(), BodyType::Stream, Some((id, stream)))
        }
    };

    let like = ResponseLike {
        status: response.status,
        status_text: response.status_text,
        ok,
        url: response.url,
        redirected: response.redirected,
        headers: response.headers,
        body,
        body_type,
    };
    (like, stream)
}

#[derive(Default)]
pub struct FetcherBuilder {
    config: FetcherConfig,
    executor: Option<Arc<dyn HttpExecutor>>,
    local: Option<Arc<dyn LocalHandler>>,
}

impl FetcherBuilder {
    pub fn config(mut self, config: FetcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the reqwest transport.
    pub fn executor(mut self, executor: Arc<dyn HttpExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn local_handler(mut self, handler: impl LocalHandler + 'static) -> Self {
        self.local = Some(Arc::new(handler));
        self
    }

    pub fn shared_local_handler(mut self, handler: Arc<dyn LocalHandler>) -> Self {
        self.local = Some(handler);
        self
    }

    pub fn build(self) -> Result<Fetcher, FetchError> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(ReqwestExecutor::new(
                self.config.request_timeout,
                self.config.inline_body_limit,
                &self.config.user_agent,
            )?),
        };
        Ok(Fetcher {
            executor,
            local: self.local,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::mock::MockExecutor;
    use crate::handler::PathHandler;
    use scriptbridge_core::IdGenerator;

    fn fetcher_with(mock: &MockExecutor) -> Fetcher {
        Fetcher::builder()
            .executor(Arc::new(mock.clone()))
            .local_handler(PathHandler::new("/echo", 200, "ok"))
            .build()
            .unwrap()
    }

    #[test]
    fn local_match_never_reaches_transport() {
        let mock = MockExecutor::new();
        let fetcher = fetcher_with(&mock);

        let response = fetcher.fetch(&FetchRequest::get("http://localhost/echo")).unwrap();

        assert_eq!(response.status, 200);
        assert!(mock.recorded_requests().is_empty());
    }

    #[test]
    fn unmatched_request_goes_to_transport() {
        let mock = MockExecutor::new().with_response("/data", FetchResponse::ok("remote"));
        let fetcher = fetcher_with(&mock);

        let request = FetchRequest::post("http://localhost/data")
            .with_header("X-Trace", "1")
            .with_body("abc");
        let response = fetcher.fetch(&request).unwrap();

        assert_eq!(response.status, 200);
        let recorded = mock.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0], request);
    }

    #[test]
    fn transport_failure_propagates() {
        let mock = MockExecutor::new().fail_with("connection refused");
        let fetcher = fetcher_with(&mock);
        assert!(fetcher.fetch(&FetchRequest::get("http://localhost/x")).is_err());
    }

    #[test]
    fn inline_body_becomes_text() {
        let (like, stream) = into_response_like(FetchResponse::ok("hello"), || {
            panic!("inline bodies need no id")
        });
        assert_eq!(like.body, "hello");
        assert_eq!(like.body_type, BodyType::Inline);
        assert!(like.ok);
        assert!(stream.is_none());
    }

    #[test]
    fn non_utf8_inline_body_is_staged() {
        let id = IdGenerator::global().generate();
        let response = FetchResponse::ok(vec![0x63, 0x61, 0x66, 0xE9]);
        let (like, stream) = into_response_like(response, || id.clone());

        assert_eq!(like.body_type, BodyType::Stream);
        assert_eq!(like.body_ref(), Some(id.clone()));
        let (staged_id, stream) = stream.unwrap();
        assert_eq!(staged_id, id);
        assert_eq!(stream.read_to_end().unwrap(), vec![0x63, 0x61, 0x66, 0xE9]);
    }

    #[test]
    fn streamed_body_becomes_token() {
        let id = IdGenerator::global().generate();
        let response = FetchResponse::streaming(200, std::io::Cursor::new(vec![1u8, 2, 3]));
        let (like, stream) = into_response_like(response, || id.clone());

        assert_eq!(like.body_type, BodyType::Stream);
        assert_eq!(like.body_ref(), Some(id.clone()));
        let (staged_id, stream) = stream.unwrap();
        assert_eq!(staged_id, id);
        assert_eq!(stream.read_to_end().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn local_handler_is_readable() {
        let fetcher = fetcher_with(&MockExecutor::new());
        let handler = fetcher.local_handler().unwrap();
        assert!(handler.matches(&FetchRequest::get("/echo")));
    }
}
