//! HTTP execution abstraction for testing.
//!
//! [`HttpExecutor`] is the seam between the fetch layer and the network, so
//! tests can substitute a recorder that never opens a socket.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect::Policy;

use crate::error::FetchError;
use crate::headers::HeaderList;
use crate::types::{FetchRequest, FetchResponse, RedirectMode, ResponseBody};

/// Bodies up to this many bytes are buffered when the server declares a
/// length.
pub const DEFAULT_INLINE_BODY_LIMIT: u64 = 64 * 1024;

/// Trait for executing HTTP requests.
///
/// Implementations can use real HTTP clients or mock responses for testing.
pub trait HttpExecutor: Send + Sync {
    fn execute(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Production HTTP executor using reqwest.
///
/// One client per redirect mode, since reqwest fixes the redirect policy at
/// build time.
pub struct ReqwestExecutor {
    follow: Client,
    manual: Client,
    refuse: Client,
    inline_body_limit: u64,
}

impl ReqwestExecutor {
    pub fn new(timeout: Duration, inline_body_limit: u64, user_agent: &str) -> Result<Self, FetchError> {
        let build = |policy: Policy| {
            Client::builder()
                .timeout(timeout)
                .user_agent(user_agent)
                .redirect(policy)
                .build()
        };

        Ok(Self {
            follow: build(Policy::limited(10))?,
            manual: build(Policy::none())?,
            refuse: build(Policy::custom(|attempt| {
                let status = attempt.status().as_u16();
                let url = attempt.previous().last().map(|u| u.to_string()).unwrap_or_default();
                attempt.error(FetchError::RedirectRefused { url, status })
            }))?,
            inline_body_limit,
        })
    }

    /// Create with default timeout of 30 seconds.
    pub fn with_default_timeout() -> Result<Self, FetchError> {
        Self::new(
            Duration::from_secs(30),
            DEFAULT_INLINE_BODY_LIMIT,
            crate::fetcher::DEFAULT_USER_AGENT,
        )
    }

    fn client(&self, redirect: RedirectMode) -> &Client {
        match redirect {
            RedirectMode::Follow => &self.follow,
            RedirectMode::Manual => &self.manual,
            RedirectMode::Error => &self.refuse,
        }
    }

    fn should_inline(&self, content_length: Option<u64>, content_type: Option<&str>) -> bool {
        match content_length {
            Some(len) => len <= self.inline_body_limit && is_textual(content_type),
            None => false,
        }
    }
}

impl HttpExecutor for ReqwestExecutor {
    fn execute(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = url::Url::parse(&request.url)?;
        let method: http::Method = request.method.clone().into();

        let mut req_builder = self
            .client(request.redirect)
            .request(method, url.clone())
            .headers(request.headers.to_header_map()?);

        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder.send()?;

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or("")
            .to_string();
        let final_url = response.url().to_string();
        let redirected = response.url() != &url;
        let headers = HeaderList::from_header_map(response.headers());

        let content_type = headers.get("content-type");
        let body = if self.should_inline(response.content_length(), content_type.as_deref()) {
            ResponseBody::Inline(response.bytes()?.to_vec())
        } else {
            tracing::debug!(url = %final_url, status, "leaving response body open");
            ResponseBody::Stream(scriptbridge_core::ByteStream::new(response))
        };

        Ok(FetchResponse {
            status,
            status_text,
            url: final_url,
            redirected,
            headers,
            body,
        })
    }
}

/// Whether a body of this content type can be handed to script as text.
pub(crate) fn is_textual(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
        || matches!(
            essence.as_str(),
            "application/json"
                | "application/xml"
                | "application/javascript"
                | "application/x-www-form-urlencoded"
        )
}
