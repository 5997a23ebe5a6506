use std::fmt;
use std::io::Read;

use scriptbridge_core::{ByteStream, CorrelationId};
use serde::{Deserialize, Serialize};

use crate::headers::HeaderList;

/// HTTP method for requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => http::Method::GET,
            Method::POST => http::Method::POST,
            Method::PUT => http::Method::PUT,
            Method::DELETE => http::Method::DELETE,
            Method::PATCH => http::Method::PATCH,
            Method::HEAD => http::Method::HEAD,
            Method::OPTIONS => http::Method::OPTIONS,
        }
    }
}

impl TryFrom<&str> for Method {
    type Error = crate::FetchError;

    fn try_from(method: &str) -> Result<Self, Self::Error> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "PATCH" => Ok(Method::PATCH),
            "HEAD" => Ok(Method::HEAD),
            "OPTIONS" => Ok(Method::OPTIONS),
            _ => Err(crate::FetchError::InvalidMethod {
                method: method.to_string(),
            }),
        }
    }
}

/// What to do when the server answers with a redirect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    #[default]
    Follow,
    /// Hand the 3xx response back as is.
    Manual,
    /// Fail the request.
    Error,
}

/// A request issued from script.
///
/// The metadata is decoded from the script-side `Request`; the body travels
/// separately as raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FetchRequest {
    pub url: String,

    #[serde(default)]
    pub method: Method,

    #[serde(default)]
    pub headers: HeaderList,

    #[serde(default)]
    pub redirect: RedirectMode,

    #[serde(skip)]
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::POST,
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_redirect(mut self, redirect: RedirectMode) -> Self {
        self.redirect = redirect;
        self
    }

    /// Path component of the URL. Relative URLs such as `/echo` are accepted.
    pub fn path(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(url) => url.path().to_string(),
            Err(_) => {
                let end = self.url.find(['?', '#']).unwrap_or(self.url.len());
                self.url[..end].to_string()
            }
        }
    }
}

/// Response body as produced by a transport or local handler.
#[derive(Clone)]
pub enum ResponseBody {
    /// Fully buffered.
    Inline(Vec<u8>),
    /// Still open; read later through the resource store.
    Stream(ByteStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Inline(bytes) => f.debug_tuple("Inline").field(&bytes.len()).finish(),
            ResponseBody::Stream(stream) => f.debug_tuple("Stream").field(stream).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub status_text: String,
    pub url: String,
    pub redirected: bool,
    pub headers: HeaderList,
    pub body: ResponseBody,
}

impl FetchResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: canonical_reason(status),
            url: String::new(),
            redirected: false,
            headers: HeaderList::new(),
            body: ResponseBody::Inline(Vec::new()),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200).with_body(body)
    }

    /// Response whose body is read lazily from `reader`.
    pub fn streaming(status: u16, reader: impl Read + Send + 'static) -> Self {
        Self {
            body: ResponseBody::Stream(ByteStream::new(reader)),
            ..Self::new(status)
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = ResponseBody::Inline(body.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Check if the response status indicates success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Stream(_))
    }
}

/// How the `body` field of a [`ResponseLike`] is to be read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BodyType {
    /// `body` is the response text.
    Inline,
    /// `body` is a correlation id of a stream in the resource store.
    Stream,
}

/// Script-visible shape of a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseLike {
    pub status: u16,
    pub status_text: String,
    pub ok: bool,
    pub url: String,
    pub redirected: bool,
    pub headers: HeaderList,
    pub body: String,
    pub body_type: BodyType,
}

impl ResponseLike {
    /// Stream token, when the body was left in the store.
    pub fn body_ref(&self) -> Option<CorrelationId> {
        match self.body_type {
            BodyType::Stream => CorrelationId::parse(self.body.as_str()).ok(),
            BodyType::Inline => None,
        }
    }
}

fn canonical_reason(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("")
        .to_string()
}
