//! Request types.
//!
//! A request exists in two shapes during dispatch:
//!
//! - [`RawRequest`]: exactly what the transport delivered. Network-stage
//!   interceptors see this one.
//! - [`Request`]: the routed request, with path and query parameters,
//!   the parsed body and any uploaded files. Application-stage interceptors
//!   and handlers see this one.

use std::collections::HashMap;

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};

use crate::error::{BoxError, Error};
use crate::upload::{FileMetadata, UploadOptions};

/// A type-erased request body, as read from the transport.
pub type RawBody = UnsyncBoxBody<Bytes, BoxError>;

/// A request as it came off the wire.
pub type RawRequest = http::Request<RawBody>;

/// Wraps in-memory bytes as a [`RawBody`].
pub fn full(bytes: impl Into<Bytes>) -> RawBody {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed_unsync()
}

/// The decoded request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// Not decoded: the body either was empty or had a content type primo
    /// does not parse. The bytes are still available through
    /// [`Request::bytes`].
    #[default]
    Empty,
    /// `application/json`.
    Json(serde_json::Value),
    /// Text fields of a `multipart/form-data` body.
    Form(HashMap<String, String>),
}

impl Body {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// A single form field.
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            Self::Form(fields) => fields.get(name).map(String::as_str),
            _ => None,
        }
    }
}

/// An incoming HTTP request, routed and decoded.
pub struct Request {
    parts: Parts,
    raw_body: Option<RawBody>,
    pub(crate) body: Body,
    pub(crate) params: HashMap<String, String>,
    pub(crate) query: HashMap<String, String>,
    pub(crate) files: HashMap<String, Vec<FileMetadata>>,
    pub(crate) upload: Option<UploadOptions>,
}

impl Request {
    /// Wraps a raw request. Parameters, query and body start out empty; the
    /// dispatcher fills them in before any application interceptor runs.
    pub fn new(raw: RawRequest) -> Self {
        let (parts, body) = raw.into_parts();
        Self {
            parts,
            raw_body: Some(body),
            body: Body::Empty,
            params: HashMap::new(),
            query: HashMap::new(),
            files: HashMap::new(),
            upload: None,
        }
    }

    pub fn method(&self) -> &http::Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    /// Returns a query-string parameter, percent-decoded.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn query_params(&self) -> &HashMap<String, String> { &self.query }

    pub fn body(&self) -> &Body { &self.body }
    pub fn body_mut(&mut self) -> &mut Body { &mut self.body }

    /// Files stored for one multipart field, in the order their writes finished.
    pub fn files(&self, field: &str) -> &[FileMetadata] {
        self.files.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_files(&self) -> &HashMap<String, Vec<FileMetadata>> { &self.files }

    /// Upload rules of the matched route for this request's method.
    pub fn upload_options(&self) -> Option<&UploadOptions> { self.upload.as_ref() }

    /// Typed per-request state, e.g. an identity attached by an auth
    /// interceptor for the handler to read.
    pub fn extensions(&self) -> &http::Extensions { &self.parts.extensions }
    pub fn extensions_mut(&mut self) -> &mut http::Extensions { &mut self.parts.extensions }

    /// Takes the undecoded body stream. `None` if something already consumed it.
    pub fn take_raw_body(&mut self) -> Option<RawBody> {
        self.raw_body.take()
    }

    /// Buffers the undecoded body. Empty if it was already consumed.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        match self.raw_body.take() {
            Some(body) => Ok(body.collect().await.map_err(Error::Body)?.to_bytes()),
            None => Ok(Bytes::new()),
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("params", &self.params)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}
