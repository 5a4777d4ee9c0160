//! Unified error type.

/// Boxed error used where the concrete error type belongs to someone else
/// (transport bodies, user-supplied streams).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by primo's fallible operations.
///
/// Application-level failures (404, 405, 400) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures and mistakes made while building the router.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The path template conflicts with one already registered.
    #[error("invalid route `{path}`: {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("route `{path}` already has a {method} handler")]
    DuplicateRoute { method: crate::Method, path: String },

    #[error("multipart: {0}")]
    Multipart(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading the request body from the transport failed.
    #[error("body: {0}")]
    Body(#[source] BoxError),
}

impl Error {
    pub(crate) fn multipart(msg: impl Into<String>) -> Self {
        Self::Multipart(msg.into())
    }
}
