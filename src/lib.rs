//! # primo
//!
//! A small HTTP framework built around one request pipeline:
//!
//! 1. **network interceptors** see the request exactly as it arrived;
//! 2. the **router** picks a route (`404` if none, `405` if the method is
//!    not registered for it), captures `:name` path parameters and the
//!    query string, and decodes the body: JSON, or `multipart/form-data`
//!    streamed to disk file by file;
//! 3. **application interceptors** see the routed, decoded [`Request`];
//! 4. the route's **handler** answers.
//!
//! Interceptors are attached to wildcard patterns (`/users/*`, `/api/**`)
//! and may be limited to certain methods. For each request only the first
//! registered pattern that matches runs, in the order its interceptors were
//! added.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use primo::middleware::Next;
//! use primo::{Method, Request, Response, Router, Server, UploadOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), primo::Error> {
//!     let app = Router::new()
//!         .get("/users/:id", get_user)
//!         .post_with("/upload", UploadOptions::new(), upload)
//!         .paths(["/upload"]).methods([Method::Post]).add_interceptor(require_token);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     Response::text(req.param("id").unwrap_or_default().to_owned())
//! }
//!
//! async fn upload(req: Request) -> Response {
//!     Response::text(format!("{} file(s)", req.files("photos").len()))
//! }
//!
//! async fn require_token(req: Request, next: Next<Request>) -> Response {
//!     if req.header("authorization").is_none() {
//!         return Response::status(StatusCode::UNAUTHORIZED);
//!     }
//!     next.run(req).await
//! }
//! ```

mod dispatch;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;
pub mod pattern;
pub mod routes;
pub mod upload;

pub use error::{BoxError, Error};
pub use handler::{BoxFuture, Handler};
pub use method::{Method, UnknownMethod};
pub use request::{Body, RawBody, RawRequest, Request, full};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{Router, Scope};
pub use server::Server;
pub use upload::{FileMetadata, UploadOptions};
