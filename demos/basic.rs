//! Routes, path-scoped interceptors and a file upload endpoint.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42/admin?verbose=1
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/upload -H 'authorization: token' \
//!        -F note=holiday -F photos=@a.png -F photos=@b.png
//!   curl -X DELETE http://localhost:3000/users/42/admin   # 405

use std::path::PathBuf;
use std::time::Instant;

use http::StatusCode;
use primo::middleware::Next;
use primo::{Method, RawRequest, Request, Response, Router, Server, UploadOptions};
use serde_json::json;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), primo::Error> {
    tracing_subscriber::fmt::init();

    let uploads = UploadOptions::new()
        .destination(|field, _filename, _mime| PathBuf::from(format!("./storage/{field}")))
        .filename(|filename, _mime| format!("file_{filename}"));

    let app = Router::new()
        .get("/users/:id/:role", get_user)
        .post("/users", create_user)
        .post_with("/upload", uploads, upload)
        .paths(["/upload"]).methods([Method::Post]).add_interceptor(require_token)
        .paths(["/**"]).add_interceptor(tag_response)
        .paths(["/**"]).add_network_interceptor(access_log);

    Server::bind("0.0.0.0:3000").serve(app).await
}

async fn get_user(req: Request) -> Response {
    Response::json(
        json!({
            "id": req.param("id"),
            "role": req.param("role"),
            "verbose": req.query("verbose").is_some(),
        })
        .to_string(),
    )
}

async fn create_user(req: Request) -> Response {
    let Some(name) = req.body().as_json().and_then(|v| v["name"].as_str()) else {
        return Response::status(StatusCode::UNPROCESSABLE_ENTITY);
    };
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(json!({ "id": 99, "name": name }).to_string())
}

async fn upload(req: Request) -> Response {
    let stored: Vec<_> = req
        .files("photos")
        .iter()
        .map(|f| json!({ "name": f.saved_filename, "bytes": f.size_bytes }))
        .collect();
    Response::json(json!({ "note": req.body().field("note"), "photos": stored }).to_string())
}

async fn require_token(req: Request, next: Next<Request>) -> Response {
    if req.header("authorization").is_none() {
        return Response::status(StatusCode::UNAUTHORIZED);
    }
    next.run(req).await
}

async fn tag_response(req: Request, next: Next<Request>) -> Response {
    let mut res = next.run(req).await;
    res.headers_mut()
        .insert("x-powered-by", http::HeaderValue::from_static("primo"));
    res
}

async fn access_log(req: RawRequest, next: Next<RawRequest>) -> Response {
    let (method, path) = (req.method().clone(), req.uri().path().to_owned());
    let started = Instant::now();
    let res = next.run(req).await;
    info!(%method, %path, status = res.status_code().as_u16(), elapsed = ?started.elapsed(), "request");
    res
}
