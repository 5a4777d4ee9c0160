//! Per-request pipeline.
//!
//! ```text
//! network interceptors ─▶ route lookup ─▶ params/query/body ─▶ app interceptors ─▶ handler
//!      (RawRequest)          404 / 405          400                (Request)
//! ```
//!
//! Each stage only starts once the one before it has finished. In
//! particular a multipart body is fully read and every file write has
//! settled before any application interceptor sees the request.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::StatusCode;
use http::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::method::Method;
use crate::middleware::execute;
use crate::request::{Body, RawRequest, Request};
use crate::response::Response;
use crate::router::Router;
use crate::upload;

pub(crate) fn dispatch(router: Arc<Router>, raw: RawRequest) -> BoxFuture {
    let chain = router
        .network
        .select_for(raw.uri().path(), raw.method().as_str());
    execute(chain, raw, move |raw| Box::pin(route(router, raw)))
}

/// Everything after the network stage.
async fn route(router: Arc<Router>, raw: RawRequest) -> Response {
    let path = raw.uri().path().to_owned();

    let Some(resolved) = router.routes.resolve(&path) else {
        debug!(method = %raw.method(), path = %path, "no route");
        return Response::status(StatusCode::NOT_FOUND);
    };

    let endpoint = Method::try_from(raw.method())
        .ok()
        .filter(|m| resolved.route.allows(m.as_str()))
        .and_then(|m| Some((m, resolved.route.handler(m)?)));
    let Some((method, handler)) = endpoint else {
        debug!(method = %raw.method(), path = %path, "method not allowed");
        return Response::status(StatusCode::METHOD_NOT_ALLOWED);
    };

    let handler = Arc::clone(handler);
    let upload = resolved.route.upload_options(method).cloned();
    let params: HashMap<_, _> = resolved.params.into_iter().collect();

    let mut req = Request::new(raw);
    req.params = params;
    req.query = parse_query(req.uri().query());
    req.upload = upload;

    if let Err(e) = decode_body(&mut req).await {
        debug!(method = %method, path = %path, error = %e, "rejecting request body");
        return Response::status(StatusCode::BAD_REQUEST);
    }

    let chain = router.app.select_for(&path, method.as_str());
    let reached = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&reached);
    let res = execute(chain, req, move |req| {
        flag.store(true, Ordering::Relaxed);
        handler.call(req)
    })
    .await;

    if !reached.load(Ordering::Relaxed) {
        debug!(method = %method, path = %path, status = res.status_code().as_u16(), "answered by interceptor");
    }
    res
}

/// Decodes query pairs. Repeated keys keep the last value.
fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

enum BodyKind {
    Json,
    Multipart,
    Other,
}

fn body_kind(content_type: Option<&str>) -> BodyKind {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .unwrap_or_default();
    if essence.eq_ignore_ascii_case("application/json") {
        BodyKind::Json
    } else if essence.eq_ignore_ascii_case("multipart/form-data") {
        BodyKind::Multipart
    } else {
        BodyKind::Other
    }
}

/// Leaves the raw body untouched for content types primo does not decode.
async fn decode_body(req: &mut Request) -> Result<(), Error> {
    let kind = body_kind(req.header(CONTENT_TYPE.as_str()));
    match kind {
        BodyKind::Json => {
            let bytes = req.bytes().await?;
            req.body = Body::Json(serde_json::from_slice(&bytes)?);
        }
        BodyKind::Multipart => upload::ingest(req).await?,
        BodyKind::Other => {}
    }
    Ok(())
}
