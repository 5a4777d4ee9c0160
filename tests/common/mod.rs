#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use primo::{Response, Router};

pub const BOUNDARY: &str = "primo-test-boundary";
pub const MULTIPART_TYPE: &str = "multipart/form-data; boundary=primo-test-boundary";

/// Sends one request through the whole pipeline, no socket involved.
pub async fn send(
    app: &Arc<Router>,
    method: &str,
    uri: &str,
    content_type: Option<&str>,
    body: impl Into<Bytes>,
) -> Response {
    let mut builder = http::Request::builder().method(method).uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header("content-type", ct);
    }
    let req = builder.body(Full::new(body.into())).unwrap();
    Arc::clone(app).handle(req).await
}

pub async fn get(app: &Arc<Router>, uri: &str) -> Response {
    send(app, "GET", uri, None, Bytes::new()).await
}

pub fn text(res: &Response) -> &str {
    std::str::from_utf8(res.body()).unwrap()
}

/// One part of a multipart body: `(field, filename, content)`.
pub type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

pub fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, filename, content) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
