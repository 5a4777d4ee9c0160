mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::StatusCode;
use primo::middleware::Next;
use primo::{Request, Response, Router, UploadOptions};
use tempfile::TempDir;

use common::{MULTIPART_TYPE, multipart, send, text};

/// Lists what the handler saw: `field:saved_filename:size` per file, then the note field.
async fn summarize(req: Request) -> Response {
    let mut files: Vec<String> = req
        .all_files()
        .iter()
        .flat_map(|(field, list)| {
            list.iter().map(move |f| format!("{field}:{}:{}", f.saved_filename, f.size_bytes))
        })
        .collect();
    files.sort();
    Response::text(format!(
        "{} note={}",
        files.join(","),
        req.body().field("note").unwrap_or("-")
    ))
}

fn into(dir: &Path) -> UploadOptions {
    let dir = dir.to_path_buf();
    UploadOptions::new().destination(move |_field, _filename, _mime| dir.clone())
}

#[tokio::test]
async fn files_and_fields_are_both_delivered() {
    let tmp = TempDir::new().unwrap();
    let options = into(tmp.path()).filename(|filename, _mime| format!("file_{filename}"));
    let app = Arc::new(Router::new().post_with("/upload", options, summarize));

    let body = multipart(&[
        ("photos", Some("a.txt"), b"alpha"),
        ("note", None, b"holiday"),
        ("photos", Some("b.txt"), b"bravo!"),
    ]);
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(text(&res), "photos:file_a.txt:5,photos:file_b.txt:6 note=holiday");
    assert_eq!(std::fs::read(tmp.path().join("file_a.txt")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(tmp.path().join("file_b.txt")).unwrap(), b"bravo!");
}

#[tokio::test]
async fn metadata_describes_the_stored_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().to_path_buf();

    let app = Arc::new(Router::new().post_with("/upload", into(tmp.path()), move |req: Request| {
        let dir = dir.clone();
        async move {
            let [file] = req.files("doc") else {
                return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
            };
            assert_eq!(file.original_filename, "report.bin");
            assert_eq!(file.saved_filename, "report.bin");
            assert_eq!(file.mime_type, "application/octet-stream");
            assert_eq!(file.encoding, "7bit");
            assert_eq!(file.destination, dir);
            assert_eq!(file.path(), dir.join("report.bin"));
            assert_eq!(file.size_bytes, 4);
            Response::text("checked")
        }
    }));

    let body = multipart(&[("doc", Some("report.bin"), b"\x00\x01\r\n")]);
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;
    assert_eq!(text(&res), "checked");
}

#[tokio::test]
async fn client_paths_are_stripped_from_default_filenames() {
    let tmp = TempDir::new().unwrap();
    let store = tmp.path().join("store");
    let app = Arc::new(Router::new().post_with("/upload", into(&store), summarize));

    let body = multipart(&[("f", Some("../../escape.txt"), b"x")]);
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert_eq!(text(&res), "f:escape.txt:1 note=-");
    assert!(store.join("escape.txt").is_file());
    assert!(!tmp.path().join("escape.txt").exists());
}

#[tokio::test]
async fn destination_directories_are_created() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let options = UploadOptions::new()
        .destination(move |field, _filename, _mime| root.join("by-field").join(field));
    let app = Arc::new(Router::new().post_with("/upload", options, summarize));

    let body = multipart(&[("avatar", Some("me.png"), b"png")]);
    send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert!(tmp.path().join("by-field/avatar/me.png").is_file());
}

#[tokio::test]
async fn failed_write_is_dropped_and_the_request_completes() {
    let tmp = TempDir::new().unwrap();
    // A regular file where a directory is expected: creating the upload fails.
    let blocker = tmp.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let app = Arc::new(Router::new().post_with("/upload", into(&blocker), summarize));

    let body = multipart(&[("photos", Some("a.txt"), b"alpha"), ("note", None, b"kept")]);
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(text(&res), " note=kept");
}

#[tokio::test]
async fn empty_filename_parts_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let app = Arc::new(Router::new().post_with("/upload", into(tmp.path()), summarize));

    let body = multipart(&[("photos", Some(""), b""), ("note", None, b"n")]);
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert_eq!(text(&res), " note=n");
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn truncated_multipart_is_400() {
    let tmp = TempDir::new().unwrap();
    let app = Arc::new(Router::new().post_with("/upload", into(tmp.path()), summarize));

    let mut body = multipart(&[("note", None, b"n")]);
    body.truncate(body.len() - 10);
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn multipart_without_boundary_is_400() {
    let app = Arc::new(Router::new().post("/upload", summarize));
    let res = send(&app, "POST", "/upload", Some("multipart/form-data"), "").await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn interceptors_see_files_already_on_disk() {
    let tmp = TempDir::new().unwrap();
    let app = Arc::new(
        Router::new()
            .post_with("/upload", into(tmp.path()), summarize)
            .paths(["/upload"])
            .add_interceptor(|req: Request, next: Next<Request>| async move {
                let on_disk = req.files("f").iter().all(|f| f.path().is_file());
                if req.files("f").is_empty() || !on_disk {
                    return Response::status(StatusCode::CONFLICT);
                }
                next.run(req).await
            }),
    );

    let body = multipart(&[("f", Some("a.txt"), b"abc")]);
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;
    assert_eq!(res.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn upload_rules_are_per_method() {
    let tmp = TempDir::new().unwrap();
    let post_dir = tmp.path().join("post");
    let put_dir = tmp.path().join("put");
    let app = Arc::new(
        Router::new()
            .post_with("/upload", into(&post_dir), summarize)
            .put_with("/upload", into(&put_dir), summarize),
    );

    let body = multipart(&[("f", Some("a.txt"), b"abc")]);
    send(&app, "PUT", "/upload", Some(MULTIPART_TYPE), body).await;

    assert!(put_dir.join("a.txt").is_file());
    assert!(!post_dir.exists());
}

#[tokio::test]
async fn large_file_streams_through() {
    let tmp = TempDir::new().unwrap();
    let app = Arc::new(Router::new().post_with("/upload", into(tmp.path()), summarize));

    let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
    let body = multipart(&[("f", Some("big.bin"), &payload)]);
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert_eq!(text(&res), format!("f:big.bin:{} note=-", payload.len()));
    let stored: PathBuf = tmp.path().join("big.bin");
    assert_eq!(std::fs::read(stored).unwrap(), payload);
}

#[tokio::test]
async fn colliding_storage_paths_keep_the_first_part() {
    let tmp = TempDir::new().unwrap();
    let app = Arc::new(Router::new().post_with("/upload", into(tmp.path()), summarize));

    let big = vec![b'A'; 200_000];
    let body = multipart(&[("avatar", Some("blob"), &big), ("banner", Some("blob"), b"tiny")]);
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(text(&res), "avatar:blob:200000 note=-");
    assert_eq!(std::fs::read(tmp.path().join("blob")).unwrap(), big);
}

#[tokio::test]
async fn small_file_after_large_one_still_waits_for_both() {
    let tmp = TempDir::new().unwrap();
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let app = Arc::new(Router::new().post_with("/upload", into(tmp.path()), move |req: Request| {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        summarize(req)
    }));

    let big = vec![7u8; 512 * 1024];
    let body = multipart(&[("a", Some("large.bin"), &big), ("b", Some("small.bin"), b"s")]);
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert_eq!(text(&res), format!("a:large.bin:{},b:small.bin:1 note=-", big.len()));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(std::fs::metadata(tmp.path().join("large.bin")).unwrap().len(), big.len() as u64);
}

#[tokio::test]
async fn oversized_part_headers_are_400() {
    let tmp = TempDir::new().unwrap();
    let app = Arc::new(Router::new().post_with("/upload", into(tmp.path()), summarize));

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\nX-Pad: {pad}\r\n\r\nn\r\n--{b}--\r\n",
        b = common::BOUNDARY,
        pad = "p".repeat(64 * 1024),
    );
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn extended_filename_is_used_for_storage() {
    let tmp = TempDir::new().unwrap();
    let app = Arc::new(Router::new().post_with("/upload", into(tmp.path()), summarize));

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"doc\"; filename*=UTF-8''r%C3%A9sum%C3%A9.txt\r\n\r\ncv\r\n--{b}--\r\n",
        b = common::BOUNDARY,
    );
    let res = send(&app, "POST", "/upload", Some(MULTIPART_TYPE), body).await;

    assert_eq!(text(&res), "doc:r\u{e9}sum\u{e9}.txt:2 note=-");
    assert!(tmp.path().join("r\u{e9}sum\u{e9}.txt").is_file());
}
