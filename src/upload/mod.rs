//! Streaming `multipart/form-data` ingestion.
//!
//! Text fields are collected into [`Body::Form`](crate::Body::Form). Every
//! file part is piped, chunk by chunk, into its own write task while the
//! request keeps being read from the wire, so a slow disk and a slow client
//! overlap instead of adding up.
//!
//! Two things have to be true before the request moves on:
//!
//! 1. the closing boundary has been read (or the body failed), and
//! 2. no file write is still in flight.
//!
//! [`ingest`] returns only when both hold. Writes finish in whatever order
//! the disk allows; each successful one appends a [`FileMetadata`] under its
//! field name. A failed write is logged and dropped without holding up the
//! rest of the request. So is a file part whose storage path an earlier
//! part of the same request already took: the first part keeps the path.

mod decoder;

pub use decoder::{Event, MultipartDecoder, PartHeaders};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use http::header::CONTENT_TYPE;
use http_body_util::BodyExt;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::error::Error;
use crate::request::{Body, RawBody, Request};

/// Directory files land in when a route sets no destination.
pub const DEFAULT_DESTINATION: &str = "./storage/";

/// Chunks buffered between the wire reader and one file writer.
const WRITE_QUEUE: usize = 16;

// ── Options ───────────────────────────────────────────────────────────────────

type DestinationFn = dyn Fn(&str, &str, &str) -> PathBuf + Send + Sync;
type FilenameFn = dyn Fn(&str, &str) -> String + Send + Sync;

/// Per-route storage rules for uploaded files.
///
/// ```rust
/// use primo::UploadOptions;
///
/// let opts = UploadOptions::new()
///     .destination(|_field, _filename, _mime| "./avatars/".into())
///     .filename(|filename, _mime| format!("file_{filename}"));
/// ```
#[derive(Clone, Default)]
pub struct UploadOptions {
    destination: Option<Arc<DestinationFn>>,
    filename: Option<Arc<FilenameFn>>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chooses the directory for a file from `(field_name, filename, mime_type)`.
    pub fn destination<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str, &str) -> PathBuf + Send + Sync + 'static,
    {
        self.destination = Some(Arc::new(f));
        self
    }

    /// Chooses the stored filename from `(filename, mime_type)`.
    pub fn filename<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        self.filename = Some(Arc::new(f));
        self
    }

    fn destination_for(&self, field: &str, filename: &str, mime: &str) -> PathBuf {
        match &self.destination {
            Some(f) => f(field, filename, mime),
            None => PathBuf::from(DEFAULT_DESTINATION),
        }
    }

    /// `None` when the default rule leaves nothing usable to store under.
    fn filename_for(&self, filename: &str, mime: &str) -> Option<String> {
        match &self.filename {
            Some(f) => Some(f(filename, mime)),
            None => {
                // Client filenames are untrusted: keep the last component only.
                let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
                (!matches!(base, "" | "." | "..")).then(|| base.to_owned())
            }
        }
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("destination", &self.destination.is_some())
            .field("filename", &self.filename.is_some())
            .finish()
    }
}

// ── Metadata ──────────────────────────────────────────────────────────────────

/// A file that was fully written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    /// Filename as sent by the client.
    pub original_filename: String,
    /// Filename on disk, inside `destination`.
    pub saved_filename: String,
    pub encoding: String,
    pub mime_type: String,
    pub destination: PathBuf,
    pub size_bytes: u64,
    pub created_at: SystemTime,
}

impl FileMetadata {
    /// Full path of the stored file.
    pub fn path(&self) -> PathBuf {
        self.destination.join(&self.saved_filename)
    }
}

// ── Ingestion ─────────────────────────────────────────────────────────────────

/// Reads a multipart body off `req`, storing files and collecting fields.
///
/// Fails if the envelope is malformed or the transport breaks. Even then it
/// first waits for every write it already started, so no task outlives the
/// request.
pub async fn ingest(req: &mut Request) -> Result<(), Error> {
    let mut decoder = req
        .header(CONTENT_TYPE.as_str())
        .and_then(MultipartDecoder::from_content_type)
        .ok_or_else(|| Error::multipart("content type carries no boundary"))?;
    let mut body = req
        .take_raw_body()
        .ok_or_else(|| Error::multipart("request body already consumed"))?;
    let options = req.upload_options().cloned().unwrap_or_default();

    let mut fields = HashMap::new();
    let mut writes = JoinSet::new();

    let read = read_parts(&mut body, &mut decoder, &options, &mut fields, &mut writes).await;

    // The wire is closed. Wait for the disk.
    while let Some(joined) = writes.join_next().await {
        match joined {
            Ok(Some((field, meta))) => req.files.entry(field).or_default().push(meta),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "upload task failed"),
        }
    }

    req.body = Body::Form(fields);
    read
}

type Writes = JoinSet<Option<(String, FileMetadata)>>;

async fn read_parts(
    body: &mut RawBody,
    decoder: &mut MultipartDecoder,
    options: &UploadOptions,
    fields: &mut HashMap<String, String>,
    writes: &mut Writes,
) -> Result<(), Error> {
    let mut buf = BytesMut::new();
    let mut current = None;
    // Storage paths already taken by earlier parts of this request.
    let mut claimed = HashSet::new();
    let mut eof = false;

    loop {
        let event = if eof {
            decoder.decode_eof(&mut buf)?
        } else {
            decoder.decode(&mut buf)?
        };

        match event {
            Some(Event::PartStart(headers)) => {
                current = Some(Part::start(headers, options, &mut claimed, writes));
            }
            Some(Event::Data(chunk)) => {
                if let Some(part) = current.as_mut() {
                    part.push(chunk).await;
                }
            }
            Some(Event::PartEnd) => {
                if let Some(part) = current.take() {
                    part.finish(fields).await;
                }
            }
            // decode_eof only comes back empty after the closing boundary.
            Some(Event::End) => return Ok(()),
            None if eof => return Ok(()),
            None => match body.frame().await {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        buf.extend_from_slice(&data);
                    }
                }
                Some(Err(e)) => return Err(Error::Body(e)),
                None => eof = true,
            },
        }
    }
}

/// The part currently being read off the wire.
enum Part {
    Field { name: String, value: BytesMut },
    /// `None` once the writer has given up; remaining bytes are discarded.
    File(Option<mpsc::Sender<Chunk>>),
    Skipped,
}

enum Chunk {
    Data(Bytes),
    End,
}

impl Part {
    fn start(
        headers: PartHeaders,
        options: &UploadOptions,
        claimed: &mut HashSet<PathBuf>,
        writes: &mut Writes,
    ) -> Self {
        let PartHeaders { name, filename, content_type, transfer_encoding } = headers;

        let Some(original) = filename else {
            return Self::Field { name, value: BytesMut::new() };
        };
        if original.is_empty() {
            return Self::Skipped;
        }
        let Some(saved) = options.filename_for(&original, &content_type) else {
            debug!(field = %name, filename = %original, "skipping upload without usable filename");
            return Self::Skipped;
        };

        let destination = options.destination_for(&name, &original, &content_type);
        let path = destination.join(&saved);
        if !claimed.insert(path.clone()) {
            warn!(field = %name, path = %path.display(), "skipping upload whose path an earlier part already took");
            return Self::Skipped;
        }

        let (tx, rx) = mpsc::channel(WRITE_QUEUE);
        let pending = PendingFile {
            field: name,
            original,
            saved,
            destination,
            encoding: transfer_encoding,
            mime_type: content_type,
        };
        writes.spawn(pending.write(rx));
        Self::File(Some(tx))
    }

    async fn push(&mut self, chunk: Bytes) {
        match self {
            Self::Field { value, .. } => value.extend_from_slice(&chunk),
            Self::File(tx) => {
                if let Some(sender) = tx {
                    if sender.send(Chunk::Data(chunk)).await.is_err() {
                        *tx = None;
                    }
                }
            }
            Self::Skipped => {}
        }
    }

    async fn finish(self, fields: &mut HashMap<String, String>) {
        match self {
            Self::Field { name, value } => {
                fields.insert(name, String::from_utf8_lossy(&value).into_owned());
            }
            Self::File(Some(tx)) => {
                let _ = tx.send(Chunk::End).await;
            }
            Self::File(None) | Self::Skipped => {}
        }
    }
}

/// A file part whose bytes are still on their way to disk.
struct PendingFile {
    field: String,
    original: String,
    saved: String,
    destination: PathBuf,
    encoding: String,
    mime_type: String,
}

impl PendingFile {
    async fn write(self, mut rx: mpsc::Receiver<Chunk>) -> Option<(String, FileMetadata)> {
        let path = self.destination.join(&self.saved);

        match store(&path, &self.destination, &mut rx).await {
            Ok((size_bytes, created_at)) => {
                debug!(path = %path.display(), size_bytes, "upload stored");
                let meta = FileMetadata {
                    original_filename: self.original,
                    saved_filename: self.saved,
                    encoding: self.encoding,
                    mime_type: self.mime_type,
                    destination: self.destination,
                    size_bytes,
                    created_at,
                };
                Some((self.field, meta))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "upload write failed");
                // Drop the receiver first so the reader stops feeding us.
                drop(rx);
                let _ = tokio::fs::remove_file(&path).await;
                None
            }
        }
    }
}

async fn store(
    path: &Path,
    dir: &Path,
    rx: &mut mpsc::Receiver<Chunk>,
) -> Result<(u64, SystemTime), Error> {
    tokio::fs::create_dir_all(dir).await?;
    let mut file = tokio::fs::File::create(path).await?;

    loop {
        match rx.recv().await {
            Some(Chunk::Data(bytes)) => file.write_all(&bytes).await?,
            Some(Chunk::End) => break,
            None => return Err(Error::multipart("request ended in the middle of a file")),
        }
    }
    file.flush().await?;
    drop(file);

    let meta = tokio::fs::metadata(path).await?;
    let created_at = meta
        .created()
        .or_else(|_| meta.modified())
        .unwrap_or_else(|_| SystemTime::now());
    Ok((meta.len(), created_at))
}
