//! Incremental `multipart/form-data` decoder.
//!
//! Bytes arrive from the transport in arbitrary chunks. The decoder keeps
//! only what it cannot classify yet (a partial header block, or a tail that
//! might be the start of the next delimiter) and hands everything else out
//! as soon as it can, so a large file part is never held in memory.
//!
//! ```text
//! --boundary\r\n                     ← Preamble → AfterBoundary
//! content-disposition: ...\r\n\r\n   ← Headers  → PartStart
//! <bytes>                            ← Body     → Data, Data, ...
//! \r\n--boundary\r\n                 ←          → PartEnd
//! ...
//! \r\n--boundary--                   ←          → PartEnd, End
//! ```

use bytes::{Buf, Bytes, BytesMut};
use percent_encoding::percent_decode_str;
use tokio_util::codec::Decoder;

use crate::error::Error;

/// Upper bound on a single part's header block.
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// One step of a multipart body.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// A new part begins; its bytes follow as [`Event::Data`].
    PartStart(PartHeaders),
    Data(Bytes),
    PartEnd,
    /// The closing delimiter was read. Nothing follows.
    End,
}

/// The headers of one part that matter for form decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeaders {
    pub name: String,
    /// Present for file parts, even when the client sent it empty.
    pub filename: Option<String>,
    pub content_type: String,
    pub transfer_encoding: String,
}

impl PartHeaders {
    fn parse(block: &[u8]) -> Result<Self, Error> {
        let block = String::from_utf8_lossy(block);

        let mut name = None;
        let mut filename = None;
        let mut extended_filename = None;
        let mut content_type = None;
        let mut transfer_encoding = None;

        for line in block.split("\r\n").filter(|l| !l.trim().is_empty()) {
            let Some((key, value)) = line.split_once(':') else {
                return Err(Error::multipart(format!("malformed part header `{line}`")));
            };
            let value = value.trim();

            if key.trim().eq_ignore_ascii_case("content-disposition") {
                for (k, v) in header_params(value) {
                    if k.eq_ignore_ascii_case("name") {
                        name = Some(v);
                    } else if k.eq_ignore_ascii_case("filename") {
                        filename = Some(v);
                    } else if k.eq_ignore_ascii_case("filename*") {
                        extended_filename = ext_value(&v);
                    }
                }
            } else if key.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(value.to_owned());
            } else if key.trim().eq_ignore_ascii_case("content-transfer-encoding") {
                transfer_encoding = Some(value.to_owned());
            }
        }

        Ok(Self {
            name: name.ok_or_else(|| Error::multipart("part without a content-disposition name"))?,
            filename: extended_filename.or(filename),
            content_type: content_type.unwrap_or_else(|| "text/plain".to_owned()),
            transfer_encoding: transfer_encoding.unwrap_or_else(|| "7bit".to_owned()),
        })
    }
}

/// Decodes an RFC 8187 extended value: `charset'language'percent-encoded`.
/// Charsets other than UTF-8 are read as ISO-8859-1.
fn ext_value(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let (charset, _language, encoded) = (pieces.next()?, pieces.next()?, pieces.next()?);
    let bytes = percent_decode_str(encoded);
    Some(if charset.eq_ignore_ascii_case("utf-8") {
        bytes.decode_utf8_lossy().into_owned()
    } else {
        bytes.map(char::from).collect()
    })
}

/// Splits `value; k1=v1; k2="v 2"` into `(k, v)` pairs, skipping the leading
/// token. Semicolons inside quotes do not split.
fn header_params(value: &str) -> Vec<(String, String)> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                pieces.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&value[start..]);

    pieces
        .into_iter()
        .skip(1)
        .filter_map(|piece| {
            let (k, v) = piece.split_once('=')?;
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(v);
            Some((k.trim().to_owned(), v.to_owned()))
        })
        .collect()
}

/// Extracts the `boundary` parameter from a `multipart/form-data` content type.
pub fn boundary(content_type: &str) -> Option<String> {
    header_params(content_type)
        .into_iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    AfterBoundary,
    Headers,
    Body,
    Done,
}

/// Streaming multipart decoder. Feed it with [`Decoder::decode`] as chunks
/// arrive and with [`Decoder::decode_eof`] once the transport is exhausted.
#[derive(Debug)]
pub struct MultipartDecoder {
    /// `--boundary`, as it appears on the first line.
    dash_boundary: Vec<u8>,
    /// `\r\n--boundary`, as it appears between parts.
    delimiter: Vec<u8>,
    state: State,
}

impl MultipartDecoder {
    pub fn new(boundary: &str) -> Self {
        let dash_boundary = format!("--{boundary}").into_bytes();
        let delimiter = [b"\r\n".as_slice(), &dash_boundary].concat();
        Self { dash_boundary, delimiter, state: State::Preamble }
    }

    /// Builds a decoder from a request's content type, if it names a boundary.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        boundary(content_type).map(|b| Self::new(&b))
    }

    /// `true` once the closing delimiter has been decoded.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }
}

impl Decoder for MultipartDecoder {
    type Item = Event;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Event>, Error> {
        loop {
            match self.state {
                State::Preamble => match find(src, &self.dash_boundary) {
                    Some(pos) => {
                        src.advance(pos + self.dash_boundary.len());
                        self.state = State::AfterBoundary;
                    }
                    None => {
                        let keep = self.dash_boundary.len() - 1;
                        if src.len() > keep {
                            src.advance(src.len() - keep);
                        }
                        return Ok(None);
                    }
                },

                State::AfterBoundary => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if src.starts_with(b"--") {
                        src.advance(2);
                        self.state = State::Done;
                        return Ok(Some(Event::End));
                    }
                    // Transport padding (RFC 2046 §5.1.1) may sit before the CRLF.
                    match find(src, b"\r\n") {
                        Some(pos) if pos > MAX_HEADER_BYTES => {
                            return Err(Error::multipart("malformed boundary line"));
                        }
                        Some(pos) if src[..pos].iter().all(|b| *b == b' ' || *b == b'\t') => {
                            src.advance(pos + 2);
                            self.state = State::Headers;
                        }
                        Some(_) => return Err(Error::multipart("malformed boundary line")),
                        None if src.len() > MAX_HEADER_BYTES => {
                            return Err(Error::multipart("malformed boundary line"));
                        }
                        None => return Ok(None),
                    }
                }

                State::Headers => {
                    if src.starts_with(b"\r\n") {
                        return Err(Error::multipart("part without a content-disposition name"));
                    }
                    match find(src, b"\r\n\r\n") {
                        Some(pos) if pos > MAX_HEADER_BYTES => {
                            return Err(Error::multipart("part headers too large"));
                        }
                        Some(pos) => {
                            let block = src.split_to(pos);
                            src.advance(4);
                            let headers = PartHeaders::parse(&block)?;
                            self.state = State::Body;
                            return Ok(Some(Event::PartStart(headers)));
                        }
                        None if src.len() > MAX_HEADER_BYTES => {
                            return Err(Error::multipart("part headers too large"));
                        }
                        None => return Ok(None),
                    }
                }

                State::Body => {
                    return match find(src, &self.delimiter) {
                        Some(0) => {
                            src.advance(self.delimiter.len());
                            self.state = State::AfterBoundary;
                            Ok(Some(Event::PartEnd))
                        }
                        Some(pos) => Ok(Some(Event::Data(src.split_to(pos).freeze()))),
                        None => {
                            // The tail may be the first half of a delimiter.
                            let keep = self.delimiter.len() - 1;
                            if src.len() > keep {
                                let n = src.len() - keep;
                                Ok(Some(Event::Data(src.split_to(n).freeze())))
                            } else {
                                Ok(None)
                            }
                        }
                    };
                }

                State::Done => {
                    src.clear();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Event>, Error> {
        match self.decode(src)? {
            Some(event) => Ok(Some(event)),
            None if self.is_done() => Ok(None),
            None => Err(Error::multipart("body ended before the closing boundary")),
        }
    }
}
