//! Reading HTTP/1.x frames off a byte stream while passing every byte through to a peer.

use crate::{data::Headers, error::Error};
use encoding_rs::{Encoding, UTF_8};
use lazy_static::lazy_static;
use regex::Regex;
use std::{borrow::Cow, io};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// `\r\n\r\n` as seen through the rolling window of the last four bytes.
const HEADER_END_SEQ: u32 = 0x0d0a_0d0a;

/// The longest start line plus header block accepted before the frame is rejected.
pub const MAX_HEAD_LENGTH: usize = 64 * 1024;

lazy_static! {
    static ref START_LINE_REGEX: Regex = Regex::new(r"^(?P<first>\S+)[ \t]+(?P<second>\S+)").unwrap();
    static ref HEADER_REGEX: Regex =
        Regex::new(r"^(?P<name>[^\s:]+)[ \t]*:[ \t]*(?P<value>.*?)[ \t]*$").unwrap();
    static ref PARAMETER_REGEX: Regex =
        Regex::new(r#"^\s*(?P<name>[^=\s]+)\s*=\s*"?(?P<value>[^"]*?)"?\s*$"#).unwrap();
}

/// The media type and charset declared by a `Content-Type` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentType {
    pub mime: String,
    pub charset: Option<String>,
}

impl ContentType {
    /// Parses `type[;name=value]*`. Parameters that don't have the `name=value` shape are ignored.
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split(';');
        let mime = parts.next().unwrap_or_default().trim().to_string();
        let charset = parts
            .filter_map(|parameter| PARAMETER_REGEX.captures(parameter))
            .find(|captures| captures["name"].eq_ignore_ascii_case("charset"))
            .map(|captures| captures["value"].to_string())
            .filter(|charset| !charset.is_empty());

        Self { mime, charset }
    }

    /// Decodes `bytes` with the declared charset, or UTF-8 when none is declared.
    ///
    /// Labels unknown to the WHATWG encoding registry fall back to UTF-8.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let encoding = match &self.charset {
            Some(label) => Encoding::for_label(label.as_bytes()).unwrap_or_else(|| {
                warn!(charset = %label, "unsupported charset, decoding as UTF-8");
                UTF_8
            }),
            None => UTF_8,
        };

        let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
        if had_errors {
            debug!(encoding = encoding.name(), "body contains malformed sequences");
        }

        text
    }
}

/// One HTTP message as read off the wire.
///
/// For a response the start line fields are reused: `method` holds the protocol version and
/// `path` holds the status code.
#[derive(Debug, Clone)]
pub struct Frame {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub content_type: ContentType,
}

impl Frame {
    pub fn mime(&self) -> &str {
        &self.content_type.mime
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        self.content_type.decode(&self.body)
    }

    pub fn status_code(&self) -> Option<u16> {
        self.path.parse().ok()
    }
}

/// Reads one frame from `source`, writing every consumed byte to `mirror` before the next chunk
/// is read.
///
/// Returns `Ok(None)` when `source` ends before the first byte of a frame.
pub async fn read_frame<R, W>(source: &mut R, mirror: &mut W) -> Result<Option<Frame>, Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut head = Vec::new();
    let mut window = 0u32;

    loop {
        let chunk = source.fill_buf().await?;
        if chunk.is_empty() {
            if head.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "the stream ended inside the frame headers",
            )
            .into());
        }

        let mut consumed = 0;
        let mut complete = false;
        for &byte in chunk {
            consumed += 1;
            window = (window << 8) | u32::from(byte);
            if window == HEADER_END_SEQ {
                complete = true;
                break;
            }
        }

        if head
            .len()
            .checked_add(consumed)
            .map_or(true, |length| length > MAX_HEAD_LENGTH)
        {
            return Err(Error::MalformedFrame(format!(
                "The frame headers exceed {} bytes.",
                MAX_HEAD_LENGTH
            )));
        }

        head.extend_from_slice(&chunk[..consumed]);
        mirror.write_all(&chunk[..consumed]).await?;
        source.consume(consumed);

        if complete {
            break;
        }
    }

    let (method, path, headers) = parse_head(&head)?;

    let content_length = match headers.get("content-length") {
        Some(value) => value.trim().parse::<usize>().map_err(|_| {
            Error::MalformedFrame(format!("Content-Length {} is not understood.", value))
        })?,
        None => 0,
    };
    let content_type = headers
        .get("content-type")
        .map(ContentType::parse)
        .unwrap_or_default();

    // Content-Length comes from the peer, so the body grows with the bytes actually received.
    let mut body = Vec::new();
    while body.len() < content_length {
        let chunk = source.fill_buf().await?;
        if chunk.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "the stream ended after {} of {} body bytes",
                    body.len(),
                    content_length
                ),
            )
            .into());
        }

        let take = chunk.len().min(content_length - body.len());
        body.extend_from_slice(&chunk[..take]);
        mirror.write_all(&chunk[..take]).await?;
        source.consume(take);
    }
    mirror.flush().await?;

    debug!(%method, %path, body_length = body.len(), "read frame");

    Ok(Some(Frame {
        method,
        path,
        headers,
        body,
        content_type,
    }))
}

fn parse_head(head: &[u8]) -> Result<(String, String, Headers), Error> {
    let head = String::from_utf8_lossy(head);
    let mut lines = head.lines();

    let start_line = lines.next().unwrap_or_default();
    let captures = START_LINE_REGEX.captures(start_line).ok_or_else(|| {
        Error::MalformedFrame(format!("Request line {} is not understood.", start_line))
    })?;
    let method = captures["first"].to_string();
    let path = captures["second"].to_string();

    let mut headers = Headers::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let captures = HEADER_REGEX.captures(line).ok_or_else(|| {
            Error::MalformedFrame(format!("Header line {} is not understood.", line))
        })?;
        headers.insert(&captures["name"], &captures["value"]);
    }

    Ok((method, path, headers))
}
