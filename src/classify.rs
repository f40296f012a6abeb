//! Pure functions translating an HTTP request-URI into a Gopher item-type
//! and selector, and from there into an HTTP media type and streaming mode.
//! Nothing here touches a socket or a buffer — see `connection.rs` for that.

/// Streaming discipline a `READ`/`WRITE` cycle should use for a given item
/// type. `Menu` is never actually streamed as such: `connection.rs` coerces
/// it to `Text` before the first `WRITE`, per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Text,
    Binary,
    Menu,
}

const ITEM_TYPES: [u8; 9] = [b'0', b'1', b'4', b'5', b'6', b'9', b'g', b'h', b's'];

fn is_recognized_item_type(b: u8) -> bool {
    b == b'I' || ITEM_TYPES.contains(&b)
}

/// Strips a single leading `/`, then either consumes a recognized item-type
/// byte or defaults to `'0'` (or `'1'` for an empty selector).
///
/// Idempotence laws (see tests below):
/// - `classify("/" + s) == classify(s)` for any `s` not itself starting with `/`.
/// - `classify(t + r) == (t, r)` for any recognized item-type `t` and arbitrary `r`.
pub fn classify(request_uri: &[u8]) -> (u8, Vec<u8>) {
    let rest = request_uri.strip_prefix(b"/").unwrap_or(request_uri);

    if rest.is_empty() {
        return (b'1', Vec::new());
    }

    let first = rest[0];
    if is_recognized_item_type(first) {
        (first, rest[1..].to_vec())
    } else {
        (b'0', rest.to_vec())
    }
}

fn extension_media_type(selector: &[u8]) -> &'static str {
    match selector.rsplit(|&b| b == b'.').next() {
        Some(ext) if ext.len() != selector.len() => match ext {
            b"jpg" => "image/jpeg",
            b"jpeg" => "image/jpeg",
            b"png" => "image/png",
            b"wav" => "audio/wav",
            b"mp3" => "audio/mpeg",
            _ => "application/octet-stream",
        },
        _ => "application/octet-stream",
    }
}

/// Maps `(item_type, selector)` to the HTTP `Content-Type` value. Pure
/// function of its inputs.
pub fn media_type(item_type: u8, selector: &[u8]) -> &'static str {
    match item_type {
        b'0' | b'1' => "text/plain; charset=utf-8",
        b'4' => "application/binhex",
        b'5' | b'9' => "application/octet-stream",
        b'6' => "text/x-uuencode",
        b'g' => "image/gif",
        b'h' => "text/html; charset=utf-8",
        b'I' | b's' => extension_media_type(selector),
        _ => "application/octet-stream",
    }
}

/// Maps an item type to the body-streaming discipline `connection.rs` uses
/// during `READ`/`WRITE`.
pub fn stream_mode(item_type: u8) -> StreamMode {
    match item_type {
        b'1' => StreamMode::Menu,
        b'0' | b'4' | b'6' | b'h' => StreamMode::Text,
        _ => StreamMode::Binary,
    }
}
