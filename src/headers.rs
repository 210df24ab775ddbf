use http::header::{HeaderValue, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::HeaderMap;
use http::Version;

pub(crate) fn connection_keep_alive(value: &HeaderValue) -> bool {
    connection_has(value, "keep-alive")
}

pub(crate) fn connection_close(value: &HeaderValue) -> bool {
    connection_has(value, "close")
}

fn connection_has(value: &HeaderValue, needle: &str) -> bool {
    if let Ok(s) = value.to_str() {
        for val in s.split(',') {
            if val.trim().eq_ignore_ascii_case(needle) {
                return true;
            }
        }
    }
    false
}

/// Whether a message with this version and these headers leaves the
/// connection open for another message.
pub(crate) fn should_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let conn = headers.get(CONNECTION);
    match version {
        Version::HTTP_10 => conn.map(connection_keep_alive).unwrap_or(false),
        _ => !conn.map(connection_close).unwrap_or(false),
    }
}

pub(crate) fn content_length_parse(value: &HeaderValue) -> Option<u64> {
    value.to_str().ok().and_then(|s| s.trim().parse().ok())
}

/// Parses every `Content-Length` value, returning `None` if there are none.
///
/// Multiple values are fine as long as they all agree; disagreeing or
/// unparsable values are an error.
pub(crate) fn content_length_parse_all(headers: &HeaderMap) -> Result<Option<u64>, ()> {
    let mut folded = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let n = content_length_parse(value).ok_or(())?;
        match folded {
            Some(prev) if prev != n => return Err(()),
            _ => folded = Some(n),
        }
    }
    Ok(folded)
}

pub(crate) fn set_content_length_if_missing(headers: &mut HeaderMap, len: u64) {
    headers
        .entry(CONTENT_LENGTH)
        .or_insert_with(|| HeaderValue::from(len));
}

pub(crate) fn transfer_encoding_is_chunked(headers: &HeaderMap) -> bool {
    is_chunked(headers.get_all(TRANSFER_ENCODING).into_iter())
}

fn is_chunked<'a, I>(encodings: I) -> bool
where
    I: DoubleEndedIterator<Item = &'a HeaderValue>,
{
    // chunked must always be the last encoding, according to spec
    if let Some(line) = encodings.rev().next() {
        if let Ok(s) = line.to_str() {
            if let Some(encoding) = s.rsplit(',').next() {
                return encoding.trim().eq_ignore_ascii_case("chunked");
            }
        }
    }

    false
}
