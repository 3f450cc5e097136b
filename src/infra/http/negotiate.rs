//! Conditional GET and content-encoding negotiation.

use sha2::{Digest, Sha256};
use time::{
    OffsetDateTime, PrimitiveDateTime, UtcOffset,
    format_description::{FormatItem, well_known::Rfc2822},
    macros::format_description,
};

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
const HTTP_DATE_FORMAT: &[FormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Smallest body worth compressing.
pub const MIN_COMPRESS_BYTES: u64 = 1024;
/// Largest body compressed in-line.
pub const MAX_COMPRESS_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Brotli,
    Gzip,
    Identity,
}

impl Encoding {
    /// `Content-Encoding` value, `None` for identity.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            Encoding::Brotli => Some("br"),
            Encoding::Gzip => Some("gzip"),
            Encoding::Identity => None,
        }
    }
}

/// Strong entity tag of a body: the quoted hex SHA-256 digest.
pub fn etag_of(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// `If-None-Match` check using weak comparison; `*` matches any tag.
pub fn is_not_modified(if_none_match: Option<&str>, etag: &str) -> bool {
    let Some(header) = if_none_match else {
        return false;
    };
    let current = opaque_tag(etag);
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || (!candidate.is_empty() && opaque_tag(candidate) == current)
    })
}

/// `If-Modified-Since` check at whole-second precision. Unparsable dates never match.
pub fn is_not_modified_since(if_modified_since: Option<&str>, last_modified: OffsetDateTime) -> bool {
    let Some(since) = if_modified_since.and_then(parse_http_date) else {
        return false;
    };
    let last_modified = last_modified.replace_nanosecond(0).unwrap_or(last_modified);
    last_modified <= since
}

pub fn format_http_date(at: OffsetDateTime) -> String {
    at.to_offset(UtcOffset::UTC)
        .format(HTTP_DATE_FORMAT)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    PrimitiveDateTime::parse(value, HTTP_DATE_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .or_else(|_| OffsetDateTime::parse(value, &Rfc2822))
        .ok()
}

/// Pick an encoding by substring presence in `Accept-Encoding`: brotli, then gzip.
pub fn select_encoding(accept_encoding: Option<&str>) -> Encoding {
    match accept_encoding {
        Some(accept) if accept.contains("br") => Encoding::Brotli,
        Some(accept) if accept.contains("gzip") => Encoding::Gzip,
        _ => Encoding::Identity,
    }
}

pub fn should_compress(size: u64, encoding: Encoding) -> bool {
    encoding != Encoding::Identity && (MIN_COMPRESS_BYTES..=MAX_COMPRESS_BYTES).contains(&size)
}

fn opaque_tag(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}
