//! Stored record shapes and their byte encoding.
//!
//! A feed record is a one-line JSON header followed by `\n` and the raw body, so
//! size and access bookkeeping can be read without copying the body. Allowlist
//! records are plain JSON.

use std::collections::BTreeSet;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::CacheError;
use super::kv::KvKey;

/// A rewritten feed body held by the feed cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub key: String,
    pub body: Bytes,
    pub created_at: OffsetDateTime,
    pub last_accessed_at: OffsetDateTime,
    pub size_bytes: u64,
}

impl CachedEntry {
    pub fn new(key: impl Into<String>, body: Bytes, now: OffsetDateTime) -> Self {
        let size_bytes = body.len() as u64;
        Self {
            key: key.into(),
            body,
            created_at: now,
            last_accessed_at: now,
            size_bytes,
        }
    }

    /// True once the entry has outlived `window`.
    pub fn is_expired(&self, now: OffsetDateTime, window: Duration) -> bool {
        is_expired(self.created_at, now, window)
    }
}

/// Article URLs that the content endpoint may fetch for one feed.
#[derive(Debug, Clone, PartialEq)]
pub struct AllowlistEntry {
    pub feed_key: String,
    pub urls: BTreeSet<String>,
    pub created_at: OffsetDateTime,
}

impl AllowlistEntry {
    pub fn is_expired(&self, now: OffsetDateTime, window: Duration) -> bool {
        is_expired(self.created_at, now, window)
    }
}

pub(crate) fn is_expired(created_at: OffsetDateTime, now: OffsetDateTime, window: Duration) -> bool {
    now - created_at > window
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EntryHeader {
    pub created_at_us: i64,
    pub last_accessed_at_us: i64,
    pub size_bytes: u64,
}

impl EntryHeader {
    pub fn created_at(&self) -> OffsetDateTime {
        from_micros(self.created_at_us)
    }

    pub fn last_accessed_at(&self) -> OffsetDateTime {
        from_micros(self.last_accessed_at_us)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AllowlistRecord {
    urls: Vec<String>,
    created_at_us: i64,
}

pub(crate) fn encode_entry(entry: &CachedEntry) -> Result<Bytes, serde_json::Error> {
    let header = EntryHeader {
        created_at_us: to_micros(entry.created_at),
        last_accessed_at_us: to_micros(entry.last_accessed_at),
        size_bytes: entry.size_bytes,
    };
    let header = serde_json::to_vec(&header)?;

    let mut buf = BytesMut::with_capacity(header.len() + 1 + entry.body.len());
    buf.put_slice(&header);
    buf.put_u8(b'\n');
    buf.put_slice(&entry.body);
    Ok(buf.freeze())
}

/// Decode only the bookkeeping header of a feed record.
pub(crate) fn decode_header(key: &KvKey, raw: &Bytes) -> Result<(EntryHeader, usize), CacheError> {
    let split = raw
        .iter()
        .position(|byte| *byte == b'\n')
        .ok_or_else(|| CacheError::corrupt(key, "missing header terminator"))?;
    let header: EntryHeader = serde_json::from_slice(&raw[..split])
        .map_err(|err| CacheError::corrupt(key, err.to_string()))?;
    Ok((header, split + 1))
}

pub(crate) fn decode_entry(key: &KvKey, raw: &Bytes) -> Result<CachedEntry, CacheError> {
    let (header, body_start) = decode_header(key, raw)?;
    let body = raw.slice(body_start..);
    if body.len() as u64 != header.size_bytes {
        return Err(CacheError::corrupt(
            key,
            format!(
                "size mismatch: header says {} bytes, body has {}",
                header.size_bytes,
                body.len()
            ),
        ));
    }
    Ok(CachedEntry {
        key: key.id.clone(),
        body,
        created_at: header.created_at(),
        last_accessed_at: header.last_accessed_at(),
        size_bytes: header.size_bytes,
    })
}

pub(crate) fn encode_allowlist(entry: &AllowlistEntry) -> Result<Bytes, serde_json::Error> {
    let record = AllowlistRecord {
        urls: entry.urls.iter().cloned().collect(),
        created_at_us: to_micros(entry.created_at),
    };
    serde_json::to_vec(&record).map(Bytes::from)
}

pub(crate) fn decode_allowlist(key: &KvKey, raw: &Bytes) -> Result<AllowlistEntry, CacheError> {
    let record: AllowlistRecord =
        serde_json::from_slice(raw).map_err(|err| CacheError::corrupt(key, err.to_string()))?;
    Ok(AllowlistEntry {
        feed_key: key.id.clone(),
        urls: record.urls.into_iter().collect(),
        created_at: from_micros(record.created_at_us),
    })
}

fn to_micros(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000).unwrap_or(i64::MAX)
}

fn from_micros(micros: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
