//! Response body compression with encoder fallback.
//!
//! Brotli falls back to gzip, gzip falls back to the identity body. Encoder
//! failures are logged and counted, never surfaced to the client.

use std::io::{self, Write};
use std::sync::Arc;

use bytes::Bytes;
use flate2::{Compression, write::GzEncoder};
use metrics::counter;
use tracing::warn;

use crate::cache::METRIC_COMPRESSION_FALLBACK_TOTAL;

use super::negotiate::Encoding;

const SOURCE: &str = "infra::http::compression";
const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_LG_WINDOW: u32 = 22;

/// A single content-coding implementation.
pub trait BodyEncoder: Send + Sync {
    fn encoding(&self) -> Encoding;
    fn encode(&self, input: &[u8]) -> io::Result<Vec<u8>>;
}

pub struct BrotliEncoder;

impl BodyEncoder for BrotliEncoder {
    fn encoding(&self) -> Encoding {
        Encoding::Brotli
    }

    fn encode(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut writer = brotli::CompressorWriter::new(
            Vec::new(),
            BROTLI_BUFFER_SIZE,
            BROTLI_QUALITY,
            BROTLI_LG_WINDOW,
        );
        writer.write_all(input)?;
        writer.flush()?;
        Ok(writer.into_inner())
    }
}

pub struct GzipEncoder;

impl BodyEncoder for GzipEncoder {
    fn encoding(&self) -> Encoding {
        Encoding::Gzip
    }

    fn encode(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input)?;
        encoder.finish()
    }
}

/// A body together with the coding it was encoded in.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub encoding: Encoding,
    pub body: Bytes,
}

#[derive(Clone)]
pub struct Compressor {
    brotli: Arc<dyn BodyEncoder>,
    gzip: Arc<dyn BodyEncoder>,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::with_encoders(Arc::new(BrotliEncoder), Arc::new(GzipEncoder))
    }
}

impl Compressor {
    pub fn with_encoders(brotli: Arc<dyn BodyEncoder>, gzip: Arc<dyn BodyEncoder>) -> Self {
        Self { brotli, gzip }
    }

    /// Encode `body` in `preferred`, stepping down the fallback chain on failure.
    pub fn encode(&self, body: &Bytes, preferred: Encoding) -> Encoded {
        let chain: Vec<&dyn BodyEncoder> = match preferred {
            Encoding::Brotli => vec![self.brotli.as_ref(), self.gzip.as_ref()],
            Encoding::Gzip => vec![self.gzip.as_ref()],
            Encoding::Identity => Vec::new(),
        };

        for encoder in chain {
            match encoder.encode(body) {
                Ok(encoded) => {
                    let encoding = encoder.encoding();
                    if encoding != preferred {
                        counter!(METRIC_COMPRESSION_FALLBACK_TOTAL).increment(1);
                    }
                    return Encoded {
                        encoding,
                        body: Bytes::from(encoded),
                    };
                }
                Err(err) => warn!(
                    target = SOURCE,
                    encoding = ?encoder.encoding(),
                    error = %err,
                    "Compression failed; trying next encoding"
                ),
            }
        }

        if preferred != Encoding::Identity {
            counter!(METRIC_COMPRESSION_FALLBACK_TOTAL).increment(1);
        }
        Encoded {
            encoding: Encoding::Identity,
            body: body.clone(),
        }
    }
}
