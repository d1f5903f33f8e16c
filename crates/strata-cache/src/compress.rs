//! Payload encoding: optional gzip compression per the configured policy.

use crate::config::CompressionPolicy;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// A stored payload, plain or compressed.
#[derive(Debug, Clone)]
pub(crate) enum Payload {
    Plain(Vec<u8>),
    Gzip(Vec<u8>),
}

impl Payload {
    pub(crate) fn len(&self) -> usize {
        match self {
            Payload::Plain(b) | Payload::Gzip(b) => b.len(),
        }
    }

    pub(crate) fn is_compressed(&self) -> bool {
        matches!(self, Payload::Gzip(_))
    }

    /// Recovers the original serialized bytes.
    pub(crate) fn decode(&self) -> io::Result<Vec<u8>> {
        match self {
            Payload::Plain(b) => Ok(b.clone()),
            Payload::Gzip(b) => {
                let mut decoder = GzDecoder::new(b.as_slice());
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

/// Encodes serialized bytes according to the policy.
pub(crate) fn encode(policy: CompressionPolicy, bytes: Vec<u8>) -> io::Result<Payload> {
    match policy {
        CompressionPolicy::Never => Ok(Payload::Plain(bytes)),
        CompressionPolicy::Threshold(threshold) => {
            if bytes.len() >= threshold {
                Ok(Payload::Gzip(gzip(&bytes)?))
            } else {
                Ok(Payload::Plain(bytes))
            }
        }
        CompressionPolicy::ContentAware(threshold) => {
            if bytes.len() < threshold {
                return Ok(Payload::Plain(bytes));
            }
            let compressed = gzip(&bytes)?;
            // Keep the compressed form only when it earns its keep; anything
            // that shrinks less than 10% is likely already compressed.
            if compressed.len() * 10 <= bytes.len() * 9 {
                Ok(Payload::Gzip(compressed))
            } else {
                Ok(Payload::Plain(bytes))
            }
        }
    }
}

fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
