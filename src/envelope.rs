//! Decoding of base64(gzip(json)) subscription deliveries.

use std::io::Read;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use thiserror::Error;

use crate::types::LogBatch;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not valid gzip: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("decompressed payload is not a log batch: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug)]
pub enum Envelope {
    Data(LogBatch),
    Control(LogBatch),
}

pub fn decode_envelope(data: &str) -> Result<Envelope, DecodeError> {
    let compressed = BASE64_STANDARD.decode(data.trim())?;
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut raw = Vec::with_capacity(compressed.len() * 4);
    decoder.read_to_end(&mut raw)?;
    let batch: LogBatch = serde_json::from_slice(&raw)?;
    if batch.is_control() {
        return Ok(Envelope::Control(batch));
    }
    Ok(Envelope::Data(batch))
}

/// Inverse of [`decode_envelope`]; used by tests and local tooling to build deliveries.
pub fn encode_envelope(batch: &LogBatch) -> anyhow::Result<String> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let json = serde_json::to_vec(batch)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let gz = encoder.finish()?;
    Ok(BASE64_STANDARD.encode(gz))
}
