//! Envelope encoding to and decoding from broker records.

use common::Tenant;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::envelope::{Envelope, RawEnvelope};
use crate::tenant::{Headers, SPAN_ID_HEADER, read_tenant, write_tenant};

/// Errors produced while encoding or decoding envelopes.
///
/// An unknown `type` is not an error; consumers skip such envelopes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload is not an envelope, or lacks a required field.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A mandatory header is absent.
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// A header is present but unparsable.
    #[error("Invalid header {name}: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    /// Serialization of an outbound body failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A broker record: physical topic, optional partition key, JSON payload, headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: Headers,
}

impl Record {
    /// Returns the key as text when it is valid UTF-8.
    pub fn key_str(&self) -> Option<&str> {
        self.key.as_deref().and_then(|k| std::str::from_utf8(k).ok())
    }
}

/// A decoded inbound record.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub envelope: RawEnvelope,
    pub tenant: Tenant,
    pub span_id: Option<String>,
}

/// Encodes an envelope for `topic`, stamping tenant and span headers.
pub fn encode<B: Serialize>(
    topic: &str,
    key: Option<Vec<u8>>,
    envelope: &Envelope<B>,
    tenant: &Tenant,
) -> Result<Record, CodecError> {
    let payload = serde_json::to_vec(envelope)?;

    let mut headers = Headers::new();
    write_tenant(&mut headers, tenant);
    headers.insert(SPAN_ID_HEADER.to_string(), current_span_id());

    Ok(Record {
        topic: topic.to_string(),
        key,
        payload,
        headers,
    })
}

/// Decodes a record into its envelope and tenant.
pub fn decode(record: &Record) -> Result<Decoded, CodecError> {
    decode_parts(&record.topic, &record.payload, &record.headers)
}

/// Decodes a payload and its headers received on `topic`.
pub fn decode_parts(topic: &str, payload: &[u8], headers: &Headers) -> Result<Decoded, CodecError> {
    let envelope: RawEnvelope = serde_json::from_slice(payload)
        .map_err(|e| CodecError::MalformedEnvelope(format!("{topic}: {e}")))?;

    if envelope.kind.trim().is_empty() {
        return Err(CodecError::MalformedEnvelope(format!(
            "{topic}: empty type"
        )));
    }

    let tenant = read_tenant(headers)?;

    Ok(Decoded {
        envelope,
        tenant,
        span_id: headers.get(SPAN_ID_HEADER).cloned(),
    })
}

fn current_span_id() -> String {
    match tracing::Span::current().id() {
        Some(id) => format!("{:016x}", id.into_u64()),
        None => Uuid::new_v4().simple().to_string()[..16].to_string(),
    }
}
