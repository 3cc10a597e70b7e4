//! On-disk encoding of instance records.
//!
//! Records are stored as pretty-printed JSON with a fixed field order and
//! sorted labels, so encoding the same record always yields the same bytes.

use runu_common::error::{Result, RunuError};
use thiserror::Error;

use crate::record::InstanceRecord;

/// Why a byte buffer could not be decoded into a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not a well-formed record document.
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The record targets a runtime-spec version this runtime does not speak.
    #[error("unsupported spec version {0:?}")]
    UnsupportedSpecVersion(String),

    /// The fields decode but contradict each other.
    #[error("inconsistent record: {0}")]
    Inconsistent(&'static str),
}

/// Encodes a record into its on-disk bytes.
///
/// Only records that [`decode`] accepts are encoded.
///
/// # Errors
///
/// Returns [`RunuError::InvalidRecord`] if the record would not decode, or
/// an error if serialization fails.
pub fn encode(record: &InstanceRecord) -> Result<Vec<u8>> {
    validate(record).map_err(|e| RunuError::InvalidRecord {
        id: record.id().to_string(),
        reason: e.to_string(),
    })?;
    let mut bytes = serde_json::to_vec_pretty(record)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes on-disk bytes into a record.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the bytes are not well-formed, name an
/// unsupported spec version, or violate a record invariant.
pub fn decode(bytes: &[u8]) -> std::result::Result<InstanceRecord, DecodeError> {
    let record: InstanceRecord = serde_json::from_slice(bytes)?;
    validate(&record)?;
    Ok(record)
}

/// Checks what `decode` requires of a record beyond well-formed JSON.
fn validate(record: &InstanceRecord) -> std::result::Result<(), DecodeError> {
    if !record.has_supported_spec_version() {
        return Err(DecodeError::UnsupportedSpecVersion(
            record.spec_version().to_owned(),
        ));
    }
    if let Some(violation) = record.invariant_violation() {
        return Err(DecodeError::Inconsistent(violation));
    }
    Ok(())
}
