//! # Audit Record Format
//!
//! ```text
//! file   = header record*
//! header = "VAUD" [version:4 LE]
//! record = [len:4 LE][crc32(payload):4 LE][payload: len bytes of JSON]
//! ```
//!
//! A crash can leave a partial record at the end of the file. Readers stop
//! there without error; a complete record whose checksum fails is reported
//! as corruption.

use crate::error::{AuditError, AuditResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vigil_shared::{Event, PlayerId, Timestamp, Verdict};

/// File magic.
pub const AUDIT_MAGIC: &[u8; 4] = b"VAUD";

/// Current format version.
pub const AUDIT_VERSION: u32 = 1;

/// Header size in bytes.
pub const HEADER_LEN: u64 = 8;

/// Per-record framing overhead in bytes.
pub const FRAME_OVERHEAD: usize = 8;

/// Largest payload a reader accepts. Anything bigger is a corrupt length.
pub const MAX_PAYLOAD: usize = 1 << 20;

/// What the record documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Report threshold crossed.
    Flagged,
    /// Punish threshold crossed.
    Verdict,
}

/// One persisted flag or verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Flag or verdict.
    pub kind: AuditKind,
    /// Player.
    pub player: PlayerId,
    /// Check name.
    pub check: String,
    /// Violation level at the crossing.
    pub level: f64,
    /// Evidence of the score that caused the crossing.
    pub evidence: BTreeMap<String, f64>,
    /// Time of the crossing.
    pub timestamp: Timestamp,
    /// Events the player sent leading up to the crossing, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replay: Vec<Event>,
}

impl AuditRecord {
    /// Builds a record from an outbound verdict.
    #[must_use]
    pub fn from_verdict(kind: AuditKind, verdict: &Verdict) -> Self {
        Self {
            kind,
            player: verdict.player,
            check: verdict.check.as_str().to_owned(),
            level: verdict.level,
            evidence: verdict
                .evidence
                .iter()
                .map(|(key, value)| (key.to_owned(), value))
                .collect(),
            timestamp: verdict.timestamp,
            replay: verdict.replay.clone(),
        }
    }

    /// Encodes a full frame (length, checksum, payload).
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Encode`] if the record does not serialize.
    pub fn encode_frame(&self) -> AuditResult<Vec<u8>> {
        let payload = serde_json::to_vec(self).map_err(|e| AuditError::Encode(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| (*len as usize) <= MAX_PAYLOAD)
            .ok_or_else(|| AuditError::Encode(format!("payload of {} bytes too large", payload.len())))?;

        let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decodes and verifies a payload.
    pub(crate) fn decode_payload(offset: u64, crc: u32, payload: &[u8]) -> AuditResult<Self> {
        let computed = crc32fast::hash(payload);
        if computed != crc {
            return Err(AuditError::Corrupt {
                offset,
                reason: format!("checksum {computed:08x} != stored {crc:08x}"),
            });
        }
        serde_json::from_slice(payload).map_err(|e| AuditError::Corrupt {
            offset,
            reason: e.to_string(),
        })
    }
}

/// File header bytes.
#[must_use]
pub fn header() -> [u8; HEADER_LEN as usize] {
    let mut bytes = [0u8; HEADER_LEN as usize];
    bytes[..4].copy_from_slice(AUDIT_MAGIC);
    bytes[4..].copy_from_slice(&AUDIT_VERSION.to_le_bytes());
    bytes
}
