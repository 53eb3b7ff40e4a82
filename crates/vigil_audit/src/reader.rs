//! Sequential audit log reader.

use crate::error::{io_error, AuditError, AuditResult};
use crate::record::{AuditRecord, AUDIT_MAGIC, AUDIT_VERSION, FRAME_OVERHEAD, HEADER_LEN, MAX_PAYLOAD};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Iterates the records of an audit log.
///
/// Yields `Err` at most once: after a corrupt record or an I/O error the
/// iterator ends. A partial record at the end of the file ends iteration
/// without an error and sets [`AuditReader::has_torn_tail`].
pub struct AuditReader<R> {
    reader: R,
    path: PathBuf,
    /// Offset just past the last complete, verified record.
    valid_end: u64,
    torn_tail: bool,
    done: bool,
}

impl AuditReader<BufReader<File>> {
    /// Opens a log file and checks its header.
    ///
    /// # Errors
    ///
    /// I/O failure, wrong magic or unsupported version.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(io_error(path))?;
        Self::with_path(BufReader::new(file), path.to_path_buf())
    }
}

impl<R: Read> AuditReader<R> {
    /// Reads from any byte stream positioned at the header.
    ///
    /// # Errors
    ///
    /// I/O failure, wrong magic or unsupported version.
    pub fn new(reader: R) -> AuditResult<Self> {
        Self::with_path(reader, PathBuf::from("<stream>"))
    }

    fn with_path(mut reader: R, path: PathBuf) -> AuditResult<Self> {
        let mut header = [0u8; HEADER_LEN as usize];
        let read = read_full(&mut reader, &mut header).map_err(io_error(&path))?;
        if read < header.len() || &header[..4] != AUDIT_MAGIC {
            return Err(AuditError::BadMagic(path));
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != AUDIT_VERSION {
            return Err(AuditError::UnsupportedVersion {
                found: version,
                expected: AUDIT_VERSION,
            });
        }
        Ok(Self {
            reader,
            path,
            valid_end: HEADER_LEN,
            torn_tail: false,
            done: false,
        })
    }

    /// True if iteration stopped at a partial trailing record.
    #[must_use]
    pub const fn has_torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Offset just past the last verified record.
    #[must_use]
    pub const fn valid_end(&self) -> u64 {
        self.valid_end
    }

    fn read_record(&mut self) -> Option<AuditResult<AuditRecord>> {
        let offset = self.valid_end;
        let mut frame = [0u8; FRAME_OVERHEAD];
        match read_full(&mut self.reader, &mut frame) {
            Ok(0) => return None,
            Ok(n) if n < FRAME_OVERHEAD => {
                self.torn_tail = true;
                return None;
            }
            Ok(_) => {}
            Err(err) => return Some(Err(io_error(&self.path)(err))),
        }

        let len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        let crc = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        if len > MAX_PAYLOAD {
            return Some(Err(AuditError::Corrupt {
                offset,
                reason: format!("record length {len} exceeds {MAX_PAYLOAD}"),
            }));
        }

        let mut payload = vec![0u8; len];
        match read_full(&mut self.reader, &mut payload) {
            Ok(n) if n < len => {
                self.torn_tail = true;
                return None;
            }
            Ok(_) => {}
            Err(err) => return Some(Err(io_error(&self.path)(err))),
        }

        let record = AuditRecord::decode_payload(offset, crc, &payload);
        if record.is_ok() {
            self.valid_end = offset + (FRAME_OVERHEAD + len) as u64;
        }
        Some(record)
    }
}

impl<R: Read> Iterator for AuditReader<R> {
    type Item = AuditResult<AuditRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.read_record();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

/// Reads until `buf` is full or the stream ends. Returns bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{header, AuditKind};
    use std::collections::BTreeMap;
    use vigil_shared::{PlayerId, Timestamp};

    fn record(player: u64) -> AuditRecord {
        AuditRecord {
            kind: AuditKind::Verdict,
            player: PlayerId(player),
            check: "reach".into(),
            level: 8.0,
            evidence: BTreeMap::from([("distance".to_owned(), 4.1)]),
            timestamp: Timestamp(player * 10),
            replay: Vec::new(),
        }
    }

    fn log_bytes(count: u64) -> Vec<u8> {
        let mut bytes = header().to_vec();
        for player in 0..count {
            bytes.extend(record(player).encode_frame().unwrap());
        }
        bytes
    }

    #[test]
    fn test_reads_all_records() {
        let bytes = log_bytes(3);
        let mut reader = AuditReader::new(bytes.as_slice()).unwrap();
        let records: Vec<_> = reader.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(records, vec![record(0), record(1), record(2)]);
        assert!(!reader.has_torn_tail());
        assert_eq!(reader.valid_end(), bytes.len() as u64);
    }

    #[test]
    fn test_torn_tail_stops_cleanly() {
        let full = log_bytes(2);
        for cut in [full.len() - 1, full.len() - 20, full.len() - 30] {
            let mut reader = AuditReader::new(&full[..cut]).unwrap();
            let records: Vec<_> = reader.by_ref().collect::<Result<_, _>>().unwrap();
            assert_eq!(records, vec![record(0)], "cut at {cut}");
            assert!(reader.has_torn_tail());
        }
    }

    #[test]
    fn test_corruption_is_reported_once() {
        let mut bytes = log_bytes(3);
        let last = bytes.len() - 3;
        bytes[last] ^= 0x55;
        let results: Vec<_> = AuditReader::new(bytes.as_slice()).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[..2].iter().all(Result::is_ok));
        assert!(matches!(results[2], Err(AuditError::Corrupt { .. })));
    }

    #[test]
    fn test_rejects_foreign_file() {
        assert!(matches!(AuditReader::new(&b"PK\x03\x04rest"[..]), Err(AuditError::BadMagic(_))));
        let mut bytes = header().to_vec();
        bytes[4] = 9;
        assert!(matches!(
            AuditReader::new(bytes.as_slice()),
            Err(AuditError::UnsupportedVersion { found: 9, .. })
        ));
    }
}
