//! Torn-tail handling across a simulated crash.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use vigil_audit::{AuditConfig, AuditError, AuditKind, AuditLog, AuditReader, AuditSummary};
use vigil_shared::{CheckId, Evidence, PlayerId, Timestamp, Verdict, VerdictSink};

fn temp_log_path(name: &str) -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("vigil_audit_it_{name}_{id}.log"))
}

fn verdict(player: u64, check: CheckId) -> Verdict {
    Verdict {
        player: PlayerId(player),
        check,
        level: 12.0,
        evidence: Evidence::new().with("z", 4.5),
        timestamp: Timestamp(1_000 * player),
        replay: Vec::new(),
    }
}

#[test]
fn test_reopen_after_torn_write() {
    let path = temp_log_path("torn");
    {
        let log = AuditLog::open(&AuditConfig::at(&path)).unwrap();
        log.verdict(&verdict(1, CheckId::SPEED));
        log.verdict(&verdict(2, CheckId::REACH));
        assert!(log.flush(Duration::from_secs(2)));
    }

    // Half a frame header, as left by a crash mid-write.
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0x40, 0x00, 0x00]).unwrap();
    drop(file);

    let mut reader = AuditReader::open(&path).unwrap();
    assert_eq!(reader.by_ref().count(), 2);
    assert!(reader.has_torn_tail());

    {
        let log = AuditLog::open(&AuditConfig::at(&path)).unwrap();
        log.flagged(&verdict(3, CheckId::TIMER));
    }

    let mut reader = AuditReader::open(&path).unwrap();
    let summary = AuditSummary::collect(reader.by_ref());
    assert!(!reader.has_torn_tail());
    assert_eq!(summary.records, 3);
    assert_eq!(summary.checks["timer"].flags, 1);
    assert_eq!(summary.players[&PlayerId(2)].checks.iter().next().map(String::as_str), Some("reach"));
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_corrupt_log_refuses_to_open() {
    let path = temp_log_path("corrupt");
    {
        let log = AuditLog::open(&AuditConfig::at(&path)).unwrap();
        log.verdict(&verdict(1, CheckId::ROTATION));
    }
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 2;
    bytes[last] ^= 0x20;
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        AuditLog::open(&AuditConfig::at(&path)),
        Err(AuditError::Corrupt { .. })
    ));
    let kinds: Vec<_> = AuditReader::open(&path).unwrap().collect();
    assert_eq!(kinds.len(), 1);
    assert!(kinds[0].is_err());
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_records_keep_kind_and_evidence() {
    let path = temp_log_path("kinds");
    {
        let log = AuditLog::open(&AuditConfig::at(&path)).unwrap();
        log.flagged(&verdict(5, CheckId::FAST_PLACE));
        log.verdict(&verdict(5, CheckId::FAST_PLACE));
    }
    let records: Vec<_> = AuditReader::open(&path).unwrap().map(Result::unwrap).collect();
    assert_eq!(records[0].kind, AuditKind::Flagged);
    assert_eq!(records[1].kind, AuditKind::Verdict);
    assert_eq!(records[1].evidence.get("z"), Some(&4.5));
    assert_eq!(records[1].check, "fast_place");
    std::fs::remove_file(&path).ok();
}
