//! # Audit Log Writer
//!
//! ```text
//! VerdictSink::verdict ──► append() ──► bounded buffer ──► writer thread
//!        (any thread)      never blocks     │               frame + write
//!                          full => drop     │               flush (+fsync)
//!                                           └── condvar wakeup
//! ```
//!
//! Opening an existing log verifies it and cuts off a torn tail left by a
//! crash so new records land after the last good one.

use crate::config::AuditConfig;
use crate::error::{io_error, AuditError, AuditResult};
use crate::reader::AuditReader;
use crate::record::{header, AuditKind, AuditRecord};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use vigil_shared::{Verdict, VerdictSink};

/// Writer counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    /// Records accepted by `append`.
    pub appended: u64,
    /// Records dropped because the buffer was full or the log closed.
    pub dropped: u64,
    /// Records written.
    pub written: u64,
    /// Records lost to write errors.
    pub failed: u64,
    /// Batches flushed.
    pub batches: u64,
    /// Bytes written, framing included.
    pub bytes: u64,
}

struct Shared {
    buffer: Mutex<VecDeque<AuditRecord>>,
    not_empty: Condvar,
    in_flight: AtomicUsize,
    shutdown: AtomicBool,
    stats: Mutex<AuditStats>,
}

/// Background-written append-only verdict log.
pub struct AuditLog {
    path: PathBuf,
    capacity: usize,
    shared: Arc<Shared>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLog {
    /// Opens (or creates) the log at `config.path` and starts the writer.
    ///
    /// # Errors
    ///
    /// Invalid config, I/O failure, a file that is not an audit log, or a
    /// corrupt record in the existing file.
    pub fn open(config: &AuditConfig) -> AuditResult<Self> {
        config.validate()?;
        let path = config.path.clone();
        let file = prepare_file(&path)?;

        let shared = Arc::new(Shared {
            buffer: Mutex::new(VecDeque::with_capacity(config.buffer_capacity.min(1_024))),
            not_empty: Condvar::new(),
            in_flight: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            stats: Mutex::new(AuditStats::default()),
        });

        let writer_shared = Arc::clone(&shared);
        let writer_config = config.clone();
        let writer = thread::Builder::new()
            .name("vigil-audit-writer".into())
            .spawn(move || writer_loop(file, &writer_shared, &writer_config))
            .map_err(AuditError::Spawn)?;

        tracing::info!(path = %path.display(), "audit log opened");
        Ok(Self {
            path,
            capacity: config.buffer_capacity,
            shared,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Queues a record. Returns `false` if the buffer was full and the
    /// record was dropped.
    pub fn append(&self, record: AuditRecord) -> bool {
        let mut buffer = self.shared.buffer.lock();
        if buffer.len() >= self.capacity || self.shared.shutdown.load(Ordering::SeqCst) {
            drop(buffer);
            self.shared.stats.lock().dropped += 1;
            return false;
        }
        buffer.push_back(record);
        drop(buffer);
        self.shared.not_empty.notify_one();
        self.shared.stats.lock().appended += 1;
        true
    }

    /// Waits until everything appended so far is written. Returns `false`
    /// on timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let idle = self.shared.buffer.lock().is_empty() && self.shared.in_flight.load(Ordering::SeqCst) == 0;
            if idle {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            self.shared.not_empty.notify_one();
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> AuditStats {
        self.shared.stats.lock().clone()
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes what is buffered and stops the writer. Idempotent.
    pub fn close(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let buffer = self.shared.buffer.lock();
            self.shared.not_empty.notify_all();
            drop(buffer);
        }
        let writer = self.writer.lock().take();
        if let Some(handle) = writer {
            let _ = handle.join();
        }
        tracing::info!(path = %self.path.display(), stats = ?self.stats(), "audit log closed");
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        self.close();
    }
}

impl AuditLog {
    fn record(&self, kind: AuditKind, verdict: &Verdict) {
        if !self.append(AuditRecord::from_verdict(kind, verdict)) {
            tracing::warn!(
                player = %verdict.player,
                check = %verdict.check,
                ?kind,
                "audit log full or closed, record dropped"
            );
        }
    }
}

impl VerdictSink for AuditLog {
    fn verdict(&self, verdict: &Verdict) {
        self.record(AuditKind::Verdict, verdict);
    }

    fn flagged(&self, report: &Verdict) {
        self.record(AuditKind::Flagged, report);
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Creates the file with a header, or verifies an existing one and trims a
/// torn tail. Returns the file positioned for appending.
fn prepare_file(path: &Path) -> AuditResult<File> {
    let existing = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if existing > 0 {
        let mut reader = AuditReader::open(path)?;
        let mut records = 0u64;
        for record in reader.by_ref() {
            record?;
            records += 1;
        }
        if reader.has_torn_tail() {
            let file = OpenOptions::new().write(true).open(path).map_err(io_error(path))?;
            file.set_len(reader.valid_end()).map_err(io_error(path))?;
            tracing::warn!(
                path = %path.display(),
                kept = records,
                truncated_at = reader.valid_end(),
                "audit log had a torn tail, truncated"
            );
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error(path))?;
    if existing == 0 {
        file.write_all(&header()).map_err(io_error(path))?;
        file.sync_all().map_err(io_error(path))?;
    }
    Ok(file)
}

fn writer_loop(file: File, shared: &Shared, config: &AuditConfig) {
    let mut writer = BufWriter::with_capacity(64 * 1024, file);
    loop {
        let (batch, stopping) = {
            let mut buffer = shared.buffer.lock();
            if buffer.is_empty() && !shared.shutdown.load(Ordering::SeqCst) {
                shared.not_empty.wait_for(&mut buffer, config.flush_interval());
            }
            let stopping = shared.shutdown.load(Ordering::SeqCst);
            let take = if stopping { buffer.len() } else { buffer.len().min(config.batch_size) };
            let batch: Vec<AuditRecord> = buffer.drain(..take).collect();
            shared.in_flight.fetch_add(batch.len(), Ordering::SeqCst);
            (batch, stopping)
        };

        if !batch.is_empty() {
            write_batch(&mut writer, &batch, shared, config);
            shared.in_flight.fetch_sub(batch.len(), Ordering::SeqCst);
        }
        if stopping {
            let _ = writer.flush();
            let _ = writer.get_ref().sync_all();
            return;
        }
    }
}

fn write_batch(writer: &mut BufWriter<File>, batch: &[AuditRecord], shared: &Shared, config: &AuditConfig) {
    let mut written = 0u64;
    let mut failed = 0u64;
    let mut bytes = 0u64;
    for record in batch {
        let result = record.encode_frame().and_then(|frame| {
            writer.write_all(&frame).map_err(io_error(&config.path))?;
            Ok(frame.len())
        });
        match result {
            Ok(len) => {
                written += 1;
                bytes += len as u64;
            }
            Err(err) => {
                failed += 1;
                tracing::error!(player = %record.player, check = %record.check, error = %err, "audit write failed");
            }
        }
    }

    let flushed = writer.flush().and_then(|()| {
        if config.sync_data {
            writer.get_ref().sync_data()
        } else {
            Ok(())
        }
    });
    if let Err(err) = flushed {
        tracing::error!(error = %err, "audit flush failed");
    }

    let mut stats = shared.stats.lock();
    stats.written += written;
    stats.failed += failed;
    stats.bytes += bytes;
    stats.batches += 1;
}
