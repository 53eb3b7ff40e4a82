//! # Detection Coordinator
//!
//! ```text
//!  RawSample ─► Normalizer ─┐
//!                           ▼
//!  Event ──────────────► process ──► routes[kind] ──► Check::on_event ─┐
//!                           │          (per-session lock)              │
//!                           │                                          ▼ Score
//!                           │     VerdictSinks ◄── transitions ◄── Ledger::apply
//!                           │                                          │
//!                           └───────────────► ClusterSync::publish ◄───┘
//!                                             (queue, never blocks)
//! ```
//!
//! ## Fault Containment
//!
//! A check that returns an error (or a score under someone else's key) is
//! skipped for that event and keeps its per-player history. A check that
//! panics is skipped too, and its state for that player is rebuilt since
//! the unwind may have interrupted an update. The remaining checks still
//! run. A panicking sink loses that one delivery. Nothing propagates to
//! the calling host thread.

use crate::config::{check_cluster_ttl, EngineConfig, SessionConfig};
use crate::error::{EngineError, EngineResult};
use crate::sink::VerdictKind;
use serde::Serialize;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil_audit::{AuditLog, AuditStats};
use vigil_cluster::{ClusterEntry, ClusterKey, ClusterStore, ClusterSync, SyncStats};
use vigil_detection::{
    decode, default_checks, Check, CheckError, ConfigHandle, DetectionConfig, LedgerUpdate, NormalizeError,
    Normalizer, PlayerSession, Score, SessionRegistry, SweepReport, Transition, ViolationLedger, ViolationRecord,
    ViolationState,
};
use vigil_shared::{CheckId, Event, EventKind, Evidence, PlayerId, RawSample, Timestamp, Verdict, VerdictSink};

/// Outcome of processing one event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessReport {
    /// Scores of the checks that ran, in registration order.
    pub scores: Vec<Score>,
    /// Checks that failed on this event.
    pub failed: Vec<CheckId>,
    /// Ledger state changes caused by this event.
    pub transitions: Vec<(CheckId, Transition)>,
}

impl ProcessReport {
    /// Score of one check, if it ran.
    #[must_use]
    pub fn score(&self, check: CheckId) -> Option<&Score> {
        self.scores.iter().find(|s| s.check == check)
    }

    /// Highest confidence among the scores, `0.0` if none ran.
    #[must_use]
    pub fn max_confidence(&self) -> f64 {
        self.scores.iter().map(|s| s.confidence).fold(0.0, f64::max)
    }

    /// True if `check` moved into `state` on this event.
    #[must_use]
    pub fn entered(&self, check: CheckId, state: ViolationState) -> bool {
        self.transitions.iter().any(|(c, t)| *c == check && t.to == state)
    }
}

/// Outcome of [`DetectionEngine::sweep`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Sessions torn down for inactivity.
    pub sessions_expired: usize,
    /// Ledger housekeeping.
    pub ledger: SweepReport,
}

/// Engine counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Events processed.
    pub events: u64,
    /// Raw samples rejected by the normalizer.
    pub rejected: u64,
    /// Scores produced.
    pub scores: u64,
    /// Check failures (errors and panics).
    pub check_failures: u64,
    /// Report-threshold crossings.
    pub flagged: u64,
    /// Punish-threshold crossings.
    pub verdicts: u64,
    /// Sink deliveries that panicked.
    pub sink_failures: u64,
    /// Records overwritten by newer cluster state.
    pub remote_merges: u64,
    /// Sessions created.
    pub sessions_created: u64,
    /// Sessions torn down.
    pub sessions_closed: u64,
    /// Live sessions.
    pub active_sessions: usize,
    /// Live violation records.
    pub ledger_records: usize,
    /// Detection config generation.
    pub config_generation: u64,
    /// Synchronizer counters, when clustered.
    pub sync: Option<SyncStats>,
    /// Audit counters, when auditing.
    pub audit: Option<AuditStats>,
}

#[derive(Debug, Default)]
struct Counters {
    events: AtomicU64,
    rejected: AtomicU64,
    scores: AtomicU64,
    check_failures: AtomicU64,
    flagged: AtomicU64,
    verdicts: AtomicU64,
    sink_failures: AtomicU64,
    remote_merges: AtomicU64,
    sessions_created: AtomicU64,
    sessions_closed: AtomicU64,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Queues a level with an expiry long enough for it to decay to Clean.
fn publish_record(sync: &ClusterSync, config: &DetectionConfig, key: ClusterKey, entry: ClusterEntry) {
    let keep_ms = config.ledger_params(key.check).decay_to_clean_ms(entry.level);
    sync.publish_with_ttl(key, entry, Duration::from_millis(keep_ms));
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Assembles a [`DetectionEngine`].
pub struct EngineBuilder {
    config: EngineConfig,
    checks: Option<Vec<Box<dyn Check>>>,
    extra_checks: Vec<Box<dyn Check>>,
    sinks: Vec<Arc<dyn VerdictSink>>,
    store: Option<Arc<dyn ClusterStore>>,
}

impl EngineBuilder {
    /// Starts from a configuration with the built-in check catalogue.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            checks: None,
            extra_checks: Vec::new(),
            sinks: Vec::new(),
            store: None,
        }
    }

    /// Replaces the built-in catalogue.
    #[must_use]
    pub fn with_checks(mut self, checks: Vec<Box<dyn Check>>) -> Self {
        self.checks = Some(checks);
        self
    }

    /// Registers an additional check.
    #[must_use]
    pub fn with_check(mut self, check: Box<dyn Check>) -> Self {
        self.extra_checks.push(check);
        self
    }

    /// Adds a verdict receiver.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn VerdictSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Replicates through a shared store (unless `sync.enabled` is off).
    #[must_use]
    pub fn with_cluster_store(mut self, store: Arc<dyn ClusterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validates everything and starts the background workers.
    ///
    /// # Errors
    ///
    /// Invalid configuration, duplicate or subscription-less checks, a
    /// synchronizer that cannot start, or an audit log that cannot open.
    pub fn build(self) -> EngineResult<DetectionEngine> {
        let Self {
            config,
            checks,
            extra_checks,
            mut sinks,
            store,
        } = self;
        config.validate()?;

        let mut checks = checks.unwrap_or_else(default_checks);
        checks.extend(extra_checks);
        let mut seen = HashSet::new();
        for check in &checks {
            if !seen.insert(check.id()) {
                return Err(EngineError::DuplicateCheck(check.id()));
            }
            if check.subscriptions().is_empty() {
                return Err(EngineError::NoSubscriptions(check.id()));
            }
        }
        let routes: [Vec<usize>; EventKind::COUNT] = std::array::from_fn(|kind| {
            checks
                .iter()
                .enumerate()
                .filter(|(_, check)| check.subscriptions().contains(&EventKind::ALL[kind]))
                .map(|(index, _)| index)
                .collect()
        });

        let sync = match store {
            Some(store) if config.sync.enabled => Some(ClusterSync::start(store, config.sync)?),
            Some(_) => {
                tracing::info!("cluster store supplied but sync disabled, running local-only");
                None
            }
            None => None,
        };
        let audit = if config.audit.enabled {
            let log = Arc::new(AuditLog::open(&config.audit)?);
            sinks.push(Arc::clone(&log) as Arc<dyn VerdictSink>);
            Some(log)
        } else {
            None
        };

        tracing::info!(
            checks = checks.len(),
            sinks = sinks.len(),
            clustered = sync.is_some(),
            audited = audit.is_some(),
            "detection engine ready"
        );
        Ok(DetectionEngine {
            config: ConfigHandle::new(config.detection)?,
            session_config: config.session,
            checks,
            routes,
            sessions: SessionRegistry::new(),
            normalizer: Normalizer::new(),
            ledger: ViolationLedger::new(),
            sinks,
            sync,
            audit,
            counters: Counters::default(),
            stopped: AtomicBool::new(false),
        })
    }
}

/// The detection coordinator.
///
/// Every method takes `&self`; share the engine across host threads with
/// an `Arc`. Events of one player must arrive in timestamp order (the host
/// usually handles a player on one thread); different players never
/// contend.
pub struct DetectionEngine {
    config: ConfigHandle,
    session_config: SessionConfig,
    checks: Vec<Box<dyn Check>>,
    routes: [Vec<usize>; EventKind::COUNT],
    sessions: SessionRegistry,
    normalizer: Normalizer,
    ledger: ViolationLedger,
    sinks: Vec<Arc<dyn VerdictSink>>,
    sync: Option<ClusterSync>,
    audit: Option<Arc<AuditLog>>,
    counters: Counters,
    stopped: AtomicBool,
}

impl DetectionEngine {
    /// Builder with the given configuration.
    #[must_use]
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Local-only engine with the built-in checks and no sinks.
    ///
    /// # Errors
    ///
    /// As [`EngineBuilder::build`].
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        EngineBuilder::new(config).build()
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Opens a session and pulls the player's cluster state. Returns
    /// `false` if the session already existed.
    pub fn player_joined(&self, player: PlayerId, now: Timestamp) -> bool {
        let config = self.config.snapshot();
        let (_, created) = self
            .sessions
            .get_or_create(player, || PlayerSession::new(player, now, &self.checks, &config));
        if created {
            self.on_session_created(player, now);
        }
        created
    }

    /// Tears the session down and hands the player's records to the
    /// synchronizer. Returns `false` if there was no session.
    pub fn player_left(&self, player: PlayerId, _now: Timestamp) -> bool {
        let removed = self.sessions.remove(player).is_some();
        self.close_session(player, removed)
    }

    fn close_session(&self, player: PlayerId, removed: bool) -> bool {
        self.normalizer.forget(player);
        let records = self.ledger.records_for(player);
        if let Some(sync) = &self.sync {
            let config = self.config.snapshot();
            for record in &records {
                publish_record(sync, &config, ClusterKey::new(record.check, player), ClusterEntry::from(record));
            }
        }
        if removed {
            bump(&self.counters.sessions_closed);
            tracing::info!(%player, flushed = records.len(), "session closed");
        }
        removed
    }

    /// Merges newer cluster state for every check of `player` into the
    /// ledger. Blocks for at most the fetch timeout. Returns the number of
    /// records that changed.
    pub fn sync_player(&self, player: PlayerId, now: Timestamp) -> usize {
        let Some(sync) = &self.sync else {
            return 0;
        };
        let config = self.config.snapshot();
        let keys: Vec<ClusterKey> = self.checks.iter().map(|c| ClusterKey::new(c.id(), player)).collect();
        let entries = sync.fetch_many(&keys);

        let mut merged = 0;
        for (key, entry) in keys.iter().zip(entries) {
            let Some(entry) = entry else { continue };
            let params = config.ledger_params(key.check);
            if let Some(update) = self.ledger.apply_remote(player, key.check, entry.to_remote(), &params, now) {
                merged += 1;
                tracing::debug!(
                    %player,
                    check = %key.check,
                    level = update.level,
                    state = update.state.name(),
                    "adopted cluster state"
                );
            }
        }
        self.counters.remote_merges.fetch_add(merged as u64, Ordering::Relaxed);
        merged
    }

    fn on_session_created(&self, player: PlayerId, now: Timestamp) {
        bump(&self.counters.sessions_created);
        let merged = if self.session_config.fetch_on_join {
            self.sync_player(player, now)
        } else {
            0
        };
        tracing::info!(%player, merged, "session created");
    }

    // =========================================================================
    // Event path
    // =========================================================================

    /// Normalizes and processes a raw sample.
    ///
    /// # Errors
    ///
    /// The sample was malformed; nothing reached the checks.
    pub fn ingest(&self, raw: &RawSample) -> Result<ProcessReport, NormalizeError> {
        let config = self.config.snapshot();
        match self.normalizer.normalize(&config.normalizer, raw) {
            Ok(event) => Ok(self.process_with(&config, &event)),
            Err(err) => {
                bump(&self.counters.rejected);
                tracing::warn!(player = raw.player_id, error = %err, "malformed sample rejected");
                Err(err)
            }
        }
    }

    /// Decodes, normalizes and processes wire bytes.
    ///
    /// # Errors
    ///
    /// The bytes were not a valid sample.
    pub fn ingest_bytes(&self, bytes: &[u8]) -> Result<ProcessReport, NormalizeError> {
        match decode(bytes) {
            Ok(raw) => self.ingest(&raw),
            Err(err) => {
                bump(&self.counters.rejected);
                tracing::warn!(len = bytes.len(), error = %err, "undecodable sample rejected");
                Err(err)
            }
        }
    }

    /// Runs every subscribed, enabled check on `event` and feeds the
    /// ledger. Creates the session on first contact.
    pub fn process(&self, event: &Event) -> ProcessReport {
        let config = self.config.snapshot();
        self.process_with(&config, event)
    }

    fn process_with(&self, config: &DetectionConfig, event: &Event) -> ProcessReport {
        let player = event.player();
        let now = event.timestamp();
        bump(&self.counters.events);

        let (handle, created) = self
            .sessions
            .get_or_create(player, || PlayerSession::new(player, now, &self.checks, config));
        if created {
            self.on_session_created(player, now);
        }

        let mut report = ProcessReport::default();
        let mut session = handle.lock();
        session.touch(now);
        session.capture(event, config.replay.max_bytes);
        for &index in &self.routes[event.kind().index()] {
            let check = self.checks[index].as_ref();
            if !config.common(check.id()).enabled {
                continue;
            }
            let Some(score) = self.run_check(check, index, &mut session, config, event) else {
                report.failed.push(check.id());
                continue;
            };
            let params = config.ledger_params(check.id());
            let update = self.ledger.apply(&score, &params, now);
            self.after_update(config, &session, &update, &score, &mut report);
            report.scores.push(score);
        }
        report
    }

    fn run_check(
        &self,
        check: &dyn Check,
        index: usize,
        session: &mut PlayerSession,
        config: &DetectionConfig,
        event: &Event,
    ) -> Option<Score> {
        let id = check.id();
        let Some(state) = session.state_mut(index) else {
            tracing::warn!(player = %event.player(), check = %id, "session has no state for check");
            return None;
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| check.on_event(config, state, event)));
        let (failure, poisoned) = match outcome {
            Ok(Ok(score)) if score.check == id && score.player == event.player() => {
                bump(&self.counters.scores);
                return Some(score);
            }
            Ok(Ok(score)) => (
                CheckError::Failed {
                    check: id,
                    reason: format!("scored {}:{} instead of its own key", score.check, score.player),
                },
                false,
            ),
            Ok(Err(err)) => (err, false),
            Err(payload) => (
                CheckError::Failed {
                    check: id,
                    reason: format!("panicked: {}", panic_message(payload.as_ref())),
                },
                true,
            ),
        };

        bump(&self.counters.check_failures);
        tracing::warn!(player = %event.player(), check = %id, error = %failure, "check failed, skipped for this event");
        // A panic may have left the state half-updated.
        if poisoned {
            session.reset_state(index, check, config);
        }
        None
    }

    fn after_update(
        &self,
        config: &DetectionConfig,
        session: &PlayerSession,
        update: &LedgerUpdate,
        score: &Score,
        report: &mut ProcessReport,
    ) {
        for transition in &update.transitions {
            report.transitions.push((update.check, *transition));
            let kind = match (transition.from, transition.to) {
                (ViolationState::Warming, ViolationState::Flagged) => VerdictKind::Flagged,
                (_, ViolationState::Suppressed) => VerdictKind::Punish,
                _ => continue,
            };
            let cutoff = Timestamp(score.timestamp.as_millis().saturating_sub(config.replay.verdict_window_ms));
            self.emit(kind, update, score, session.replay().since(cutoff));
        }
        if update.is_significant() {
            if let Some(sync) = &self.sync {
                publish_record(
                    sync,
                    config,
                    ClusterKey::new(update.check, update.player),
                    ClusterEntry {
                        level: update.level,
                        timestamp: update.last_update,
                        suppressed_until: update.suppressed_until,
                    },
                );
            }
        }
    }

    fn emit(&self, kind: VerdictKind, update: &LedgerUpdate, score: &Score, replay: Vec<Event>) {
        let evidence = if score.evidence.is_empty() {
            self.ledger
                .get(update.player, update.check)
                .map_or_else(Evidence::new, |record| record.evidence)
        } else {
            score.evidence.clone()
        };
        let verdict = Verdict {
            player: update.player,
            check: update.check,
            level: update.level,
            evidence,
            timestamp: score.timestamp,
            replay,
        };

        match kind {
            VerdictKind::Flagged => {
                bump(&self.counters.flagged);
                tracing::info!(player = %verdict.player, check = %verdict.check, level = verdict.level, "player flagged");
            }
            VerdictKind::Punish => {
                bump(&self.counters.verdicts);
                tracing::info!(player = %verdict.player, check = %verdict.check, level = verdict.level, "verdict issued");
            }
        }

        for sink in &self.sinks {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| match kind {
                VerdictKind::Flagged => sink.flagged(&verdict),
                VerdictKind::Punish => sink.verdict(&verdict),
            }));
            if let Err(payload) = delivered {
                bump(&self.counters.sink_failures);
                tracing::warn!(
                    player = %verdict.player,
                    check = %verdict.check,
                    panic = panic_message(payload.as_ref()),
                    "verdict sink panicked, delivery lost"
                );
            }
        }
    }

    // =========================================================================
    // Housekeeping and queries
    // =========================================================================

    /// Closes idle sessions and drops records that decayed away.
    pub fn sweep(&self, now: Timestamp) -> SweepSummary {
        let expired = self.sessions.remove_idle(now, self.session_config.idle_timeout_ms);
        for player in &expired {
            self.close_session(*player, true);
        }
        let config = self.config.snapshot();
        let ledger = self.ledger.sweep(now, |check| config.ledger_params(check));
        if !expired.is_empty() || ledger.removed > 0 {
            tracing::debug!(
                sessions_expired = expired.len(),
                records_removed = ledger.removed,
                records_retained = ledger.retained,
                "sweep"
            );
        }
        SweepSummary {
            sessions_expired: expired.len(),
            ledger,
        }
    }

    /// Copy of one violation record (level as of its last update).
    #[must_use]
    pub fn violation(&self, player: PlayerId, check: CheckId) -> Option<ViolationRecord> {
        self.ledger.get(player, check)
    }

    /// Level decayed to `now`, `0.0` without a record.
    #[must_use]
    pub fn level(&self, player: PlayerId, check: CheckId, now: Timestamp) -> f64 {
        let params = self.config.snapshot().ledger_params(check);
        self.ledger.level_at(player, check, &params, now)
    }

    /// Captured recent events of a live session, oldest first. Pass a
    /// cutoff to keep only events at or after it.
    #[must_use]
    pub fn replay(&self, player: PlayerId, since: Option<Timestamp>) -> Option<Vec<Event>> {
        let handle = self.sessions.get(player)?;
        let session = handle.lock();
        Some(since.map_or_else(|| session.replay().snapshot(), |cutoff| session.replay().since(cutoff)))
    }

    /// True if a session is live.
    #[must_use]
    pub fn has_session(&self, player: PlayerId) -> bool {
        self.sessions.get(player).is_some()
    }

    /// Registered check ids, in registration order.
    #[must_use]
    pub fn check_ids(&self) -> Vec<CheckId> {
        self.checks.iter().map(|c| c.id()).collect()
    }

    /// Current detection snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<DetectionConfig> {
        self.config.snapshot()
    }

    /// Atomically replaces the detection snapshot. Events already running
    /// finish on the old one. Window sizes apply to sessions created later.
    ///
    /// # Errors
    ///
    /// The new config is invalid, or its decay outlives the cluster key
    /// expiry; the old one stays active.
    pub fn reload_config(&self, config: DetectionConfig) -> EngineResult<()> {
        if let Some(sync) = &self.sync {
            config.validate()?;
            check_cluster_ttl(&config, sync.config())?;
        }
        self.config.swap(config)?;
        Ok(())
    }

    /// Synchronizer, when clustered.
    #[must_use]
    pub fn cluster(&self) -> Option<&ClusterSync> {
        self.sync.as_ref()
    }

    /// Waits until queued cluster writes are done. `true` when local-only.
    pub fn flush_cluster(&self, timeout: Duration) -> bool {
        self.sync.as_ref().map_or(true, |sync| sync.flush(timeout))
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let c = &self.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        EngineStats {
            events: load(&c.events),
            rejected: load(&c.rejected),
            scores: load(&c.scores),
            check_failures: load(&c.check_failures),
            flagged: load(&c.flagged),
            verdicts: load(&c.verdicts),
            sink_failures: load(&c.sink_failures),
            remote_merges: load(&c.remote_merges),
            sessions_created: load(&c.sessions_created),
            sessions_closed: load(&c.sessions_closed),
            active_sessions: self.sessions.len(),
            ledger_records: self.ledger.len(),
            config_generation: self.config.generation(),
            sync: self.sync.as_ref().map(ClusterSync::stats),
            audit: self.audit.as_ref().map(|log| log.stats()),
        }
    }

    /// Publishes every live record, then stops the synchronizer and the
    /// audit writer. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(sync) = &self.sync {
            let config = self.config.snapshot();
            for player in self.sessions.players() {
                for record in self.ledger.records_for(player) {
                    publish_record(sync, &config, ClusterKey::new(record.check, player), ClusterEntry::from(&record));
                }
            }
            sync.shutdown();
        }
        if let Some(audit) = &self.audit {
            audit.close();
        }
        tracing::info!(stats = ?self.stats(), "detection engine stopped");
    }
}

impl Drop for DetectionEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DetectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionEngine")
            .field("checks", &self.check_ids())
            .field("sessions", &self.sessions.len())
            .field("clustered", &self.sync.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_shared::Vec3;

    struct Always(CheckId, f64);

    impl Check for Always {
        fn id(&self) -> CheckId {
            self.0
        }

        fn subscriptions(&self) -> &[EventKind] {
            &[EventKind::Swing]
        }

        fn new_state(&self, _config: &DetectionConfig) -> vigil_detection::CheckState {
            vigil_detection::CheckState::Stateless
        }

        fn on_event(
            &self,
            _config: &DetectionConfig,
            _state: &mut vigil_detection::CheckState,
            event: &Event,
        ) -> Result<Score, CheckError> {
            Ok(Score::new(self.0, event, self.1, Evidence::new().with("constant", self.1)))
        }
    }

    #[test]
    fn test_routes_by_kind() {
        let engine = DetectionEngine::new(EngineConfig::default()).unwrap();
        let report = engine.process(&Event::movement(PlayerId(1), Timestamp(1_000), Vec3::ZERO, Vec3::ZERO));
        let ran: Vec<CheckId> = report.scores.iter().map(|s| s.check).collect();
        assert_eq!(ran, vec![CheckId::SPEED, CheckId::TIMER]);

        let report = engine.process(&Event::attack(PlayerId(1), Timestamp(1_050), 2.0, 50.0));
        assert_eq!(report.scores.len(), 1);
        assert_eq!(report.scores[0].check, CheckId::REACH);
    }

    #[test]
    fn test_duplicate_check_rejected() {
        let result = DetectionEngine::builder(EngineConfig::default())
            .with_check(Box::new(Always(CheckId::SPEED, 0.0)))
            .build();
        assert!(matches!(result, Err(EngineError::DuplicateCheck(id)) if id == CheckId::SPEED));
    }

    #[test]
    fn test_disabled_check_skipped_after_reload() {
        let engine = DetectionEngine::builder(EngineConfig::default())
            .with_checks(vec![Box::new(Always(CheckId("constant"), 1.0))])
            .build()
            .unwrap();
        assert_eq!(engine.process(&Event::swing(PlayerId(1), Timestamp(10))).scores.len(), 1);

        let mut config = (*engine.config()).clone();
        config.checks.custom.insert(
            "constant".into(),
            vigil_detection::CommonOverrides {
                enabled: Some(false),
                ..Default::default()
            },
        );
        engine.reload_config(config).unwrap();
        assert!(engine.process(&Event::swing(PlayerId(1), Timestamp(20))).scores.is_empty());
        assert_eq!(engine.stats().config_generation, 1);
    }

    #[test]
    fn test_sessions_lifecycle() {
        let config = EngineConfig {
            session: SessionConfig {
                idle_timeout_ms: 1_000,
                ..SessionConfig::default()
            },
            ..EngineConfig::default()
        };
        let engine = DetectionEngine::new(config).unwrap();
        assert!(engine.player_joined(PlayerId(1), Timestamp(0)));
        assert!(!engine.player_joined(PlayerId(1), Timestamp(10)));
        engine.process(&Event::swing(PlayerId(2), Timestamp(900)));
        assert!(engine.has_session(PlayerId(2)));

        let summary = engine.sweep(Timestamp(1_500));
        assert_eq!(summary.sessions_expired, 1);
        assert!(!engine.has_session(PlayerId(1)));
        assert!(engine.has_session(PlayerId(2)));
        assert!(engine.player_left(PlayerId(2), Timestamp(1_600)));
        assert!(!engine.player_left(PlayerId(2), Timestamp(1_700)));

        let stats = engine.stats();
        assert_eq!(stats.sessions_created, 2);
        assert_eq!(stats.sessions_closed, 2);
        assert_eq!(stats.active_sessions, 0);
    }

    #[test]
    fn test_malformed_bytes_counted() {
        let engine = DetectionEngine::new(EngineConfig::default()).unwrap();
        assert!(engine.ingest_bytes(&[0u8; 7]).is_err());
        let mut raw = RawSample::attack(PlayerId(1), Timestamp(5), f64::NAN, 10.0);
        assert!(engine.ingest(&raw).is_err());
        raw.values[0] = 2.5;
        assert!(engine.ingest(&raw).is_ok());
        let stats = engine.stats();
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.events, 1);
    }
}
