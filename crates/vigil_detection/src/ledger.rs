//! # Violation Ledger
//!
//! Decaying violation level per (player, check) plus an explicit state
//! machine that decides when the host hears about it.
//!
//! ```text
//!            nonzero score          level >= T1            level >= T2
//!   Clean ─────────────────► Warming ──────────► Flagged ──────────────► Suppressed
//!     ▲                         │                   ▲      (verdict, cooldown) │
//!     │                         │                   └──────────────────────────┘
//!     │                         │                        cooldown elapsed
//!     └─────────────────────────┴──── level < ε and no evidence for `grace_ms`
//!                                      (from any state)
//! ```
//!
//! Decay on every update: `level = level * exp(-Δt/τ) + confidence * weight`.
//!
//! Records live in a sharded map keyed by player, so two players never
//! contend on the same lock and a player's records are flushed together.

use crate::score::Score;
use dashmap::DashMap;
use vigil_shared::{CheckId, Evidence, PlayerId, Timestamp};

/// Ledger state of one (player, check) pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViolationState {
    /// No live evidence.
    #[default]
    Clean,
    /// Evidence accumulating below T1.
    Warming,
    /// Crossed T1 (reported).
    Flagged,
    /// Crossed T2 (verdict issued, cooldown running).
    Suppressed,
}

impl ViolationState {
    /// Transition table for score-driven updates.
    #[must_use]
    pub const fn allows(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Clean, Self::Warming)
                | (Self::Warming, Self::Flagged)
                | (Self::Flagged, Self::Suppressed)
                | (Self::Suppressed, Self::Flagged)
                | (Self::Warming | Self::Flagged | Self::Suppressed, Self::Clean)
        )
    }

    /// Lowercase name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Warming => "warming",
            Self::Flagged => "flagged",
            Self::Suppressed => "suppressed",
        }
    }
}

/// A state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Previous state.
    pub from: ViolationState,
    /// New state.
    pub to: ViolationState,
}

/// Decay and threshold parameters for one check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LedgerParams {
    /// Decay time constant τ (seconds).
    pub tau_secs: f64,
    /// Score multiplier.
    pub weight: f64,
    /// T1.
    pub flag_threshold: f64,
    /// T2.
    pub punish_threshold: f64,
    /// Cooldown after T2 (ms).
    pub cooldown_ms: u64,
    /// Levels below this count as zero.
    pub epsilon: f64,
    /// Quiet time before a record may return to Clean (ms).
    pub grace_ms: u64,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            tau_secs: 20.0,
            weight: 1.0,
            flag_threshold: 4.0,
            punish_threshold: 12.0,
            cooldown_ms: 30_000,
            epsilon: 0.05,
            grace_ms: 10_000,
        }
    }
}

impl LedgerParams {
    /// `exp(-Δt/τ)` for `secs` elapsed.
    #[must_use]
    pub fn decay_factor(&self, secs: f64) -> f64 {
        if secs <= 0.0 {
            1.0
        } else {
            (-secs / self.tau_secs).exp()
        }
    }

    /// Time for `level` to decay below ε and then sit out the grace period
    /// (ms). A replicated level has to stay in the store at least this long.
    #[must_use]
    pub fn decay_to_clean_ms(&self, level: f64) -> u64 {
        let decay_secs = if level > self.epsilon {
            self.tau_secs * (level / self.epsilon).ln()
        } else {
            0.0
        };
        ((decay_secs * 1_000.0).ceil() as u64).saturating_add(self.grace_ms)
    }

    /// State implied by a level alone, used after a remote merge.
    #[must_use]
    pub fn derive_state(&self, level: f64, suppressed_until: Option<Timestamp>, now: Timestamp) -> ViolationState {
        if suppressed_until.is_some_and(|until| until > now) {
            ViolationState::Suppressed
        } else if level >= self.flag_threshold {
            ViolationState::Flagged
        } else if level >= self.epsilon {
            ViolationState::Warming
        } else {
            ViolationState::Clean
        }
    }
}

/// Accumulated violation for one player and check.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationRecord {
    /// Player.
    pub player: PlayerId,
    /// Check.
    pub check: CheckId,
    /// Level as of `last_update` (never negative).
    pub level: f64,
    /// Time the level was last decayed/accumulated.
    pub last_update: Timestamp,
    /// End of the verdict cooldown, if one is running.
    pub suppressed_until: Option<Timestamp>,
    /// State machine position.
    pub state: ViolationState,
    /// Time of the last nonzero score.
    pub last_evidence_at: Timestamp,
    /// Evidence of the last nonzero score.
    pub evidence: Evidence,
    /// Verdicts issued for this record.
    pub verdicts: u32,
}

impl ViolationRecord {
    fn new(player: PlayerId, check: CheckId, now: Timestamp) -> Self {
        Self {
            player,
            check,
            level: 0.0,
            last_update: now,
            suppressed_until: None,
            state: ViolationState::Clean,
            last_evidence_at: now,
            evidence: Evidence::new(),
            verdicts: 0,
        }
    }

    /// Level projected to `now` without mutating.
    #[must_use]
    pub fn level_at(&self, now: Timestamp, params: &LedgerParams) -> f64 {
        self.level * params.decay_factor(now.secs_since(self.last_update))
    }

    /// True while a verdict cooldown runs.
    #[must_use]
    pub fn is_suppressed(&self, now: Timestamp) -> bool {
        self.suppressed_until.is_some_and(|until| until > now)
    }

    fn step(&mut self, to: ViolationState, out: &mut Vec<Transition>) {
        debug_assert!(self.state.allows(to), "{:?} -> {:?}", self.state, to);
        out.push(Transition { from: self.state, to });
        self.state = to;
    }

    fn expire_suppression(&mut self, now: Timestamp, out: &mut Vec<Transition>) {
        if self.suppressed_until.is_some_and(|until| now >= until) {
            self.suppressed_until = None;
            if self.state == ViolationState::Suppressed {
                self.step(ViolationState::Flagged, out);
            }
        }
    }

    fn decay_to(&mut self, now: Timestamp, params: &LedgerParams) {
        self.level = self.level_at(now, params).max(0.0);
        if now > self.last_update {
            self.last_update = now;
        }
    }

    fn is_quiet(&self, level: f64, now: Timestamp, params: &LedgerParams) -> bool {
        level < params.epsilon && now.saturating_since(self.last_evidence_at) >= params.grace_ms
    }
}

/// Result of one ledger update.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerUpdate {
    /// Player.
    pub player: PlayerId,
    /// Check.
    pub check: CheckId,
    /// Level after the update.
    pub level: f64,
    /// State after the update.
    pub state: ViolationState,
    /// Record timestamp after the update.
    pub last_update: Timestamp,
    /// Cooldown end after the update.
    pub suppressed_until: Option<Timestamp>,
    /// State changes in the order they happened.
    pub transitions: Vec<Transition>,
}

impl LedgerUpdate {
    fn of(record: &ViolationRecord, transitions: Vec<Transition>) -> Self {
        Self {
            player: record.player,
            check: record.check,
            level: record.level,
            state: record.state,
            last_update: record.last_update,
            suppressed_until: record.suppressed_until,
            transitions,
        }
    }

    /// True if the update moved into `state`.
    #[must_use]
    pub fn entered(&self, state: ViolationState) -> bool {
        self.transitions.iter().any(|t| t.to == state)
    }

    /// True if anything changed that other instances should see.
    #[must_use]
    pub fn is_significant(&self) -> bool {
        self.level > 0.0 || !self.transitions.is_empty()
    }
}

/// Level/timestamp pair received from another instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RemoteLevel {
    /// Level at `timestamp`.
    pub level: f64,
    /// Remote record timestamp.
    pub timestamp: Timestamp,
    /// Remote cooldown end.
    pub suppressed_until: Option<Timestamp>,
}

impl RemoteLevel {
    /// Last-writer-wins order: timestamp, then level, then suppression.
    #[must_use]
    pub fn is_newer_than(&self, timestamp: Timestamp, level: f64, suppressed_until: Option<Timestamp>) -> bool {
        if self.timestamp != timestamp {
            return self.timestamp > timestamp;
        }
        if self.level != level {
            return self.level > level;
        }
        self.suppressed_until > suppressed_until
    }
}

/// Outcome of [`ViolationLedger::sweep`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records still live.
    pub retained: usize,
    /// Records decayed away and dropped.
    pub removed: usize,
    /// Cooldowns that ended.
    pub unsuppressed: usize,
}

/// All violation records of one instance.
#[derive(Debug, Default)]
pub struct ViolationLedger {
    records: DashMap<PlayerId, Vec<ViolationRecord>>,
}

impl ViolationLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decays the record to `now`, accumulates the score and runs the state
    /// machine.
    ///
    /// A zero score for a pair with no record creates nothing.
    pub fn apply(&self, score: &Score, params: &LedgerParams, now: Timestamp) -> LedgerUpdate {
        let incoming = score.confidence * params.weight;
        let incoming = if incoming.is_finite() { incoming.max(0.0) } else { 0.0 };

        if incoming <= 0.0 && !self.contains(score.player, score.check) {
            let idle = ViolationRecord::new(score.player, score.check, now);
            return LedgerUpdate::of(&idle, Vec::new());
        }

        let mut records = self.records.entry(score.player).or_default();
        let idx = match records.iter().position(|r| r.check == score.check) {
            Some(idx) => idx,
            None => {
                records.push(ViolationRecord::new(score.player, score.check, now));
                records.len() - 1
            }
        };
        let record = &mut records[idx];
        let mut transitions = Vec::new();

        record.expire_suppression(now, &mut transitions);
        record.decay_to(now, params);

        if incoming > 0.0 {
            record.level += incoming;
            if now > record.last_evidence_at {
                record.last_evidence_at = now;
            }
            record.evidence = score.evidence.clone();
            if record.state == ViolationState::Clean {
                record.step(ViolationState::Warming, &mut transitions);
            }
        }

        if record.state == ViolationState::Warming && record.level >= params.flag_threshold {
            record.step(ViolationState::Flagged, &mut transitions);
        }
        if record.state == ViolationState::Flagged && record.level >= params.punish_threshold {
            record.step(ViolationState::Suppressed, &mut transitions);
            record.suppressed_until = Some(now.plus_millis(params.cooldown_ms));
            record.verdicts += 1;
        }

        if record.state != ViolationState::Clean && record.is_quiet(record.level, now, params) {
            record.step(ViolationState::Clean, &mut transitions);
            record.level = 0.0;
            record.suppressed_until = None;
        }

        for t in &transitions {
            tracing::debug!(
                player = %score.player,
                check = %score.check,
                from = t.from.name(),
                to = t.to.name(),
                level = record.level,
                "violation transition"
            );
        }
        LedgerUpdate::of(record, transitions)
    }

    /// Merges a level from another instance (last writer wins).
    ///
    /// Returns `None` if the local record is at least as new. The state is
    /// re-derived from the merged level; no verdict bookkeeping happens.
    pub fn apply_remote(
        &self,
        player: PlayerId,
        check: CheckId,
        remote: RemoteLevel,
        params: &LedgerParams,
        now: Timestamp,
    ) -> Option<LedgerUpdate> {
        if !remote.level.is_finite() || remote.level < 0.0 {
            tracing::warn!(%player, %check, level = remote.level, "ignoring malformed remote level");
            return None;
        }
        let suppressed_until = remote.suppressed_until.filter(|until| *until > remote.timestamp);

        let mut records = self.records.entry(player).or_default();
        let idx = records.iter().position(|r| r.check == check);
        let record = match idx {
            Some(idx) => {
                let local = &records[idx];
                if !remote.is_newer_than(local.last_update, local.level, local.suppressed_until) {
                    return None;
                }
                &mut records[idx]
            }
            None => {
                records.push(ViolationRecord::new(player, check, remote.timestamp));
                let last = records.len() - 1;
                &mut records[last]
            }
        };

        let from = record.state;
        record.level = remote.level;
        record.last_update = remote.timestamp;
        record.suppressed_until = suppressed_until;
        if remote.timestamp > record.last_evidence_at {
            record.last_evidence_at = remote.timestamp;
        }
        record.state = params.derive_state(remote.level, suppressed_until, now);

        let transitions = if from == record.state {
            Vec::new()
        } else {
            vec![Transition { from, to: record.state }]
        };
        tracing::debug!(%player, %check, level = record.level, state = record.state.name(), "merged remote level");
        Some(LedgerUpdate::of(record, transitions))
    }

    /// True if a record exists.
    #[must_use]
    pub fn contains(&self, player: PlayerId, check: CheckId) -> bool {
        self.records
            .get(&player)
            .is_some_and(|records| records.iter().any(|r| r.check == check))
    }

    /// Copy of one record.
    #[must_use]
    pub fn get(&self, player: PlayerId, check: CheckId) -> Option<ViolationRecord> {
        self.records
            .get(&player)
            .and_then(|records| records.iter().find(|r| r.check == check).cloned())
    }

    /// Decayed level at `now`, `0.0` without a record.
    #[must_use]
    pub fn level_at(&self, player: PlayerId, check: CheckId, params: &LedgerParams, now: Timestamp) -> f64 {
        self.get(player, check).map_or(0.0, |r| r.level_at(now, params))
    }

    /// Copies of every record of a player.
    #[must_use]
    pub fn records_for(&self, player: PlayerId) -> Vec<ViolationRecord> {
        self.records.get(&player).map(|r| r.clone()).unwrap_or_default()
    }

    /// Ends elapsed cooldowns and drops records that have decayed below ε
    /// and stayed quiet for the grace period.
    pub fn sweep(&self, now: Timestamp, params_for: impl Fn(CheckId) -> LedgerParams) -> SweepReport {
        let mut report = SweepReport::default();
        self.records.retain(|_, records| {
            records.retain_mut(|record| {
                let params = params_for(record.check);
                let mut transitions = Vec::new();
                record.expire_suppression(now, &mut transitions);
                report.unsuppressed += transitions.len();

                if record.is_quiet(record.level_at(now, &params), now, &params) {
                    report.removed += 1;
                    false
                } else {
                    report.retained += 1;
                    true
                }
            });
            !records.is_empty()
        });
        report
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.iter().map(|r| r.len()).sum()
    }

    /// True if no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_shared::Event;

    const P: PlayerId = PlayerId(7);

    fn score(confidence: f64, at: u64) -> Score {
        let event = Event::swing(P, Timestamp(at));
        Score::new(CheckId::SPEED, &event, confidence, Evidence::new().with("velocity", 21.0))
    }

    fn apply(ledger: &ViolationLedger, confidence: f64, at: u64, params: &LedgerParams) -> LedgerUpdate {
        ledger.apply(&score(confidence, at), params, Timestamp(at))
    }

    #[test]
    fn test_transition_table() {
        use ViolationState::*;
        assert!(Clean.allows(Warming));
        assert!(!Clean.allows(Flagged));
        assert!(!Warming.allows(Suppressed));
        assert!(Suppressed.allows(Flagged));
        assert!(Suppressed.allows(Clean));
        assert!(!Clean.allows(Clean));
    }

    #[test]
    fn test_zero_score_creates_nothing() {
        let ledger = ViolationLedger::new();
        let update = apply(&ledger, 0.0, 1_000, &LedgerParams::default());
        assert_eq!(update.state, ViolationState::Clean);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_walks_all_states_once() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams::default();
        let mut seen = Vec::new();
        for i in 0..40 {
            let update = apply(&ledger, 1.0, 1_000 + i * 50, &params);
            seen.extend(update.transitions);
        }
        let states: Vec<_> = seen.iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![ViolationState::Warming, ViolationState::Flagged, ViolationState::Suppressed]
        );
        let record = ledger.get(P, CheckId::SPEED);
        assert_eq!(record.map(|r| r.verdicts), Some(1));
    }

    #[test]
    fn test_single_large_score_traverses_several_states() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams { weight: 20.0, ..LedgerParams::default() };
        let update = apply(&ledger, 1.0, 1_000, &params);
        let states: Vec<_> = update.transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![ViolationState::Warming, ViolationState::Flagged, ViolationState::Suppressed]
        );
        assert_eq!(update.suppressed_until, Some(Timestamp(31_000)));
    }

    #[test]
    fn test_decay_law() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams { tau_secs: 10.0, ..LedgerParams::default() };
        apply(&ledger, 1.0, 0, &params);
        apply(&ledger, 1.0, 0, &params);

        let mut previous = 2.0;
        for secs in 1..30u64 {
            let level = ledger.level_at(P, CheckId::SPEED, &params, Timestamp(secs * 1_000));
            let expected = 2.0 * (-(secs as f64) / 10.0).exp();
            assert!((level - expected).abs() < 1e-9);
            assert!(level < previous && level >= 0.0);
            previous = level;
        }
    }

    #[test]
    fn test_cooldown_blocks_duplicate_then_rearms() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams { weight: 20.0, cooldown_ms: 5_000, tau_secs: 1_000.0, ..LedgerParams::default() };
        assert!(apply(&ledger, 1.0, 0, &params).entered(ViolationState::Suppressed));

        // Still accumulating inside the cooldown, no new suppression.
        let inside = apply(&ledger, 1.0, 1_000, &params);
        assert!(inside.transitions.is_empty());
        assert!(inside.level > 20.0);

        // Cooldown over: back to Flagged, and the level still exceeds T2.
        let after = apply(&ledger, 1.0, 6_000, &params);
        let states: Vec<_> = after.transitions.iter().map(|t| t.to).collect();
        assert_eq!(states, vec![ViolationState::Flagged, ViolationState::Suppressed]);
    }

    #[test]
    fn test_returns_to_clean_after_grace() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams { tau_secs: 1.0, grace_ms: 5_000, ..LedgerParams::default() };
        apply(&ledger, 1.0, 0, &params);

        // Level is tiny after 4 s but the grace period has not passed.
        assert_eq!(apply(&ledger, 0.0, 4_000, &params).state, ViolationState::Warming);
        let update = apply(&ledger, 0.0, 6_000, &params);
        assert_eq!(update.state, ViolationState::Clean);
        assert_eq!(update.level, 0.0);
    }

    #[test]
    fn test_zero_scores_do_not_extend_grace() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams { tau_secs: 0.5, grace_ms: 3_000, ..LedgerParams::default() };
        apply(&ledger, 1.0, 0, &params);
        for at in (100..3_000).step_by(100) {
            apply(&ledger, 0.0, at, &params);
        }
        assert_eq!(apply(&ledger, 0.0, 3_000, &params).state, ViolationState::Clean);
    }

    #[test]
    fn test_suppressed_until_never_before_last_update() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams { weight: 20.0, cooldown_ms: 1_000, ..LedgerParams::default() };
        for at in (0..10_000).step_by(250) {
            let update = apply(&ledger, 1.0, at, &params);
            if let Some(until) = update.suppressed_until {
                assert!(until >= update.last_update);
            }
        }
    }

    #[test]
    fn test_remote_last_writer_wins() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams::default();
        let now = Timestamp(200);
        let older = RemoteLevel { level: 0.4, timestamp: Timestamp(100), suppressed_until: None };
        let newer = RemoteLevel { level: 0.9, timestamp: Timestamp(150), suppressed_until: None };

        assert!(ledger.apply_remote(P, CheckId::REACH, newer, &params, now).is_some());
        assert!(ledger.apply_remote(P, CheckId::REACH, older, &params, now).is_none());
        // Idempotent.
        assert!(ledger.apply_remote(P, CheckId::REACH, newer, &params, now).is_none());

        let record = ledger.get(P, CheckId::REACH);
        assert_eq!(record.as_ref().map(|r| r.level), Some(0.9));
        assert_eq!(record.as_ref().map(|r| r.last_update), Some(Timestamp(150)));
        assert_eq!(record.map(|r| r.state), Some(ViolationState::Warming));
    }

    #[test]
    fn test_remote_tie_prefers_higher_level() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams::default();
        let low = RemoteLevel { level: 1.0, timestamp: Timestamp(100), suppressed_until: None };
        let high = RemoteLevel { level: 5.0, ..low };
        ledger.apply_remote(P, CheckId::REACH, low, &params, Timestamp(100));
        let update = ledger.apply_remote(P, CheckId::REACH, high, &params, Timestamp(100));
        assert_eq!(update.map(|u| u.state), Some(ViolationState::Flagged));
    }

    #[test]
    fn test_remote_suppression_carried() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams::default();
        let remote = RemoteLevel {
            level: 13.0,
            timestamp: Timestamp(1_000),
            suppressed_until: Some(Timestamp(31_000)),
        };
        ledger.apply_remote(P, CheckId::SPEED, remote, &params, Timestamp(2_000));
        // More evidence inside the cooldown must not issue a second verdict.
        let update = apply(&ledger, 1.0, 3_000, &params);
        assert_eq!(update.state, ViolationState::Suppressed);
        assert!(!update.entered(ViolationState::Suppressed));
    }

    #[test]
    fn test_sweep_drops_quiet_records() {
        let ledger = ViolationLedger::new();
        let params = LedgerParams { tau_secs: 1.0, grace_ms: 1_000, ..LedgerParams::default() };
        apply(&ledger, 1.0, 0, &params);
        ledger.apply(
            &Score::new(CheckId::REACH, &Event::swing(PlayerId(8), Timestamp(0)), 1.0, Evidence::new()),
            &LedgerParams { tau_secs: 1_000.0, ..params },
            Timestamp(0),
        );

        let report = ledger.sweep(Timestamp(60_000), |check| {
            if check == CheckId::REACH {
                LedgerParams { tau_secs: 1_000.0, ..params }
            } else {
                params
            }
        });
        assert_eq!(report.removed, 1);
        assert_eq!(report.retained, 1);
        assert!(ledger.records_for(P).is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_decay_to_clean_covers_decay_and_grace() {
        let params = LedgerParams::default();
        assert_eq!(params.decay_to_clean_ms(0.0), params.grace_ms);
        assert_eq!(params.decay_to_clean_ms(params.epsilon), params.grace_ms);

        let from_t2 = params.decay_to_clean_ms(params.punish_threshold);
        let decay_ms = from_t2 - params.grace_ms;
        // Decaying for that long brings T2 down to ε.
        let left = params.punish_threshold * params.decay_factor(decay_ms as f64 / 1_000.0);
        assert!(left <= params.epsilon + 1e-9);
        let earlier = params.punish_threshold * params.decay_factor((decay_ms - 100) as f64 / 1_000.0);
        assert!(earlier > params.epsilon);
        assert!(params.decay_to_clean_ms(30.0) > from_t2);
    }
}
