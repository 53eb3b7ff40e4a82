//! Fault containment: misbehaving checks and sinks never reach the host.

use std::sync::Arc;
use vigil::{
    ChannelSink, Check, CheckState, DetectionConfig, DetectionEngine, EngineConfig, EngineError, ProcessReport, Score,
    VerdictKind,
};
use vigil_detection::CheckError;
use vigil_shared::{CheckId, Event, EventKind, Evidence, PlayerId, Timestamp, Verdict, VerdictSink, Vec3};

const PLAYER: PlayerId = PlayerId(9);

/// Scores of the built-in checks only, in routing order.
fn builtin_scores(report: &ProcessReport) -> Vec<Score> {
    report
        .scores
        .iter()
        .filter(|score| CheckId::BUILTIN.contains(&score.check))
        .cloned()
        .collect()
}

/// Mixed traffic that exercises every built-in check.
fn traffic() -> Vec<Event> {
    (0..60u64)
        .map(|i| {
            let t = Timestamp(1_000 + i * 50);
            match i % 4 {
                0 => Event::movement(PLAYER, t, Vec3::new(0.6, 0.0, 0.0), Vec3::new(12.0, 0.0, 0.0)),
                1 => Event::attack(PLAYER, t, 3.0 + (i % 7) as f64 * 0.4, 40.0),
                2 => Event::swing(PLAYER, t),
                _ => Event::rotation(PLAYER, t, 2.5, 0.5),
            }
        })
        .collect()
}

/// Panics on its third event since the last reset.
struct Panicky;

impl Check for Panicky {
    fn id(&self) -> CheckId {
        CheckId("panicky")
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[EventKind::Swing]
    }

    fn new_state(&self, _config: &DetectionConfig) -> CheckState {
        CheckState::custom(0u32)
    }

    fn on_event(&self, _config: &DetectionConfig, state: &mut CheckState, event: &Event) -> Result<Score, CheckError> {
        let seen = state
            .custom_mut::<u32>()
            .ok_or(CheckError::StateMismatch { check: self.id() })?;
        *seen += 1;
        assert_ne!(*seen, 3, "third swing");
        Ok(Score::zero(self.id(), event))
    }
}

/// Counts its events and fails the third one.
struct Counting;

impl Check for Counting {
    fn id(&self) -> CheckId {
        CheckId("counting")
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[EventKind::Swing]
    }

    fn new_state(&self, _config: &DetectionConfig) -> CheckState {
        CheckState::custom(0u32)
    }

    fn on_event(&self, _config: &DetectionConfig, state: &mut CheckState, event: &Event) -> Result<Score, CheckError> {
        let seen = state
            .custom_mut::<u32>()
            .ok_or(CheckError::StateMismatch { check: self.id() })?;
        *seen += 1;
        if *seen == 3 {
            return Err(CheckError::Failed {
                check: self.id(),
                reason: "transient".into(),
            });
        }
        Ok(Score::new(self.id(), event, 0.0, Evidence::new().with("seen", f64::from(*seen))))
    }
}

struct Erring;

impl Check for Erring {
    fn id(&self) -> CheckId {
        CheckId("erring")
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[EventKind::Attack]
    }

    fn new_state(&self, _config: &DetectionConfig) -> CheckState {
        CheckState::Stateless
    }

    fn on_event(&self, _config: &DetectionConfig, _state: &mut CheckState, _event: &Event) -> Result<Score, CheckError> {
        Err(CheckError::Failed {
            check: self.id(),
            reason: "model not loaded".into(),
        })
    }
}

/// Scores under another check's name.
struct Impostor;

impl Check for Impostor {
    fn id(&self) -> CheckId {
        CheckId("impostor")
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[EventKind::Attack]
    }

    fn new_state(&self, _config: &DetectionConfig) -> CheckState {
        CheckState::Stateless
    }

    fn on_event(&self, _config: &DetectionConfig, _state: &mut CheckState, event: &Event) -> Result<Score, CheckError> {
        Ok(Score::new(CheckId::SPEED, event, 1.0, Evidence::new()))
    }
}

struct Mute;

impl Check for Mute {
    fn id(&self) -> CheckId {
        CheckId("mute")
    }

    fn subscriptions(&self) -> &[EventKind] {
        &[]
    }

    fn new_state(&self, _config: &DetectionConfig) -> CheckState {
        CheckState::Stateless
    }

    fn on_event(&self, _config: &DetectionConfig, _state: &mut CheckState, event: &Event) -> Result<Score, CheckError> {
        Ok(Score::zero(self.id(), event))
    }
}

struct ExplodingSink;

impl VerdictSink for ExplodingSink {
    fn verdict(&self, _verdict: &Verdict) {
        panic!("punishment backend down");
    }

    fn flagged(&self, _report: &Verdict) {
        panic!("alert relay down");
    }
}

#[test]
fn test_panicking_check_is_skipped_and_reset() {
    let faulty = DetectionEngine::builder(EngineConfig::default())
        .with_check(Box::new(Panicky))
        .build()
        .unwrap();
    let clean = DetectionEngine::new(EngineConfig::default()).unwrap();

    let mut failed_at = Vec::new();
    for (i, event) in traffic().iter().filter(|e| e.kind() == EventKind::Swing).enumerate().take(6) {
        let report = faulty.process(event);
        assert_eq!(builtin_scores(&report), builtin_scores(&clean.process(event)), "swing {i}");
        if report.failed.contains(&CheckId("panicky")) {
            failed_at.push(i);
        }
    }
    // The reset state counts from zero again, so the next panic is three
    // swings later.
    assert_eq!(failed_at, vec![2, 5]);
    assert_eq!(faulty.stats().check_failures, 2);
}

#[test]
fn test_erroring_check_keeps_its_history() {
    let engine = DetectionEngine::builder(EngineConfig::default())
        .with_checks(vec![Box::new(Counting)])
        .build()
        .unwrap();

    let seen: Vec<Option<f64>> = (0..5u64)
        .map(|i| {
            engine
                .process(&Event::swing(PLAYER, Timestamp(1_000 + i * 100)))
                .score(CheckId("counting"))
                .and_then(|score| score.evidence.get("seen"))
        })
        .collect();
    assert_eq!(seen, vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)]);
    assert_eq!(engine.stats().check_failures, 1);
}

#[test]
fn test_erroring_check_does_not_change_other_scores() {
    let faulty = DetectionEngine::builder(EngineConfig::default())
        .with_check(Box::new(Erring))
        .build()
        .unwrap();
    let clean = DetectionEngine::new(EngineConfig::default()).unwrap();

    let mut attacks = 0;
    for event in traffic() {
        let report = faulty.process(&event);
        let expected = clean.process(&event);
        if event.kind() == EventKind::Attack {
            attacks += 1;
            assert_eq!(report.failed, vec![CheckId("erring")]);
        } else {
            assert!(report.failed.is_empty());
        }
        assert_eq!(report.scores, expected.scores);
        assert_eq!(report.transitions, expected.transitions);
    }
    for check in CheckId::BUILTIN {
        assert_eq!(faulty.violation(PLAYER, check), clean.violation(PLAYER, check), "{check}");
    }
    let stats = faulty.stats();
    assert_eq!(stats.check_failures, attacks);
    assert_eq!(stats.scores, clean.stats().scores);
}

#[test]
fn test_score_for_foreign_key_is_rejected() {
    let engine = DetectionEngine::builder(EngineConfig::default())
        .with_checks(vec![Box::new(Impostor)])
        .build()
        .unwrap();

    let report = engine.process(&Event::attack(PLAYER, Timestamp(500), 3.0, 0.0));
    assert_eq!(report.failed, vec![CheckId("impostor")]);
    assert!(report.scores.is_empty());
    assert!(engine.violation(PLAYER, CheckId::SPEED).is_none());
}

#[test]
fn test_check_without_subscriptions_is_refused() {
    let result = DetectionEngine::builder(EngineConfig::default())
        .with_check(Box::new(Mute))
        .build();
    assert!(matches!(result, Err(EngineError::NoSubscriptions(id)) if id == CheckId("mute")));
}

#[test]
fn test_panicking_sink_loses_only_its_delivery() {
    let (channel, verdicts) = ChannelSink::new(16);
    let engine = DetectionEngine::builder(EngineConfig::default())
        .with_sink(Arc::new(ExplodingSink))
        .with_sink(Arc::new(channel))
        .build()
        .unwrap();
    let cap = engine.config().checks.speed.max_speed;

    for i in 0..30u64 {
        let velocity = Vec3::new(cap * 3.0, 0.0, 0.0);
        engine.process(&Event::movement(PLAYER, Timestamp(1_000 + i * 50), velocity * 0.05, velocity));
    }

    let kinds: Vec<VerdictKind> = verdicts.try_iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![VerdictKind::Flagged, VerdictKind::Punish]);
    let stats = engine.stats();
    assert_eq!(stats.sink_failures, 2);
    assert_eq!(stats.flagged, 1);
    assert_eq!(stats.verdicts, 1);
}
