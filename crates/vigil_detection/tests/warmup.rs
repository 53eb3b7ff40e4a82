//! Every built-in check stays silent until it has `min_samples` samples.

use proptest::prelude::*;
use vigil_detection::{default_checks, Check, DetectionConfig};
use vigil_shared::{BlockAction, Event, EventKind, PlayerId, Timestamp, Vec3};

const PLAYER: PlayerId = PlayerId(5);

const KINDS: [EventKind; 6] = [
    EventKind::Movement,
    EventKind::Rotation,
    EventKind::Swing,
    EventKind::Attack,
    EventKind::BlockPlace,
    EventKind::BlockUse,
];

/// Kind selector, gap since the previous event (ms) and three raw values.
type Step = (usize, u64, f64, f64, f64);

fn step() -> impl Strategy<Value = Step> {
    (0usize..6, 0u64..400, -40.0f64..40.0, -40.0f64..40.0, 0.0f64..30.0)
}

fn build(kind: EventKind, t: Timestamp, (_, _, a, b, c): Step) -> Event {
    match kind {
        EventKind::Movement => {
            let velocity = Vec3::new(a, c * 0.1, b);
            Event::movement(PLAYER, t, velocity * 0.05, velocity)
        }
        EventKind::Rotation => Event::rotation(PLAYER, t, a * 4.0, b),
        EventKind::Swing => Event::swing(PLAYER, t),
        EventKind::Attack => Event::attack(PLAYER, t, c, a.abs() * 10.0),
        EventKind::BlockPlace => Event::block(PLAYER, t, BlockAction::Place, Vec3::new(a, b, c)),
        EventKind::BlockUse => Event::block(PLAYER, t, BlockAction::Use, Vec3::new(a, b, c)),
    }
}

/// Feeds one check its first `min_samples - 1` steps and returns the
/// confidences (NaN for an error). With `focused` every event is of a kind
/// the check subscribes to.
fn scores_before_warmup(check: &dyn Check, config: &DetectionConfig, steps: &[Step], focused: bool) -> Vec<f64> {
    let min_samples = config.common(check.id()).min_samples;
    let subscriptions = check.subscriptions();
    let mut state = check.new_state(config);
    let mut t = 1_000u64;
    steps
        .iter()
        .take(min_samples.saturating_sub(1))
        .map(|&step| {
            t += step.1;
            let kind = if focused {
                subscriptions[step.0 % subscriptions.len()]
            } else {
                KINDS[step.0]
            };
            let event = build(kind, Timestamp(t), step);
            check
                .on_event(config, &mut state, &event)
                .map_or(f64::NAN, |score| score.confidence)
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_no_check_scores_before_min_samples(
        steps in prop::collection::vec(step(), 0..48),
        focused in any::<bool>(),
    ) {
        let config = DetectionConfig::default();
        for check in default_checks() {
            let scores = scores_before_warmup(check.as_ref(), &config, &steps, focused);
            prop_assert!(
                scores.iter().all(|confidence| *confidence == 0.0),
                "{} scored {:?} before min_samples",
                check.id(),
                scores
            );
        }
    }

    #[test]
    fn test_small_windows_still_wait(
        steps in prop::collection::vec(step(), 0..8),
        min_samples in 2usize..6,
    ) {
        let mut config = DetectionConfig::default();
        let checks = &mut config.checks;
        for overrides in [
            &mut checks.speed.overrides,
            &mut checks.timer.overrides,
            &mut checks.reach.overrides,
            &mut checks.rotation.overrides,
            &mut checks.autoclicker.overrides,
            &mut checks.fast_place.overrides,
        ] {
            overrides.min_samples = Some(min_samples);
        }
        prop_assume!(config.validate().is_ok());
        for check in default_checks() {
            let scores = scores_before_warmup(check.as_ref(), &config, &steps, true);
            prop_assert!(scores.iter().all(|confidence| *confidence == 0.0), "{}", check.id());
        }
    }
}
