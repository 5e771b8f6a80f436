use runctl_core::{BackoffCurve, RestartDecision, RestartPolicy};
use std::time::Duration;

fn policy(max_restarts: u32, min_uptime_ms: u64) -> RestartPolicy {
    RestartPolicy::new(max_restarts, Duration::from_millis(min_uptime_ms)).with_curve(
        BackoffCurve::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_multiplier(2.0)
            .with_jitter(0.0),
    )
}

#[test]
fn test_delays_monotonically_non_decreasing() {
    let policy = policy(100, 60000);
    let mut previous = Duration::ZERO;
    for count in 0..100 {
        match policy.decide(count, Duration::from_millis(500)) {
            RestartDecision::RestartAfterDelay(delay) => {
                assert!(
                    delay >= previous,
                    "delay for count {count} ({delay:?}) below previous ({previous:?})"
                );
                previous = delay;
            }
            other => panic!("expected delay at count {count}, got {other:?}"),
        }
    }
}

#[test]
fn test_give_up_at_budget_regardless_of_uptime() {
    let policy = policy(10, 60000);
    for uptime_ms in [0, 500, 60000, 3_600_000] {
        assert_eq!(
            policy.decide(10, Duration::from_millis(uptime_ms)),
            RestartDecision::GiveUp
        );
        assert_eq!(
            policy.decide(25, Duration::from_millis(uptime_ms)),
            RestartDecision::GiveUp
        );
    }
}

#[test]
fn test_stable_run_restarts_immediately() {
    let policy = policy(10, 60000);
    // 70s of uptime beats the 60s threshold at any count below the budget.
    for count in 0..10 {
        assert_eq!(
            policy.decide(count, Duration::from_secs(70)),
            RestartDecision::RestartNow
        );
    }
}

#[test]
fn test_uptime_exactly_at_threshold_is_stable() {
    let policy = policy(10, 60000);
    assert_eq!(
        policy.decide(0, Duration::from_millis(60000)),
        RestartDecision::RestartNow
    );
    assert!(matches!(
        policy.decide(0, Duration::from_millis(59999)),
        RestartDecision::RestartAfterDelay(_)
    ));
}

// The crash-loop scenario from the original deployment config: a unit with
// max_restarts=10 and min_uptime=60s dying after 500ms gets exactly ten
// delayed restarts, then the supervisor gives up.
#[test]
fn test_crash_loop_exhausts_after_ten_restarts() {
    let policy = policy(10, 60000);
    let uptime = Duration::from_millis(500);

    let mut count = 0u32;
    let mut delayed = 0u32;
    loop {
        match policy.decide(count, uptime) {
            RestartDecision::RestartAfterDelay(_) => {
                delayed += 1;
                count += 1;
                assert!(delayed <= 10, "more restarts than the budget allows");
            }
            RestartDecision::GiveUp => break,
            RestartDecision::RestartNow => panic!("500ms run must not count as stable"),
        }
    }
    assert_eq!(delayed, 10);
}

#[test]
fn test_counter_reset_restores_backoff_seed() {
    let policy = policy(10, 60000);
    // After a stable run the supervisor resets the counter; the next fast
    // crash starts over at the base delay.
    let first = policy.decide(0, Duration::from_millis(500));
    let after_reset = policy.decide(0, Duration::from_millis(500));
    assert_eq!(first, after_reset);
    assert_eq!(first, RestartDecision::RestartAfterDelay(Duration::from_millis(100)));
}
