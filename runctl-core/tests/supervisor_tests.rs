#![cfg(unix)]

use runctl_core::config::{BackoffConfig, Config, ProcessSpec};
use runctl_core::{Event, EventKind, ProcName, StateKind, Supervisor, SupervisorHandle, Target};
use std::time::Duration;
use tokio::sync::broadcast;

fn spec(name: &str, command: &str, max_restarts: u32, min_uptime: Duration) -> ProcessSpec {
    let mut spec = ProcessSpec::new(name, command).unwrap();
    spec.max_restarts = max_restarts;
    spec.min_uptime = min_uptime;
    spec.kill_timeout = Duration::from_secs(2);
    spec.backoff = BackoffConfig {
        base_delay_ms: 10,
        max_delay_ms: 50,
        multiplier: 2.0,
        jitter: 0.0,
    };
    spec
}

fn boot(specs: Vec<ProcessSpec>) -> SupervisorHandle {
    let config = Config {
        apps: specs,
        ..Config::default()
    };
    let (supervisor, handle) = Supervisor::new(&config).unwrap();
    tokio::spawn(supervisor.run());
    handle
}

async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut predicate: F,
) -> Event
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn name(s: &str) -> ProcName {
    ProcName::new(s).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_and_stop_running_unit() {
    let handle = boot(vec![spec(
        "sleeper",
        "sleep 30",
        3,
        Duration::from_millis(1),
    )]);
    let mut events = handle.subscribe();

    handle.start(Target::One(name("sleeper"))).await.unwrap();
    wait_for_event(&mut events, Duration::from_secs(5), |e| {
        matches!(e.kind, EventKind::Spawned { .. })
    })
    .await;

    let status = &handle.status()[0];
    assert_eq!(status.state, StateKind::Running);
    assert!(status.pid.is_some());
    assert!(status.uptime_ms.is_some());

    handle
        .stop(Target::One(name("sleeper")), Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(handle.status()[0].state, StateKind::Stopped);
    assert_eq!(handle.status()[0].pid, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_is_idempotent() {
    let handle = boot(vec![spec("idle", "sleep 30", 3, Duration::from_millis(1))]);

    // Never started: stop succeeds as a no-op.
    handle.stop(Target::One(name("idle")), None).await.unwrap();
    handle.stop(Target::One(name("idle")), None).await.unwrap();
    assert_eq!(handle.status()[0].state, StateKind::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_unit_is_an_error() {
    let handle = boot(vec![spec("known", "sleep 30", 3, Duration::from_millis(1))]);
    assert!(handle.start(Target::One(name("missing"))).await.is_err());
    assert!(handle.stop(Target::One(name("missing")), None).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crash_loop_gives_up_at_budget() {
    let handle = boot(vec![spec(
        "crasher",
        "sh -c 'exit 7'",
        2,
        Duration::from_secs(60),
    )]);
    let mut events = handle.subscribe();

    handle.start(Target::One(name("crasher"))).await.unwrap();
    wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e.kind, EventKind::GivenUp)
    })
    .await;

    let status = &handle.status()[0];
    assert_eq!(status.state, StateKind::GivenUp);
    assert_eq!(status.restart_count, 2);
    assert_eq!(status.last_exit_code, Some(7));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_restart_attempts_are_announced() {
    let handle = boot(vec![spec(
        "flaky",
        "sh -c 'exit 1'",
        2,
        Duration::from_secs(60),
    )]);
    let mut events = handle.subscribe();

    handle.start(Target::One(name("flaky"))).await.unwrap();

    let first = wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e.kind, EventKind::RestartScheduled { attempt: 1, .. })
    })
    .await;
    match first.kind {
        EventKind::RestartScheduled { delay_ms, .. } => assert_eq!(delay_ms, 10),
        _ => unreachable!(),
    }

    let second = wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e.kind, EventKind::RestartScheduled { attempt: 2, .. })
    })
    .await;
    match second.kind {
        EventKind::RestartScheduled { delay_ms, .. } => assert_eq!(delay_ms, 20),
        _ => unreachable!(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_spawn_failure_follows_restart_policy() {
    let handle = boot(vec![spec(
        "ghost",
        "/nonexistent/binary/path",
        1,
        Duration::from_secs(60),
    )]);
    let mut events = handle.subscribe();

    // The initial spawn error surfaces to the caller.
    assert!(handle.start(Target::One(name("ghost"))).await.is_err());

    wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e.kind, EventKind::SpawnFailed { .. })
    })
    .await;
    wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e.kind, EventKind::GivenUp)
    })
    .await;
    assert_eq!(handle.status()[0].state, StateKind::GivenUp);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_after_spawn_failure_keeps_unit_down() {
    let mut ghost = spec(
        "ghost",
        "/nonexistent/binary/path",
        5,
        Duration::from_secs(60),
    );
    // A long backoff makes any wrongly-scheduled restart observable.
    ghost.backoff = BackoffConfig {
        base_delay_ms: 60_000,
        max_delay_ms: 60_000,
        multiplier: 2.0,
        jitter: 0.0,
    };
    let handle = boot(vec![ghost]);

    // The failure notice races the stop command; several rounds cover both
    // orderings.
    for round in 0..3 {
        let _ = handle.start(Target::One(name("ghost"))).await;
        handle.stop(Target::One(name("ghost")), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let state = handle.status()[0].state;
        assert!(
            matches!(state, StateKind::Stopped | StateKind::Crashed),
            "round {round}: unit revived after stop, state = {state:?}"
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stubborn_process_is_force_killed() {
    let mut stubborn = spec(
        "stubborn",
        r#"sh -c 'trap "" TERM; sleep 30'"#,
        3,
        Duration::from_millis(1),
    );
    stubborn.kill_timeout = Duration::from_millis(300);
    let handle = boot(vec![stubborn]);
    let mut events = handle.subscribe();

    handle.start(Target::One(name("stubborn"))).await.unwrap();
    wait_for_event(&mut events, Duration::from_secs(5), |e| {
        matches!(e.kind, EventKind::Spawned { .. })
    })
    .await;
    // Give the shell a moment to install its TERM trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    handle
        .stop(Target::One(name("stubborn")), Some(Duration::from_millis(300)))
        .await
        .unwrap();

    let status = &handle.status()[0];
    assert_eq!(status.state, StateKind::Stopped);
    // SIGKILL means no exit code.
    assert_eq!(status.last_exit_code, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_explicit_start_resets_budget() {
    let handle = boot(vec![spec(
        "crasher",
        "sh -c 'exit 1'",
        1,
        Duration::from_secs(60),
    )]);
    let mut events = handle.subscribe();

    handle.start(Target::One(name("crasher"))).await.unwrap();
    wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e.kind, EventKind::GivenUp)
    })
    .await;

    // A fresh operator start gets a fresh restart budget and fails again
    // rather than being refused.
    handle.start(Target::One(name("crasher"))).await.unwrap();
    wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e.kind, EventKind::GivenUp)
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_cancels_pending_restart() {
    let mut crasher = spec("crasher", "sh -c 'exit 1'", 5, Duration::from_secs(60));
    crasher.backoff.base_delay_ms = 5000;
    let handle = boot(vec![crasher]);
    let mut events = handle.subscribe();

    handle.start(Target::One(name("crasher"))).await.unwrap();
    wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e.kind, EventKind::RestartScheduled { .. })
    })
    .await;
    let status = &handle.status()[0];
    assert_eq!(status.state, StateKind::Backoff);
    // 5s scheduled: the snapshot reports the time left until the retry.
    let remaining = status.next_restart_ms.unwrap();
    assert!(remaining > 0 && remaining <= 5000);

    handle.stop(Target::One(name("crasher")), None).await.unwrap();
    assert_eq!(handle.status()[0].state, StateKind::Stopped);

    // The cancelled restart must not fire.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(handle.status()[0].state, StateKind::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_reports_given_up_units() {
    let handle = boot(vec![
        spec("sleeper", "sleep 30", 3, Duration::from_millis(1)),
        spec("crasher", "sh -c 'exit 1'", 1, Duration::from_secs(60)),
    ]);
    let mut events = handle.subscribe();

    handle.start(Target::All).await.unwrap();
    wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e.kind, EventKind::GivenUp)
    })
    .await;

    let report = handle.shutdown().await.unwrap();
    assert!(!report.clean());
    assert_eq!(report.gave_up, vec![name("crasher")]);

    for status in handle.status() {
        assert!(matches!(
            status.state,
            StateKind::Stopped | StateKind::GivenUp
        ));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_with_nothing_running_is_clean() {
    let handle = boot(vec![spec("idle", "sleep 30", 3, Duration::from_millis(1))]);
    let report = handle.shutdown().await.unwrap();
    assert!(report.clean());
}
