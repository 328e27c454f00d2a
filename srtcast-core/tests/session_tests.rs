//! Integration tests for session supervision
//!
//! The engine is replaced by small `/bin/sh` scripts that print ffmpeg-like
//! diagnostics to stderr.

#![cfg(unix)]

mod mocks;

use mocks::{events_until_ended, script_plan, wait_for_event, CountingLauncher, FailingLauncher};
use srtcast_core::error::{ErrorKind, SrtcastError};
use srtcast_core::events::{EventBus, SessionEvent};
use srtcast_core::session::{SessionState, Supervisor, SupervisorOptions};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn options() -> SupervisorOptions {
    SupervisorOptions {
        stop_grace: Duration::from_secs(2),
        drain_timeout: Duration::from_millis(500),
    }
}

fn supervisor() -> (Supervisor, Arc<CountingLauncher>) {
    let launcher = Arc::new(CountingLauncher::new());
    let supervisor = Supervisor::with_launcher(EventBus::new(), options(), launcher.clone());
    (supervisor, launcher)
}

fn state_changes(events: &[SessionEvent]) -> Vec<(SessionState, SessionState)> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_concurrent_start_spawns_once() {
    let (supervisor, launcher) = supervisor();
    let plan = script_plan("exec sleep 30");

    let (a, b) = tokio::join!(supervisor.start(&plan), supervisor.start(&plan));

    let busy = [&a, &b]
        .iter()
        .filter(|r| matches!(r, Err(SrtcastError::SessionBusy)))
        .count();
    assert_eq!(busy, 1);
    assert!(a.is_ok() || b.is_ok());
    assert_eq!(launcher.spawned(), 1);

    assert_eq!(supervisor.stop().await.unwrap(), SessionState::Stopped);
}

#[tokio::test]
async fn test_start_while_active_leaves_session_untouched() {
    let (supervisor, launcher) = supervisor();
    let mut sub = supervisor.bus().subscribe();
    supervisor
        .start(&script_plan("echo 'Opening srt://127.0.0.1:9999' >&2; exec sleep 30"))
        .await
        .unwrap();
    wait_for_event(&mut sub, WAIT, |e| matches!(e, SessionEvent::Connected { .. }))
        .await
        .expect("Should connect");

    let err = supervisor.start(&script_plan("exit 0")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionBusy);
    assert_eq!(supervisor.state().await, SessionState::Streaming);
    assert_eq!(launcher.spawned(), 1);

    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_failure_marker_before_connect() {
    let (supervisor, _) = supervisor();
    let mut sub = supervisor.bus().subscribe();

    supervisor
        .start(&script_plan(
            "echo 'srt://127.0.0.1:9999: Connection failed' >&2; echo 'Opening srt://127.0.0.1:9999' >&2; exec sleep 30",
        ))
        .await
        .unwrap();

    let events = events_until_ended(&mut sub, WAIT).await;

    assert!(!events.iter().any(|e| matches!(e, SessionEvent::Connected { .. })));
    assert_eq!(
        state_changes(&events),
        vec![
            (SessionState::Idle, SessionState::Starting),
            (SessionState::Starting, SessionState::Errored),
        ]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Error { kind: ErrorKind::ProcessFailure, detail, .. } if detail.contains("Connection failed")
    )));
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Ended {
            state: SessionState::Errored,
            ..
        })
    ));
    assert_eq!(supervisor.state().await, SessionState::Errored);
}

#[tokio::test]
async fn test_connect_then_stop() {
    let (supervisor, _) = supervisor();
    let mut sub = supervisor.bus().subscribe();

    supervisor
        .start(&script_plan("echo 'Output #0, mpegts' >&2; echo 'Opening srt://127.0.0.1:9999 for writing' >&2; exec sleep 30"))
        .await
        .unwrap();
    wait_for_event(&mut sub, WAIT, |e| matches!(e, SessionEvent::Connected { .. }))
        .await
        .expect("Should connect");

    let status = supervisor.status().await;
    assert_eq!(status.state, SessionState::Streaming);
    assert!(status.pid.is_some());
    assert_eq!(
        status.destination.as_deref(),
        Some("srt://127.0.0.1:9999?mode=caller&latency=120")
    );

    assert_eq!(supervisor.stop().await.unwrap(), SessionState::Stopped);

    let events = events_until_ended(&mut sub, WAIT).await;
    assert_eq!(
        state_changes(&events),
        vec![
            (SessionState::Streaming, SessionState::Stopping),
            (SessionState::Stopping, SessionState::Stopped),
        ]
    );
}

#[tokio::test]
async fn test_full_lifecycle_transitions() {
    let (supervisor, _) = supervisor();
    let mut sub = supervisor.bus().subscribe();

    supervisor
        .start(&script_plan("echo 'ffmpeg version 6.1' >&2; echo 'Connection established' >&2; exec sleep 30"))
        .await
        .unwrap();

    let mut events = Vec::new();
    tokio::time::timeout(WAIT, async {
        while let Some(event) = sub.recv().await {
            let connected = matches!(event, SessionEvent::Connected { .. });
            events.push(event);
            if connected {
                break;
            }
        }
    })
    .await
    .expect("Should connect");

    supervisor.stop().await.unwrap();
    events.extend(events_until_ended(&mut sub, WAIT).await);

    assert!(matches!(
        events.first(),
        Some(SessionEvent::Started { pid: Some(_), .. })
    ));
    assert_eq!(
        state_changes(&events),
        vec![
            (SessionState::Idle, SessionState::Starting),
            (SessionState::Starting, SessionState::AwaitingConnection),
            (SessionState::AwaitingConnection, SessionState::Streaming),
            (SessionState::Streaming, SessionState::Stopping),
            (SessionState::Stopping, SessionState::Stopped),
        ]
    );
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Ended {
            state: SessionState::Stopped,
            ..
        })
    ));
}

#[tokio::test]
async fn test_nonzero_exit_while_streaming() {
    let (supervisor, _) = supervisor();
    let mut sub = supervisor.bus().subscribe();

    supervisor
        .start(&script_plan("echo 'Opening srt://127.0.0.1:9999' >&2; sleep 0.3; echo 'broken pipe' >&2; exit 3"))
        .await
        .unwrap();

    let events = events_until_ended(&mut sub, WAIT).await;

    assert!(events.iter().any(|e| matches!(e, SessionEvent::Connected { .. })));
    assert!(matches!(
        events.last(),
        Some(SessionEvent::Ended {
            exit_code: Some(3),
            state: SessionState::Errored,
            ..
        })
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Error { kind: ErrorKind::ProcessFailure, detail, .. }
            if detail.contains("exit code 3") && detail.contains("broken pipe")
    )));

    let status = supervisor.status().await;
    assert_eq!(status.state, SessionState::Errored);
    assert_eq!(status.exit_code, Some(3));
    assert!(status.last_error.is_some());
}

#[tokio::test]
async fn test_lines_forwarded_verbatim_and_split_on_cr() {
    let (supervisor, _) = supervisor();
    let mut sub = supervisor.bus().subscribe();

    supervisor
        .start(&script_plan("printf 'frame=  1 fps=0.0\\rframe=  2 fps=30\\n' >&2; exit 0"))
        .await
        .unwrap();

    let events = events_until_ended(&mut sub, WAIT).await;
    let lines: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Log { line, .. } => Some(line.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec!["frame=  1 fps=0.0", "frame=  2 fps=30"]);

    assert_eq!(
        state_changes(&events),
        vec![
            (SessionState::Idle, SessionState::Starting),
            (SessionState::Starting, SessionState::AwaitingConnection),
            (SessionState::AwaitingConnection, SessionState::Errored),
        ]
    );
}

#[tokio::test]
async fn test_stop_without_session() {
    let (supervisor, _) = supervisor();
    let err = supervisor.stop().await.unwrap_err();
    assert!(matches!(
        err,
        SrtcastError::InvalidTransition {
            state: SessionState::Idle,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (supervisor, _) = supervisor();
    supervisor.start(&script_plan("exec sleep 30")).await.unwrap();

    assert_eq!(supervisor.stop().await.unwrap(), SessionState::Stopped);
    assert_eq!(supervisor.stop().await.unwrap(), SessionState::Stopped);
}

#[tokio::test]
async fn test_concurrent_stops_agree() {
    let (supervisor, _) = supervisor();
    supervisor.start(&script_plan("exec sleep 30")).await.unwrap();

    let (a, b) = tokio::join!(supervisor.stop(), supervisor.stop());
    assert_eq!(a.unwrap(), SessionState::Stopped);
    assert_eq!(b.unwrap(), SessionState::Stopped);
}

#[tokio::test]
async fn test_restart_after_terminal() {
    let (supervisor, launcher) = supervisor();
    let first = supervisor.start(&script_plan("exec sleep 30")).await.unwrap();
    supervisor.stop().await.unwrap();

    let second = supervisor.start(&script_plan("exec sleep 30")).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(launcher.spawned(), 2);
    supervisor.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_escalates_to_kill() {
    let launcher = Arc::new(CountingLauncher::new());
    let supervisor = Supervisor::with_launcher(
        EventBus::new(),
        SupervisorOptions {
            stop_grace: Duration::from_millis(200),
            drain_timeout: Duration::from_millis(200),
        },
        launcher,
    );
    let mut sub = supervisor.bus().subscribe();

    supervisor
        .start(&script_plan("trap '' TERM; echo ready >&2; sleep 5"))
        .await
        .unwrap();
    wait_for_event(&mut sub, WAIT, |e| matches!(e, SessionEvent::Log { line, .. } if line == "ready"))
        .await
        .expect("Script should start");

    let state = tokio::time::timeout(Duration::from_secs(4), supervisor.stop())
        .await
        .expect("Stop should finish after the grace period")
        .unwrap();
    assert_eq!(state, SessionState::Stopped);
}

#[tokio::test]
async fn test_spawn_failure() {
    let supervisor = Supervisor::with_launcher(EventBus::new(), options(), Arc::new(FailingLauncher));
    let mut sub = supervisor.bus().subscribe();

    let err = supervisor.start(&script_plan("exit 0")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProcessFailure);
    assert_eq!(supervisor.state().await, SessionState::Errored);

    let events = events_until_ended(&mut sub, WAIT).await;
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Error { kind: ErrorKind::ProcessFailure, .. })));

    // Terminal sessions do not block a retry
    let err = supervisor.start(&script_plan("exit 0")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProcessFailure);
}

#[tokio::test]
async fn test_errored_session_holds_slot_until_engine_exits() {
    let (supervisor, launcher) = supervisor();
    let mut sub = supervisor.bus().subscribe();

    supervisor
        .start(&script_plan(
            "trap '' TERM; echo 'Error opening output' >&2; while true; do sleep 0.1; done",
        ))
        .await
        .unwrap();

    let started = wait_for_event(&mut sub, WAIT, |e| matches!(e, SessionEvent::Started { .. }))
        .await
        .expect("Engine should start");
    let SessionEvent::Started { pid: Some(pid), .. } = started else {
        panic!("Started event should carry a pid");
    };
    wait_for_event(&mut sub, WAIT, |e| {
        matches!(e, SessionEvent::StateChanged { to: SessionState::Errored, .. })
    })
    .await
    .expect("Failure marker should end the session");

    // The engine ignores SIGTERM, so it outlives the Errored transition
    let err = supervisor.start(&script_plan("exec sleep 30")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionBusy);
    assert_eq!(launcher.spawned(), 1);
    // SAFETY: signal 0 only checks that the pid exists
    assert_eq!(unsafe { libc::kill(pid as libc::pid_t, 0) }, 0);

    let state = tokio::time::timeout(Duration::from_secs(5), supervisor.stop())
        .await
        .expect("Stop should return once the engine is killed")
        .unwrap();
    assert_eq!(state, SessionState::Errored);
    // SAFETY: as above
    assert_ne!(unsafe { libc::kill(pid as libc::pid_t, 0) }, 0);

    supervisor.start(&script_plan("exec sleep 30")).await.unwrap();
    assert_eq!(launcher.spawned(), 2);
    supervisor.stop().await.unwrap();
}
