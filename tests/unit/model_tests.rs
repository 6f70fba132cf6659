//! Unit tests for domain models.

use std::path::Path;

use agent_supervisor::models::endpoint::AgentEndpoint;
use agent_supervisor::models::lifecycle::LifecycleState;
use agent_supervisor::models::lock::{lock_path_for, LockRecord};
use agent_supervisor::models::process::ExitState;

#[test]
fn endpoint_derives_base_url() {
    let endpoint = AgentEndpoint::new("127.0.0.1", 4111);
    assert_eq!(endpoint.base_url, "http://127.0.0.1:4111");
}

#[test]
fn endpoint_serializes_camel_case() {
    let json = serde_json::to_value(AgentEndpoint::new("127.0.0.1", 80)).expect("serialize");
    assert_eq!(json["baseUrl"], "http://127.0.0.1:80");
    assert_eq!(json["port"], 80);
}

#[test]
fn lock_path_appends_suffix() {
    assert_eq!(
        lock_path_for(Path::new("/tmp/x")),
        Path::new("/tmp/x.lock").to_path_buf()
    );
}

#[test]
fn lock_record_parses_decimal_pid_only() {
    let path = Path::new("/tmp/x.lock");
    assert_eq!(
        LockRecord::parse(path, "1234").map(|r| r.owner_pid),
        Some(1234)
    );
    assert_eq!(
        LockRecord::parse(path, "1234\n").map(|r| r.owner_pid),
        Some(1234)
    );
    assert!(LockRecord::parse(path, "").is_none());
    assert!(LockRecord::parse(path, "-5").is_none());
    assert!(LockRecord::parse(path, "12ab").is_none());
}

#[test]
fn exit_state_terminality() {
    assert!(!ExitState::Running.is_terminal());
    assert!(ExitState::Exited {
        code: Some(0),
        signal: None
    }
    .is_terminal());
    assert!(ExitState::Aborted {
        reason: "stop".into()
    }
    .is_terminal());
}

#[test]
fn exit_state_display() {
    let exited = ExitState::Exited {
        code: Some(3),
        signal: None,
    };
    assert_eq!(exited.to_string(), "exited with code 3");

    let signalled = ExitState::Exited {
        code: None,
        signal: Some(9),
    };
    assert_eq!(signalled.to_string(), "terminated by signal 9");
}

#[test]
fn lifecycle_happy_path_is_permitted() {
    let path = [
        LifecycleState::Idle,
        LifecycleState::Launching,
        LifecycleState::AwaitingHealth,
        LifecycleState::Ready,
        LifecycleState::Running,
        LifecycleState::Exited,
    ];
    for pair in path.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
    }
}

#[test]
fn any_live_state_can_abort() {
    for state in [
        LifecycleState::Idle,
        LifecycleState::Launching,
        LifecycleState::AwaitingHealth,
        LifecycleState::Ready,
        LifecycleState::Running,
    ] {
        assert!(state.can_transition_to(LifecycleState::Aborted));
    }
}

#[test]
fn terminal_states_are_final() {
    for state in [
        LifecycleState::Exited,
        LifecycleState::Aborted,
        LifecycleState::TimedOut,
        LifecycleState::FailedStartup,
    ] {
        assert!(state.is_terminal());
        assert!(!state.can_transition_to(LifecycleState::Aborted));
        assert!(!state.can_transition_to(LifecycleState::Running));
    }
}

#[test]
fn startup_failures_only_before_ready() {
    assert!(LifecycleState::AwaitingHealth.can_transition_to(LifecycleState::TimedOut));
    assert!(!LifecycleState::Running.can_transition_to(LifecycleState::TimedOut));
    assert!(!LifecycleState::Ready.can_transition_to(LifecycleState::FailedStartup));
}
