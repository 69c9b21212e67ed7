// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    start = { NodeState::Created, NodeState::Starting },
    ready = { NodeState::Starting, NodeState::Ready },
    start_fail = { NodeState::Starting, NodeState::Stopped },
    busy = { NodeState::Ready, NodeState::Busy },
    back_to_ready = { NodeState::Busy, NodeState::Ready },
    stop_from_ready = { NodeState::Ready, NodeState::Stopping },
    stop_from_busy = { NodeState::Busy, NodeState::Stopping },
    stopped = { NodeState::Stopping, NodeState::Stopped },
)]
fn legal_transitions(from: NodeState, to: NodeState) {
    assert!(from.can_transition_to(to));
}

#[parameterized(
    revive = { NodeState::Stopped, NodeState::Ready },
    restart = { NodeState::Stopped, NodeState::Starting },
    skip_start = { NodeState::Created, NodeState::Ready },
    back_to_created = { NodeState::Ready, NodeState::Created },
    busy_to_stopped = { NodeState::Busy, NodeState::Stopped },
)]
fn illegal_transitions(from: NodeState, to: NodeState) {
    assert!(!from.can_transition_to(to));
}

#[test]
fn ready_never_revisits_startup_states() {
    // Property: once READY, the reachable set excludes CREATED and STARTING.
    let mut frontier = vec![NodeState::Ready];
    let mut seen = vec![NodeState::Ready];
    let all = [
        NodeState::Created,
        NodeState::Starting,
        NodeState::Ready,
        NodeState::Busy,
        NodeState::Stopping,
        NodeState::Stopped,
    ];
    while let Some(s) = frontier.pop() {
        for next in all {
            if s.can_transition_to(next) && !seen.contains(&next) {
                seen.push(next);
                frontier.push(next);
            }
        }
    }
    assert!(!seen.contains(&NodeState::Created));
    assert!(!seen.contains(&NodeState::Starting));
}

#[test]
fn run_state_terminality() {
    assert!(RunState::Completed.is_terminal());
    assert!(RunState::Failed.is_terminal());
    assert!(RunState::Cancelled.is_terminal());
    assert!(!RunState::Pending.is_terminal());
    assert!(!RunState::Running.is_terminal());
    assert!(!RunState::Waiting.is_terminal());
}

#[test]
fn node_state_serde_snake_case() {
    assert_eq!(serde_json::to_string(&NodeState::Ready).unwrap(), "\"ready\"");
    let s: NodeState = serde_json::from_str("\"stopped\"").unwrap();
    assert_eq!(s, NodeState::Stopped);
}
