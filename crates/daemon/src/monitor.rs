// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background node state monitoring.

use crate::events::EventSink;
use nerve_core::{Event, NodeId, NodeState, SessionId};
use nerve_engine::Node;
use std::sync::Arc;
use std::time::Duration;

/// State poll cadence.
const MONITOR_POLL: Duration = Duration::from_millis(200);

/// Emit NODE_READY / NODE_BUSY / NODE_STOPPED on state changes until the
/// node stops.
pub(crate) fn spawn_state_monitor(
    session_id: SessionId,
    node: Node,
    sink: Arc<dyn EventSink>,
) {
    tokio::spawn(async move {
        let node_id = NodeId::new(node.id().as_str());
        let mut last = node.state();
        loop {
            tokio::time::sleep(MONITOR_POLL).await;
            let state = node.state();
            if state != last {
                let event = match state {
                    NodeState::Ready => Some(Event::NodeReady {
                        session_id: session_id.clone(),
                        node_id: node_id.clone(),
                    }),
                    NodeState::Busy => Some(Event::NodeBusy {
                        session_id: session_id.clone(),
                        node_id: node_id.clone(),
                    }),
                    NodeState::Stopped => Some(Event::NodeStopped {
                        session_id: session_id.clone(),
                        node_id: node_id.clone(),
                    }),
                    _ => None,
                };
                if let Some(event) = event {
                    sink.emit(event);
                }
                last = state;
            }
            if state == NodeState::Stopped {
                break;
            }
        }
        tracing::debug!(node_id = %node_id, "state monitor ended");
    });
}
