// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed node variant set.

use crate::agent::AgentNode;
use crate::context::ExecutionContext;
use crate::function::FunctionNode;
use crate::graph::Graph;
use crate::terminal::TerminalNode;
use nerve_core::{EngineError, NodeId, NodeState};
use serde_json::Value;
use tokio::sync::mpsc;

/// Addressable unit of work.
///
/// Terminal and agent nodes are persistent (they own a subprocess); function
/// and graph nodes are ephemeral. Graph implementing the node capability set
/// is what lets graphs nest arbitrarily.
#[derive(Debug, Clone)]
pub enum Node {
    Terminal(std::sync::Arc<TerminalNode>),
    Function(std::sync::Arc<FunctionNode>),
    Agent(std::sync::Arc<AgentNode>),
    Graph(std::sync::Arc<Graph>),
}

impl Node {
    pub fn id(&self) -> &NodeId {
        match self {
            Node::Terminal(n) => n.id(),
            Node::Function(n) => n.id(),
            Node::Agent(n) => n.id(),
            Node::Graph(g) => g.node_id(),
        }
    }

    /// Variant tag: "terminal", "function", "agent", "graph".
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Terminal(_) => "terminal",
            Node::Function(_) => "function",
            Node::Agent(_) => "agent",
            Node::Graph(_) => "graph",
        }
    }

    /// Persistent nodes own subprocess resources; ephemeral ones do not.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Node::Terminal(_) | Node::Agent(_))
    }

    /// Ephemeral variants report READY; persistent ones their real state.
    pub fn state(&self) -> NodeState {
        match self {
            Node::Terminal(n) => n.state(),
            Node::Agent(n) => n.state(),
            Node::Function(_) | Node::Graph(_) => NodeState::Ready,
        }
    }

    /// Execute with the given context and return the result value.
    ///
    /// Terminal/agent nodes return their serialized [`ParsedResponse`];
    /// graphs return a `step_id -> result` object, which is how nested
    /// graphs produce nested mappings.
    ///
    /// [`ParsedResponse`]: nerve_core::ParsedResponse
    pub async fn execute(&self, ctx: &ExecutionContext) -> Result<Value, EngineError> {
        match self {
            Node::Terminal(n) => {
                let response = n.send(ctx).await?;
                serde_json::to_value(response).map_err(|e| EngineError::Internal(e.to_string()))
            }
            Node::Agent(n) => {
                let response = n.send(ctx).await?;
                serde_json::to_value(response).map_err(|e| EngineError::Internal(e.to_string()))
            }
            Node::Function(n) => n.call(ctx).await,
            Node::Graph(g) => {
                let results = Box::pin(g.execute(ctx)).await?;
                let mut object = serde_json::Map::new();
                for (step_id, value) in results {
                    object.insert(step_id, value);
                }
                Ok(Value::Object(object))
            }
        }
    }

    /// Whether this node can stream chunks during execution.
    pub fn supports_stream(&self) -> bool {
        matches!(self, Node::Terminal(_) | Node::Agent(_))
    }

    /// Execute, forwarding raw output chunks for terminal-backed variants.
    /// Non-streaming variants just execute.
    pub async fn execute_stream(
        &self,
        ctx: &ExecutionContext,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<Value, EngineError> {
        match self {
            Node::Terminal(n) => {
                let response = n.send_stream(ctx, chunk_tx).await?;
                serde_json::to_value(response).map_err(|e| EngineError::Internal(e.to_string()))
            }
            Node::Agent(n) => {
                let response = n.send_stream(ctx, chunk_tx).await?;
                serde_json::to_value(response).map_err(|e| EngineError::Internal(e.to_string()))
            }
            other => other.execute(ctx).await,
        }
    }

    /// Stop a persistent node; no-op for ephemeral variants. Idempotent.
    pub async fn stop(&self) -> Result<(), EngineError> {
        match self {
            Node::Terminal(n) => n.close("stopped").await,
            Node::Agent(n) => n.close("stopped").await,
            Node::Function(_) | Node::Graph(_) => Ok(()),
        }
    }

    // -- terminal-only operations, used by the command engine --

    pub async fn run_command(&self, command: &str) -> Result<(), EngineError> {
        match self {
            Node::Terminal(n) => n.run(command).await,
            Node::Agent(n) => n.run(command).await,
            _ => Err(self.not_terminal()),
        }
    }

    pub async fn write_data(&self, data: &[u8]) -> Result<(), EngineError> {
        match self {
            Node::Terminal(n) => n.write(data).await,
            Node::Agent(n) => n.write(data).await,
            _ => Err(self.not_terminal()),
        }
    }

    pub async fn interrupt(&self) -> Result<(), EngineError> {
        match self {
            Node::Terminal(n) => n.interrupt().await,
            Node::Agent(n) => n.interrupt().await,
            _ => Err(self.not_terminal()),
        }
    }

    pub async fn read_tail(&self, lines: usize) -> Result<String, EngineError> {
        match self {
            Node::Terminal(n) => n.read_tail(lines).await,
            Node::Agent(n) => n.read_tail(lines).await,
            _ => Err(self.not_terminal()),
        }
    }

    pub fn history_path(&self) -> Option<&std::path::PathBuf> {
        match self {
            Node::Terminal(n) => n.history_path(),
            Node::Agent(n) => n.history_path(),
            _ => None,
        }
    }

    fn not_terminal(&self) -> EngineError {
        EngineError::Validation(format!("node {} is not a terminal node", self.id()))
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
