use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Follower,
    Candidate,
    Leader,
    Failed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Follower => "follower",
            NodeStatus::Candidate => "candidate",
            NodeStatus::Leader => "leader",
            NodeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown node state `{0}`")]
pub struct ParseNodeStatusError(pub String);

impl FromStr for NodeStatus {
    type Err = ParseNodeStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "follower" => Ok(NodeStatus::Follower),
            "candidate" => Ok(NodeStatus::Candidate),
            "leader" => Ok(NodeStatus::Leader),
            "failed" => Ok(NodeStatus::Failed),
            _ => Err(ParseNodeStatusError(s.to_string())),
        }
    }
}

/// Reasons the node refuses work.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("Node is unavailable. Please recover the node.")]
    NodeFailed,
    #[error("No active leader. Cannot process transactions.")]
    NoLeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionOutcome {
    Elected(String),
    LeaderPresent(String),
}

/// Role label of this process. Changes only through explicit calls; nothing
/// here talks to other nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    status: NodeStatus,
    current_leader: Option<String>,
    node_label: String,
}

impl NodeState {
    pub fn new(node_label: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Follower,
            current_leader: None,
            node_label: node_label.into(),
        }
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn current_leader(&self) -> Option<&str> {
        self.current_leader.as_deref()
    }

    pub fn node_label(&self) -> &str {
        &self.node_label
    }

    pub fn is_failed(&self) -> bool {
        self.status == NodeStatus::Failed
    }

    /// Unconditional overwrite. Failing also forgets the current leader.
    pub fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
        if status == NodeStatus::Failed {
            self.current_leader = None;
        }
    }

    pub fn elect(&mut self) -> Result<ElectionOutcome, GateError> {
        if self.is_failed() {
            return Err(GateError::NodeFailed);
        }
        if let Some(leader) = &self.current_leader {
            return Ok(ElectionOutcome::LeaderPresent(leader.clone()));
        }
        self.status = NodeStatus::Leader;
        self.current_leader = Some(self.node_label.clone());
        Ok(ElectionOutcome::Elected(self.node_label.clone()))
    }
}
