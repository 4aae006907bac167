//! Evaluation results
//!
//! The outcome of one scheduler run: a terminal (or, after cancellation,
//! pending) status per node, the resolved outputs, and read access to the
//! export surface.

use crate::error::ProvisionError;
use crate::output::Outputs;
use serde_json::Value;
use stackflow_core::{ExportBinding, Graph};
use std::collections::HashMap;
use std::fmt;

/// Per-node lifecycle: `pending → provisioning → {resolved | failed}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Pending,
    Provisioning,
    Resolved,
    Failed(ProvisionError),
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Resolved | NodeStatus::Failed(_))
    }

    pub fn error(&self) -> Option<&ProvisionError> {
        match self {
            NodeStatus::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Provisioning => write!(f, "provisioning"),
            NodeStatus::Resolved => write!(f, "resolved"),
            NodeStatus::Failed(_) => write!(f, "failed"),
        }
    }
}

/// Result for a single node
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub name: String,
    pub kind: String,
    pub status: NodeStatus,
    pub outputs: Option<Outputs>,
    /// Outputs came from a previous run; the provisioner was not called
    pub reused: bool,
}

impl NodeOutcome {
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }
}

/// A resolved (or unresolvable) export
#[derive(Debug, Clone)]
pub struct ExportValue {
    pub name: String,
    pub secret: bool,
    pub value: Result<Value, ProvisionError>,
}

/// Outcome of a scheduler run
#[derive(Debug, Clone)]
pub struct Evaluation {
    outcomes: Vec<NodeOutcome>,
    index: HashMap<String, usize>,
    exports: Vec<ExportBinding>,
    cancelled: bool,
}

impl Evaluation {
    pub(crate) fn new(graph: &Graph, outcomes: Vec<NodeOutcome>, cancelled: bool) -> Self {
        let index = outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| (o.name.clone(), i))
            .collect();
        Self {
            outcomes,
            index,
            exports: graph.exports().to_vec(),
            cancelled,
        }
    }

    /// Build an evaluation from previously recorded outputs without provisioning anything
    ///
    /// Nodes with recorded outputs are resolved; everything else is pending.
    pub fn from_recorded(graph: &Graph, recorded: &HashMap<String, Outputs>) -> Self {
        let outcomes = graph
            .nodes()
            .iter()
            .map(|node| {
                let outputs = recorded.get(&node.key()).cloned();
                NodeOutcome {
                    name: node.name.clone(),
                    kind: node.kind.clone(),
                    status: if outputs.is_some() {
                        NodeStatus::Resolved
                    } else {
                        NodeStatus::Pending
                    },
                    reused: outputs.is_some(),
                    outputs,
                }
            })
            .collect();
        Self::new(graph, outcomes, false)
    }

    /// Outcomes in declaration order
    pub fn outcomes(&self) -> &[NodeOutcome] {
        &self.outcomes
    }

    pub fn node(&self, name: &str) -> Option<&NodeOutcome> {
        self.index.get(name).map(|&i| &self.outcomes[i])
    }

    pub fn status(&self, name: &str) -> Option<&NodeStatus> {
        self.node(name).map(|o| &o.status)
    }

    pub fn outputs(&self, name: &str) -> Option<&Outputs> {
        self.node(name).and_then(|o| o.outputs.as_ref())
    }

    pub fn failures(&self) -> Vec<&NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, NodeStatus::Failed(_)))
            .collect()
    }

    pub fn pending(&self) -> Vec<&NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| !o.status.is_terminal())
            .collect()
    }

    /// Every node resolved
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == NodeStatus::Resolved)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Outputs of every resolved node, keyed by `kind:name`
    pub fn resolved_outputs(&self) -> HashMap<String, Outputs> {
        self.outcomes
            .iter()
            .filter_map(|o| o.outputs.as_ref().map(|outputs| (o.key(), outputs.clone())))
            .collect()
    }

    /// Read one export
    ///
    /// Pure read of resolved state; repeated calls return the same value.
    /// Returns `None` if no such export is declared.
    pub fn export(&self, name: &str) -> Option<Result<Value, ProvisionError>> {
        self.exports
            .iter()
            .find(|e| e.name == name)
            .map(|binding| self.read_export(binding))
    }

    /// Read every export in declaration order
    pub fn exports(&self) -> Vec<ExportValue> {
        self.exports
            .iter()
            .map(|binding| ExportValue {
                name: binding.name.clone(),
                secret: binding.secret,
                value: self.read_export(binding),
            })
            .collect()
    }

    fn read_export(&self, binding: &ExportBinding) -> Result<Value, ProvisionError> {
        let source = &self.outcomes[binding.source.index()];
        let outputs = match &source.status {
            NodeStatus::Resolved => source.outputs.as_ref(),
            NodeStatus::Failed(_) => return Err(ProvisionError::DependencyFailed(source.name.clone())),
            NodeStatus::Pending | NodeStatus::Provisioning => None,
        }
        .ok_or_else(|| ProvisionError::NotResolved(source.name.clone()))?;

        let value = outputs
            .get(&binding.output)
            .ok_or_else(|| ProvisionError::MissingOutput {
                node: source.name.clone(),
                output: binding.output.clone(),
            })?;
        binding
            .projection
            .apply(value)
            .map_err(|error| ProvisionError::Projection {
                input: binding.name.clone(),
                error,
            })
    }

    pub fn summary(&self) -> EvaluationSummary {
        let mut summary = EvaluationSummary::default();
        for outcome in &self.outcomes {
            match outcome.status {
                NodeStatus::Resolved if outcome.reused => summary.reused += 1,
                NodeStatus::Resolved => summary.resolved += 1,
                NodeStatus::Failed(_) => summary.failed += 1,
                NodeStatus::Pending | NodeStatus::Provisioning => summary.pending += 1,
            }
        }
        summary
    }
}

/// Counts per final status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationSummary {
    pub resolved: usize,
    pub reused: usize,
    pub failed: usize,
    pub pending: usize,
}

impl fmt::Display for EvaluationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} provisioned, {} unchanged, {} failed, {} pending",
            self.resolved, self.reused, self.failed, self.pending
        )
    }
}
