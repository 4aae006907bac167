//! Dry-run planning

use crate::output::Outputs;
use serde::{Deserialize, Serialize};
use stackflow_core::Graph;
use std::collections::{HashMap, HashSet};

/// Represents a planned action for one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub kind: String,
    pub action_type: ActionType,

    /// Longest dependency chain below this node; same-wave nodes are independent
    pub wave: usize,

    /// Direct dependencies by name
    pub depends_on: Vec<String>,
}

impl Action {
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Not recorded yet; the provisioner will be called
    Create,
    /// Already recorded; outputs are reused
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Plan containing an action per node, in declaration order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,

    /// Recorded resources that are no longer declared (kept in state)
    pub orphaned: Vec<String>,

    pub has_changes: bool,
}

impl Plan {
    /// Build a plan from the graph and recorded outputs; no side effects
    pub fn build(graph: &Graph, recorded: &HashMap<String, Outputs>) -> Self {
        let waves = graph.waves();
        let actions: Vec<Action> = graph
            .nodes()
            .iter()
            .map(|node| Action {
                name: node.name.clone(),
                kind: node.kind.clone(),
                action_type: if recorded.contains_key(&node.key()) {
                    ActionType::NoOp
                } else {
                    ActionType::Create
                },
                wave: waves[node.id.index()],
                depends_on: graph
                    .dependencies(node.id)
                    .iter()
                    .map(|dep| graph.node(*dep).name.clone())
                    .collect(),
            })
            .collect();

        let declared: HashSet<String> = actions.iter().map(Action::key).collect();
        let mut orphaned: Vec<String> = recorded
            .keys()
            .filter(|key| !declared.contains(*key))
            .cloned()
            .collect();
        orphaned.sort();

        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            orphaned,
            has_changes,
        }
    }

    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Actions grouped by wave
    pub fn waves(&self) -> Vec<Vec<&Action>> {
        let depth = self.actions.iter().map(|a| a.wave + 1).max().unwrap_or(0);
        let mut waves = vec![Vec::new(); depth];
        for action in &self.actions {
            waves[action.wave].push(action);
        }
        waves
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
            orphaned: self.orphaned.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub no_change: usize,
    pub orphaned: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to create, {} unchanged", self.create, self.no_change)?;
        if self.orphaned > 0 {
            write!(f, ", {} no longer declared", self.orphaned)?;
        }
        Ok(())
    }
}
