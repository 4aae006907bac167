//! Output resolver / scheduler
//!
//! Walks the resource graph and provisions every node once all of its
//! dependencies have resolved. Independent branches run concurrently.
//!
//! A single coordinator owns all bookkeeping (statuses, pending dependency
//! counts, the ready set). Provisioner calls run as tasks on a [`JoinSet`] and
//! report back to the coordinator, so decrement-and-check on the dependency
//! counts never races.

use crate::error::ProvisionError;
use crate::evaluation::{Evaluation, NodeOutcome, NodeStatus};
use crate::output::{Deferred, OutputSlot, Outputs};
use crate::provisioner::{DestroyRequest, ProvisionRequest, Provisioner};
use serde_json::Value;
use stackflow_core::{DataBinding, Graph, NodeId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scheduler settings
#[derive(Debug, Clone, Default)]
pub struct SchedulerOptions {
    /// Maximum concurrent provisioner calls (0 = unbounded)
    pub parallelism: usize,
}

/// Progress notifications emitted while evaluating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Started { node: String, kind: String },
    Resolved { node: String, reused: bool },
    Failed { node: String, error: ProvisionError },
    /// Not attempted because a dependency failed
    Skipped { node: String, failed_dependency: String },
    /// Handed back to pending after cancellation
    Interrupted { node: String },
}

pub struct Scheduler {
    provisioner: Arc<dyn Provisioner>,
    options: SchedulerOptions,
    recorded: HashMap<String, Outputs>,
    events: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl Scheduler {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            options: SchedulerOptions::default(),
            recorded: HashMap::new(),
            events: None,
        }
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    /// Outputs from a previous run, keyed by `kind:name`
    ///
    /// Nodes found here are marked resolved without calling the provisioner.
    pub fn with_recorded_outputs(mut self, recorded: HashMap<String, Outputs>) -> Self {
        self.recorded = recorded;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Provision the graph
    ///
    /// Returns when every node is resolved or failed, or, after `cancel` fires,
    /// once in-flight calls have returned. Nodes never started stay pending.
    #[tracing::instrument(skip_all, fields(nodes = graph.len()))]
    pub async fn evaluate(&self, graph: &Graph, cancel: CancellationToken) -> Evaluation {
        let mut run = Run::new(graph, self.events.clone());

        for &id in graph.topological_order() {
            let node = graph.node(id);
            if let Some(outputs) = self.recorded.get(&node.key()) {
                debug!(node = %node.name, "Reusing recorded outputs");
                run.resolve(id, outputs.clone(), true);
            }
        }

        let limit = match self.options.parallelism {
            0 => usize::MAX,
            n => n,
        };
        let mut tasks: JoinSet<Result<Outputs, ProvisionError>> = JoinSet::new();
        // a panicking task only reports its task id, so keep the node per task
        let mut in_flight: HashMap<task::Id, NodeId> = HashMap::new();
        let mut cancelled = cancel.is_cancelled();

        loop {
            if !cancelled {
                while tasks.len() < limit {
                    let Some(id) = run.ready.pop_first() else {
                        break;
                    };
                    let (request, bindings) = run.start(id, &cancel);
                    let provisioner = Arc::clone(&self.provisioner);
                    let handle = tasks.spawn(provision_node(provisioner, request, bindings));
                    in_flight.insert(handle.id(), id);
                }
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    warn!(in_flight = tasks.len(), "Cancellation requested, waiting for in-flight provisioners");
                }
                Some(joined) = tasks.join_next_with_id() => {
                    let task_id = match &joined {
                        Ok((task_id, _)) => *task_id,
                        Err(error) => error.id(),
                    };
                    let Some(id) = in_flight.remove(&task_id) else {
                        continue;
                    };
                    match joined {
                        Ok((_, Ok(outputs))) => run.resolve(id, outputs, false),
                        Ok((_, Err(ProvisionError::Cancelled))) if cancelled || cancel.is_cancelled() => {
                            run.interrupt(id);
                        }
                        Ok((_, Err(error))) => run.fail(id, error),
                        Err(error) => {
                            warn!(node = %graph.node(id).name, %error, "Provisioner task ended abnormally");
                            let message = if error.is_panic() {
                                "provisioner panicked"
                            } else {
                                "provisioner task was aborted"
                            };
                            run.fail(id, ProvisionError::provisioning(message));
                        }
                    }
                }
            }
        }

        let evaluation = run.finish(cancelled);
        info!(summary = %evaluation.summary(), cancelled, "Evaluation finished");
        evaluation
    }

    /// Tear down recorded nodes in reverse dependency order
    ///
    /// A node is skipped while any of its dependents is still recorded
    /// (failed or skipped itself). Stops issuing calls once `cancel` fires.
    #[tracing::instrument(skip_all, fields(nodes = graph.len()))]
    pub async fn destroy(&self, graph: &Graph, cancel: CancellationToken) -> DestroyReport {
        let mut report = DestroyReport::default();
        let mut present: HashSet<NodeId> = graph
            .nodes()
            .iter()
            .filter(|n| self.recorded.contains_key(&n.key()))
            .map(|n| n.id)
            .collect();

        for &id in graph.topological_order().iter().rev() {
            if !present.contains(&id) {
                continue;
            }
            let node = graph.node(id);

            if cancel.is_cancelled() {
                report.remaining.push(node.key());
                continue;
            }

            if let Some(blocker) = graph.dependents(id).iter().find(|d| present.contains(*d)) {
                let blocker = &graph.node(*blocker).name;
                warn!(node = %node.name, blocked_by = %blocker, "Skipping destroy");
                report.skipped.push((node.key(), blocker.clone()));
                continue;
            }

            let outputs = self.recorded.get(&node.key()).cloned().unwrap_or_default();
            let provider_outputs = node
                .provider
                .map(|p| graph.node(p).key())
                .and_then(|key| self.recorded.get(&key).cloned());
            let request = DestroyRequest {
                name: node.name.clone(),
                kind: node.kind.clone(),
                payload: node.payload.clone(),
                outputs,
                provider_outputs,
                cancel: cancel.child_token(),
            };

            self.emit(SchedulerEvent::Started {
                node: node.name.clone(),
                kind: node.kind.clone(),
            });
            match self.provisioner.destroy(request).await {
                Ok(()) => {
                    info!(node = %node.name, "Destroyed");
                    present.remove(&id);
                    report.destroyed.push(node.key());
                }
                Err(error) => {
                    warn!(node = %node.name, %error, "Destroy failed");
                    self.emit(SchedulerEvent::Failed {
                        node: node.name.clone(),
                        error: error.clone(),
                    });
                    report.failed.push((node.key(), error));
                }
            }
        }

        report
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Outcome of a destroy pass (entries are `kind:name` keys)
#[derive(Debug, Clone, Default)]
pub struct DestroyReport {
    pub destroyed: Vec<String>,
    pub failed: Vec<(String, ProvisionError)>,
    /// Node and the dependent that is still present
    pub skipped: Vec<(String, String)>,
    /// Not attempted because of cancellation
    pub remaining: Vec<String>,
}

impl DestroyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && self.remaining.is_empty()
    }
}

async fn provision_node(
    provisioner: Arc<dyn Provisioner>,
    mut request: ProvisionRequest,
    bindings: Vec<(String, Deferred<Value>)>,
) -> Result<Outputs, ProvisionError> {
    for (input, value) in bindings {
        request.inputs.insert(input, value.wait().await?);
    }
    debug!(node = %request.name, kind = %request.kind, "Invoking provisioner");
    provisioner.provision(request).await
}

/// Bind one input to a (projected) output of its source node
fn bind_input(source: &Deferred<Outputs>, source_name: &str, binding: &DataBinding) -> Deferred<Value> {
    let node = source_name.to_string();
    let input = binding.input.clone();
    let output = binding.output.clone();
    let projection = binding.projection.clone();

    source.apply(move |outputs| {
        let value = outputs
            .get(&output)
            .ok_or_else(|| ProvisionError::MissingOutput {
                node,
                output: output.clone(),
            })?;
        projection
            .apply(value)
            .map_err(|error| ProvisionError::Projection { input, error })
    })
}

/// Coordinator bookkeeping for one evaluation
struct Run<'g> {
    graph: &'g Graph,
    status: Vec<NodeStatus>,
    outputs: Vec<Option<Outputs>>,
    reused: Vec<bool>,
    slots: Vec<Option<OutputSlot<Outputs>>>,
    deferred: Vec<Deferred<Outputs>>,
    remaining: Vec<usize>,
    ready: BTreeSet<NodeId>,
    events: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl<'g> Run<'g> {
    fn new(graph: &'g Graph, events: Option<mpsc::UnboundedSender<SchedulerEvent>>) -> Self {
        let (slots, deferred): (Vec<_>, Vec<_>) = graph
            .nodes()
            .iter()
            .map(|_| {
                let (slot, deferred) = OutputSlot::new();
                (Some(slot), deferred)
            })
            .unzip();
        let remaining: Vec<usize> = graph
            .nodes()
            .iter()
            .map(|n| graph.dependencies(n.id).len())
            .collect();

        Self {
            graph,
            status: vec![NodeStatus::Pending; graph.len()],
            outputs: vec![None; graph.len()],
            reused: vec![false; graph.len()],
            slots,
            deferred,
            remaining,
            ready: graph.roots().into_iter().collect(),
            events,
        }
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Move a ready node to provisioning and build its request
    fn start(
        &mut self,
        id: NodeId,
        cancel: &CancellationToken,
    ) -> (ProvisionRequest, Vec<(String, Deferred<Value>)>) {
        let graph = self.graph;
        let node = graph.node(id);
        self.status[id.index()] = NodeStatus::Provisioning;
        self.emit(SchedulerEvent::Started {
            node: node.name.clone(),
            kind: node.kind.clone(),
        });

        let mut request = ProvisionRequest::new(&node.name, &node.kind, node.payload.clone());
        request.parent = node.parent.map(|p| graph.node(p).name.clone());
        request.provider = node.provider.map(|p| graph.node(p).name.clone());
        request.dependencies = graph
            .dependencies(id)
            .iter()
            .filter_map(|dep| {
                self.outputs[dep.index()]
                    .clone()
                    .map(|outputs| (graph.node(*dep).name.clone(), outputs))
            })
            .collect::<BTreeMap<_, _>>();
        request.cancel = cancel.child_token();

        let bindings = node
            .inputs
            .iter()
            .map(|binding| {
                let source = &self.deferred[binding.source.index()];
                let source_name = &graph.node(binding.source).name;
                (binding.input.clone(), bind_input(source, source_name, binding))
            })
            .collect();

        (request, bindings)
    }

    fn resolve(&mut self, id: NodeId, outputs: Outputs, reused: bool) {
        let graph = self.graph;
        let i = id.index();
        if self.status[i].is_terminal() {
            return;
        }

        self.status[i] = NodeStatus::Resolved;
        self.reused[i] = reused;
        if let Some(slot) = self.slots[i].take() {
            slot.resolve(outputs.clone());
        }
        self.outputs[i] = Some(outputs);
        self.ready.remove(&id);
        self.emit(SchedulerEvent::Resolved {
            node: graph.node(id).name.clone(),
            reused,
        });

        for &dependent in graph.dependents(id) {
            let d = dependent.index();
            self.remaining[d] = self.remaining[d].saturating_sub(1);
            if self.remaining[d] == 0 && self.status[d] == NodeStatus::Pending {
                self.ready.insert(dependent);
            }
        }
    }

    /// Fail a node and every transitive dependent that has not resolved
    fn fail(&mut self, id: NodeId, error: ProvisionError) {
        let graph = self.graph;
        let name = graph.node(id).name.clone();
        warn!(node = %name, %error, "Provisioning failed");

        self.set_failed(id, error.clone());
        self.emit(SchedulerEvent::Failed {
            node: name.clone(),
            error,
        });

        for dependent in graph.transitive_dependents(id) {
            if self.status[dependent.index()].is_terminal() {
                continue;
            }
            let dependent_name = graph.node(dependent).name.clone();
            debug!(node = %dependent_name, failed_dependency = %name, "Skipping dependent");
            self.set_failed(dependent, ProvisionError::DependencyFailed(name.clone()));
            self.emit(SchedulerEvent::Skipped {
                node: dependent_name,
                failed_dependency: name.clone(),
            });
        }
    }

    fn set_failed(&mut self, id: NodeId, error: ProvisionError) {
        let i = id.index();
        if let Some(slot) = self.slots[i].take() {
            slot.fail(error.clone());
        }
        self.status[i] = NodeStatus::Failed(error);
        self.ready.remove(&id);
    }

    /// A cancelled in-flight call leaves the node pending for a later run
    fn interrupt(&mut self, id: NodeId) {
        self.status[id.index()] = NodeStatus::Pending;
        self.emit(SchedulerEvent::Interrupted {
            node: self.graph.node(id).name.clone(),
        });
    }

    fn finish(self, cancelled: bool) -> Evaluation {
        let graph = self.graph;
        let outcomes = graph
            .nodes()
            .iter()
            .zip(self.status)
            .zip(self.outputs)
            .zip(self.reused)
            .map(|(((node, status), outputs), reused)| NodeOutcome {
                name: node.name.clone(),
                kind: node.kind.clone(),
                status: match status {
                    // only reachable if a task ended without reporting back
                    NodeStatus::Provisioning => {
                        NodeStatus::Failed(ProvisionError::provisioning("provisioner task aborted"))
                    }
                    other => other,
                },
                outputs,
                reused,
            })
            .collect();
        Evaluation::new(graph, outcomes, cancelled)
    }
}
