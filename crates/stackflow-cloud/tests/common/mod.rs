//! Shared fixtures for scheduler tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use stackflow_cloud::{DestroyRequest, Outputs, ProvisionError, ProvisionRequest, Provisioner};
use stackflow_core::{Declaration, Graph};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Start(String),
    End(String),
    Destroy(String),
}

/// Behaviour of one node
#[derive(Default, Clone)]
pub struct Script {
    pub outputs: Outputs,
    pub delay: Option<Duration>,
    pub fail: Option<String>,
    pub wait_for_cancel: bool,
    pub panic: bool,
    pub gate: Option<Arc<Barrier>>,
}

impl Script {
    pub fn outputs(pairs: &[(&str, Value)]) -> Self {
        Self {
            outputs: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn delayed(mut self, millis: u64) -> Self {
        self.delay = Some(Duration::from_millis(millis));
        self
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail: Some(message.to_string()),
            ..Default::default()
        }
    }
}

/// Provisioner with scripted responses that records what it was asked to do
#[derive(Default)]
pub struct ScriptedProvisioner {
    scripts: HashMap<String, Script>,
    failing_destroys: HashSet<String>,
    log: Mutex<Vec<Entry>>,
    requests: Mutex<Vec<ProvisionRequest>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, node: &str, script: Script) -> Self {
        self.scripts.insert(node.to_string(), script);
        self
    }

    pub fn failing_destroy(mut self, node: &str) -> Self {
        self.failing_destroys.insert(node.to_string());
        self
    }

    pub fn log(&self) -> Vec<Entry> {
        self.log.lock().unwrap().clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|e| match e {
                Entry::Start(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|e| match e {
                Entry::Destroy(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, entry: &Entry) -> usize {
        self.log()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{entry:?} not in log"))
    }

    pub fn request(&self, node: &str) -> ProvisionRequest {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name == node)
            .cloned()
            .unwrap_or_else(|| panic!("no request for {node}"))
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn push(&self, entry: Entry) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Provisioner for ScriptedProvisioner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn provision(&self, request: ProvisionRequest) -> Result<Outputs, ProvisionError> {
        let script = self.scripts.get(&request.name).cloned().unwrap_or_default();
        self.requests.lock().unwrap().push(request.clone());
        self.push(Entry::Start(request.name.clone()));

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &script.gate {
            gate.wait().await;
        }
        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        if script.panic {
            panic!("scripted panic in {}", request.name);
        }

        let result = if script.wait_for_cancel {
            request.cancel.cancelled().await;
            Err(ProvisionError::Cancelled)
        } else if let Some(message) = script.fail {
            Err(ProvisionError::Provisioning(message))
        } else {
            Ok(script.outputs)
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.push(Entry::End(request.name.clone()));
        result
    }

    async fn destroy(&self, request: DestroyRequest) -> Result<(), ProvisionError> {
        if self.failing_destroys.contains(&request.name) {
            return Err(ProvisionError::provisioning("resource is protected"));
        }
        self.push(Entry::Destroy(request.name));
        Ok(())
    }
}

pub fn graph(declarations: Vec<Declaration>) -> Graph {
    Graph::build(&declarations).expect("graph should build")
}
