//! Deferred output values
//!
//! A node's outputs are not known until its provisioner returns. They are
//! modelled as a write-once slot ([`OutputSlot`]) with any number of readers
//! ([`Deferred`]). Readers never observe a half-written value: the slot moves
//! from `Unresolved` to a terminal state exactly once.

use crate::error::ProvisionError;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::watch;

/// Named outputs reported by a provisioner
pub type Outputs = BTreeMap<String, Value>;

/// Observable state of a deferred value
#[derive(Debug, Clone, PartialEq)]
pub enum OutputState<T> {
    Unresolved,
    Resolved(T),
    Failed(ProvisionError),
}

impl<T> OutputState<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutputState::Unresolved)
    }
}

/// Write side of a deferred value
///
/// `resolve` and `fail` consume the slot, so a value can be written at most once.
/// Dropping an unwritten slot closes the channel; readers then see `Cancelled`.
#[derive(Debug)]
pub struct OutputSlot<T> {
    tx: watch::Sender<OutputState<T>>,
}

impl<T: Clone + Send + Sync + 'static> OutputSlot<T> {
    /// Create an unresolved slot and its first reader
    pub fn new() -> (Self, Deferred<T>) {
        let (tx, rx) = watch::channel(OutputState::Unresolved);
        (Self { tx }, Deferred { rx })
    }

    pub fn resolve(self, value: T) {
        self.tx.send_replace(OutputState::Resolved(value));
    }

    pub fn fail(self, error: ProvisionError) {
        self.tx.send_replace(OutputState::Failed(error));
    }

    pub fn complete(self, result: Result<T, ProvisionError>) {
        match result {
            Ok(value) => self.resolve(value),
            Err(error) => self.fail(error),
        }
    }

    /// Another reader of this slot
    pub fn subscribe(&self) -> Deferred<T> {
        Deferred {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of a deferred value
#[derive(Debug, Clone)]
pub struct Deferred<T> {
    rx: watch::Receiver<OutputState<T>>,
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    /// An already-resolved value
    pub fn ready(value: T) -> Self {
        let (_tx, rx) = watch::channel(OutputState::Resolved(value));
        Self { rx }
    }

    /// An already-failed value
    pub fn failed(error: ProvisionError) -> Self {
        let (_tx, rx) = watch::channel(OutputState::Failed(error));
        Self { rx }
    }

    /// Current state without waiting
    pub fn state(&self) -> OutputState<T> {
        self.rx.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.rx.borrow(), OutputState::Resolved(_))
    }

    /// Wait until the value reaches a terminal state
    pub async fn wait(&self) -> Result<T, ProvisionError> {
        let mut rx = self.rx.clone();
        let state = match rx.wait_for(OutputState::is_terminal).await {
            Ok(state) => state.clone(),
            // writer dropped without writing
            Err(_) => return Err(ProvisionError::Cancelled),
        };
        match state {
            OutputState::Resolved(value) => Ok(value),
            OutputState::Failed(error) => Err(error),
            OutputState::Unresolved => Err(ProvisionError::Cancelled),
        }
    }

    /// Derive a new deferred value once this one resolves
    ///
    /// A failure of the source, or an error returned by `f`, produces a failed value.
    /// If the source is still unresolved the transform runs on a spawned task,
    /// so this must be called from within a tokio runtime in that case.
    pub fn apply<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Result<U, ProvisionError> + Send + 'static,
    {
        match self.state() {
            OutputState::Resolved(value) => match f(value) {
                Ok(mapped) => Deferred::ready(mapped),
                Err(error) => Deferred::failed(error),
            },
            OutputState::Failed(error) => Deferred::failed(error),
            OutputState::Unresolved => {
                let (slot, deferred) = OutputSlot::new();
                let source = self.clone();
                tokio::spawn(async move {
                    slot.complete(source.wait().await.and_then(f));
                });
                deferred
            }
        }
    }
}
