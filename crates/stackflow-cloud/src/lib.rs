//! stackflow Output Resolver / Scheduler
//!
//! Provisions a resource graph built by `stackflow-core`, feeding each node's
//! resolved outputs forward into the nodes that depend on it.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              stackflow CLI (up/destroy)       │
//! └──────────────────────┬───────────────────────┘
//!                        │ Graph + recorded outputs
//! ┌──────────────────────▼───────────────────────┐
//! │               stackflow-cloud                 │
//! │  Scheduler ──► Deferred<Outputs> per node     │
//! │  Plan          StateManager                   │
//! └──────────────────────┬───────────────────────┘
//!                        │ trait Provisioner
//! ┌──────────────────────▼───────────────────────┐
//! │  ProvisionerRegistry (kind prefix dispatch)   │
//! │     └─► stackflow-exec (external commands)    │
//! └──────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod evaluation;
pub mod output;
pub mod plan;
pub mod provisioner;
pub mod registry;
pub mod scheduler;
pub mod state;

// Re-exports
pub use error::{CloudError, ProvisionError, Result};
pub use evaluation::{Evaluation, EvaluationSummary, ExportValue, NodeOutcome, NodeStatus};
pub use output::{Deferred, OutputSlot, OutputState, Outputs};
pub use plan::{Action, ActionType, Plan, PlanSummary};
pub use provisioner::{DestroyRequest, ProvisionRequest, Provisioner};
pub use registry::ProvisionerRegistry;
pub use scheduler::{DestroyReport, Scheduler, SchedulerEvent, SchedulerOptions};
pub use state::{ResourceRecord, StackState, StateLock, StateManager};
pub use tokio_util::sync::CancellationToken;
