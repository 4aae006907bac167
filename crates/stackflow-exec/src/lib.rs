//! External-command provisioner for stackflow
//!
//! Lets a stack delegate each resource kind to any executable: a shell
//! script, a `terraform` wrapper, a cloud CLI. The command receives the
//! node's request as JSON on stdin and answers with its outputs as JSON on
//! stdout.
//!
//! # Example
//!
//! ```ignore
//! use stackflow_exec::{CommandSpec, ExecProvisioner};
//! use stackflow_cloud::ProvisionerRegistry;
//! use std::sync::Arc;
//!
//! let domains = ExecProvisioner::new(
//!     "digitalocean",
//!     CommandSpec::new("./provisioners/digitalocean.sh"),
//! );
//! let registry = ProvisionerRegistry::default().with("digitalocean:", Arc::new(domains));
//! ```

pub mod command;
pub mod error;
pub mod provisioner;

pub use command::CommandSpec;
pub use error::{ExecError, Result};
pub use provisioner::{ACTION_DESTROY, ACTION_PROVISION, ExecProvisioner};
