//! Provisioner backed by an external command

use crate::command::CommandSpec;
use crate::error::{ExecError, Result};
use async_trait::async_trait;
use serde::Serialize;
use stackflow_cloud::{DestroyRequest, Outputs, ProvisionError, ProvisionRequest, Provisioner};
use tracing::{debug, info, instrument};

pub const ACTION_PROVISION: &str = "provision";
pub const ACTION_DESTROY: &str = "destroy";

/// Runs one command per node
///
/// The command is invoked as `<command> <args...> <action>` with the request
/// JSON on stdin and `STACKFLOW_ACTION`, `STACKFLOW_NODE`, `STACKFLOW_KIND`
/// in its environment. `provision` must print a JSON object of outputs.
#[derive(Debug, Clone)]
pub struct ExecProvisioner {
    name: String,
    spec: CommandSpec,
}

impl ExecProvisioner {
    pub fn new(name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn invoke<T: Serialize>(
        &self,
        action: &str,
        name: &str,
        kind: &str,
        request: &T,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<String> {
        let stdin = serde_json::to_vec(request)?;
        let env = [
            ("STACKFLOW_ACTION", action),
            ("STACKFLOW_NODE", name),
            ("STACKFLOW_KIND", kind),
        ];
        self.spec.run(action, &stdin, &env, cancel).await
    }

    fn parse_outputs(&self, stdout: &str) -> Result<Outputs> {
        if stdout.trim().is_empty() {
            return Ok(Outputs::new());
        }
        serde_json::from_str(stdout).map_err(|source| ExecError::InvalidOutput {
            command: self.spec.command.clone(),
            source,
        })
    }
}

#[async_trait]
impl Provisioner for ExecProvisioner {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request), fields(provisioner = %self.name, node = %request.name))]
    async fn provision(&self, request: ProvisionRequest) -> std::result::Result<Outputs, ProvisionError> {
        let stdout = self
            .invoke(ACTION_PROVISION, &request.name, &request.kind, &request, &request.cancel)
            .await?;
        let outputs = self.parse_outputs(&stdout)?;
        info!(outputs = outputs.len(), "Provisioned via command");
        Ok(outputs)
    }

    #[instrument(skip(self, request), fields(provisioner = %self.name, node = %request.name))]
    async fn destroy(&self, request: DestroyRequest) -> std::result::Result<(), ProvisionError> {
        let stdout = self
            .invoke(ACTION_DESTROY, &request.name, &request.kind, &request, &request.cancel)
            .await?;
        if !stdout.trim().is_empty() {
            debug!(stdout = %stdout.trim(), "Destroy command output");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackflow_cloud::CancellationToken;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn script(body: &str) -> ExecProvisioner {
        ExecProvisioner::new(
            "test",
            CommandSpec::new("sh").arg("-c").arg(body).arg("provisioner"),
        )
    }

    fn request() -> ProvisionRequest {
        let mut request = ProvisionRequest::new(
            "platform",
            "kubernetes:namespace",
            json!({"labels": {"team": "platform"}}),
        );
        request.provider = Some("cluster".to_string());
        request
            .inputs
            .insert("kubeconfig".to_string(), json!("apiVersion: v1"));
        request
    }

    #[tokio::test]
    async fn test_provision_returns_outputs() {
        let provisioner = script(r#"cat >/dev/null; echo '{"id": "ns-1", "ready": true}'"#);
        let outputs = provisioner.provision(request()).await.unwrap();
        assert_eq!(outputs.get("id"), Some(&json!("ns-1")));
        assert_eq!(outputs.get("ready"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_request_json_on_stdin() {
        // echo the request back as the outputs
        let provisioner = script("cat");
        let outputs = provisioner.provision(request()).await.unwrap();
        assert_eq!(outputs.get("name"), Some(&json!("platform")));
        assert_eq!(outputs.get("provider"), Some(&json!("cluster")));
        assert_eq!(
            outputs["inputs"]["kubeconfig"],
            json!("apiVersion: v1")
        );
        assert_eq!(outputs["payload"]["labels"]["team"], json!("platform"));
        assert!(outputs.get("cancel").is_none());
    }

    #[tokio::test]
    async fn test_environment_describes_node() {
        let provisioner = script(
            r#"cat >/dev/null; printf '{"action":"%s","node":"%s","kind":"%s","arg":"%s"}' "$STACKFLOW_ACTION" "$STACKFLOW_NODE" "$STACKFLOW_KIND" "$1""#,
        );
        let outputs = provisioner.provision(request()).await.unwrap();
        assert_eq!(outputs["action"], json!("provision"));
        assert_eq!(outputs["node"], json!("platform"));
        assert_eq!(outputs["kind"], json!("kubernetes:namespace"));
        assert_eq!(outputs["arg"], json!("provision"));
    }

    #[tokio::test]
    async fn test_empty_stdout_means_no_outputs() {
        let outputs = script("cat >/dev/null").provision(request()).await.unwrap();
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_outputs_fail() {
        let err = script("cat >/dev/null; echo 'not json'")
            .provision(request())
            .await
            .unwrap_err();
        match err {
            ProvisionError::Provisioning(message) => {
                assert!(message.contains("invalid outputs"), "{message}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_outputs_must_be_an_object() {
        let err = script("cat >/dev/null; echo '[1, 2]'")
            .provision(request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Provisioning(_)));
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let err = script("cat >/dev/null; echo 'region unavailable' >&2; exit 1")
            .provision(request())
            .await
            .unwrap_err();
        match err {
            ProvisionError::Provisioning(message) => {
                assert!(message.contains("region unavailable"), "{message}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_maps_to_cancelled() {
        let request = request();
        let cancel = request.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let err = script("sleep 10").provision(request).await.unwrap_err();
        assert_eq!(err, ProvisionError::Cancelled);
    }

    #[tokio::test]
    async fn test_destroy_receives_recorded_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let captured = dir.path().join("destroy.json");
        let provisioner = script(&format!(
            r#"[ "$1" = destroy ] && cat > '{}'"#,
            captured.display()
        ));

        let mut outputs = BTreeMap::new();
        outputs.insert("id".to_string(), json!("ns-1"));
        let request = DestroyRequest {
            name: "platform".to_string(),
            kind: "kubernetes:namespace".to_string(),
            payload: json!({}),
            outputs,
            provider_outputs: None,
            cancel: CancellationToken::new(),
        };
        provisioner.destroy(request).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&captured).unwrap()).unwrap();
        assert_eq!(written["outputs"]["id"], json!("ns-1"));
        assert_eq!(written["name"], json!("platform"));
    }
}
