//! export ノードのパース

use super::node::{first_string, property};
use super::resource::parse_output_ref;
use crate::error::{Result, StackError};
use crate::model::Export;
use kdl::KdlNode;

/// export ノードをパース
///
/// `export "kubeconfig" from="workshop-cluster" output="kube_configs" path="[0].raw_config" secret=#true`
pub fn parse_export(node: &KdlNode) -> Result<Export> {
    let name = first_string(node)
        .ok_or_else(|| StackError::InvalidConfig("export requires a name".to_string()))?
        .to_string();
    let from = parse_output_ref(node, &format!("export '{name}'"))?;
    let secret = property(node, "secret")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    Ok(Export { name, from, secret })
}
