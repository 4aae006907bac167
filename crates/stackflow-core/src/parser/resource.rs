//! resource ノードのパース

use super::node::{document_to_payload, first_string, required_string_property, string_property};
use crate::error::{Result, StackError};
use crate::model::{Declaration, InputBinding, OutputRef, Projection};
use kdl::KdlNode;

/// resource ノードをパース
///
/// ```kdl
/// resource "platform" kind="kubernetes:namespace" parent="do-k8s" provider="do-k8s" {
///     metadata name="platform"
/// }
/// ```
pub fn parse_resource(node: &KdlNode) -> Result<Declaration> {
    let name = first_string(node)
        .ok_or_else(|| StackError::InvalidConfig("resource requires a name".to_string()))?
        .to_string();
    let kind = required_string_property(node, "kind", &format!("resource '{name}'"))?;

    let mut declaration = Declaration::new(name.clone(), kind);
    declaration.parent = string_property(node, "parent").map(str::to_string);
    declaration.provider = string_property(node, "provider").map(str::to_string);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "input" {
                declaration.inputs.push(parse_input(child, &name)?);
            }
        }
        // input 以外の子ノードは desired-state ペイロード
        declaration.payload = document_to_payload(children, &["input"]);
    }

    Ok(declaration)
}

/// input ノードをパース
///
/// `input "kubeconfig" from="workshop-cluster" output="kube_configs" path="[0].raw_config"`
fn parse_input(node: &KdlNode, owner: &str) -> Result<InputBinding> {
    let input = first_string(node)
        .ok_or_else(|| {
            StackError::InvalidConfig(format!("resource '{owner}' の input には名前が必要です"))
        })?
        .to_string();
    let from = parse_output_ref(node, &format!("resource '{owner}' の input '{input}'"))?;
    Ok(InputBinding { input, from })
}

/// from/output/path プロパティから出力参照を組み立てる
pub(super) fn parse_output_ref(node: &KdlNode, context: &str) -> Result<OutputRef> {
    let source = required_string_property(node, "from", context)?;
    let output = required_string_property(node, "output", context)?;
    let projection = match string_property(node, "path") {
        Some(path) => Projection::parse(path)?,
        None => Projection::identity(),
    };
    Ok(OutputRef::new(source, output).with_projection(projection))
}
