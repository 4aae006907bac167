//! environment ノードのパース

use super::export::parse_export;
use super::node::{first_string, string_children};
use super::resource::parse_resource;
use crate::error::{Result, StackError};
use crate::model::Stack;
use kdl::KdlNode;

/// environment ノードをパース
///
/// 環境固有の resource / export / variables を返します。
pub fn parse_environment(node: &KdlNode) -> Result<(String, Stack)> {
    let name = first_string(node)
        .ok_or_else(|| StackError::InvalidConfig("environment requires a name".to_string()))?
        .to_string();

    let mut scoped = Stack {
        name: name.clone(),
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "resource" => scoped.declarations.push(parse_resource(child)?),
                "export" => scoped.exports.push(parse_export(child)?),
                "variables" => scoped.variables.extend(string_children(child)),
                _ => {}
            }
        }
    }

    Ok((name, scoped))
}
