//! KDLパーサー
//!
//! stackflowのKDL宣言ファイルをパースします。
//! 各ノードタイプのパース処理はモジュールに分離されています。

mod environment;
mod export;
mod node;
mod resource;

use environment::parse_environment;
use export::parse_export;
use resource::parse_resource;

// 外部クレートから再利用可能なパース関数
pub use node::node_to_payload;

use crate::error::Result;
use crate::model::Stack;
use kdl::KdlDocument;
use std::fs;
use std::path::Path;
use tracing::debug;

/// KDLファイルをパースしてStackを生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<Stack> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// KDL文字列をパース
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Stack> {
    parse_kdl_string_with_environment(content, default_name, None)
}

/// KDL文字列を環境指定でパース
///
/// 環境ブロック内の宣言は、指定された環境のものだけが
/// トップレベルの宣言の後ろに追加されます。
pub fn parse_kdl_string_with_environment(
    content: &str,
    default_name: String,
    target_environment: Option<&str>,
) -> Result<Stack> {
    let doc: KdlDocument = content.parse()?;

    let mut stack = Stack {
        name: default_name,
        ..Default::default()
    };
    let mut environment_scoped = Stack::default();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(project_name) = node::first_string(node) {
                    stack.name = project_name.to_string();
                }
            }
            "resource" => {
                stack.declarations.push(parse_resource(node)?);
            }
            "export" => {
                stack.exports.push(parse_export(node)?);
            }
            "environment" => {
                let (name, scoped) = parse_environment(node)?;
                if target_environment == Some(name.as_str()) {
                    environment_scoped.declarations.extend(scoped.declarations);
                    environment_scoped.exports.extend(scoped.exports);
                    environment_scoped.variables.extend(scoped.variables);
                }
                if !stack.environments.contains(&name) {
                    stack.environments.push(name);
                }
            }
            "variables" => {
                stack.variables.extend(node::string_children(node));
            }
            other => {
                // 不明なノードはスキップ
                debug!(node = %other, "Skipping unknown top-level node");
            }
        }
    }

    stack.declarations.extend(environment_scoped.declarations);
    stack.exports.extend(environment_scoped.exports);
    stack.variables.extend(environment_scoped.variables);

    Ok(stack)
}

#[cfg(test)]
mod tests;
