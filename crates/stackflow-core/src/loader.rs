//! 統合ローダー
//!
//! ファイル発見 → 変数収集 → テンプレート展開 → KDLパース をまとめて行います。

use crate::discovery::{DiscoveredFiles, discover_files, find_project_root};
use crate::error::{Result, StackError};
use crate::model::Stack;
use crate::parser::parse_kdl_string_with_environment;
use crate::template::{TemplateProcessor, Variables, extract_variables};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, instrument};

/// カレントディレクトリからプロジェクトを探してロード
#[instrument]
pub fn load_stack(environment: Option<&str>) -> Result<Stack> {
    let project_root = find_project_root()?;
    load_stack_from_root(&project_root, environment)
}

/// 指定されたルートディレクトリからプロジェクトをロード
///
/// 読み込み順序: variables/ → stack.kdl → resources/ → stack.<env>.kdl → stack.local.kdl
#[instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn load_stack_from_root(project_root: &Path, environment: Option<&str>) -> Result<Stack> {
    let discovered = discover_files(project_root, environment)?;
    if discovered.root.is_none() {
        return Err(StackError::ProjectRootNotFound(project_root.to_path_buf()));
    }

    let mut processor = prepare_template_processor(&discovered, project_root, environment)?;
    let expanded = expand_all_files(&discovered, &mut processor)?;
    debug!(content_size = expanded.len(), "Template expansion complete");

    let name = project_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let stack = parse_kdl_string_with_environment(&expanded, name, environment)?;

    info!(
        stack = %stack.name,
        declarations = stack.declarations.len(),
        exports = stack.exports.len(),
        "Stack loaded"
    );
    Ok(stack)
}

/// 変数を集めたテンプレートプロセッサを作る
///
/// 優先順位（後勝ち）: KDL の variables → .env → STACKFLOW_* / CI_* 環境変数
fn prepare_template_processor(
    discovered: &DiscoveredFiles,
    project_root: &Path,
    environment: Option<&str>,
) -> Result<TemplateProcessor> {
    let mut processor = TemplateProcessor::new();
    processor.add_variable(
        "PROJECT_ROOT",
        Value::String(project_root.to_string_lossy().to_string()),
    );
    processor.add_variable(
        "ENVIRONMENT",
        environment.map_or(Value::Null, |e| Value::String(e.to_string())),
    );

    let mut variables = Variables::new();
    for file in discovered.kdl_files() {
        let content = std::fs::read_to_string(file).map_err(|e| StackError::IoError {
            path: file.to_path_buf(),
            message: e.to_string(),
        })?;
        variables.extend(extract_variables(&content, environment)?);
    }
    debug!(variable_count = variables.len(), "Collected KDL variables");
    processor.add_variables(variables);

    if let Some(env_file) = &discovered.env_file {
        processor.add_env_file_variables(env_file)?;
    }
    processor.add_env_variables();

    Ok(processor)
}

/// 全ファイルを展開して1つのドキュメントに結合
fn expand_all_files(
    discovered: &DiscoveredFiles,
    processor: &mut TemplateProcessor,
) -> Result<String> {
    let mut expanded = String::new();
    for file in discovered.kdl_files() {
        debug!(file = %file.display(), "Rendering file");
        expanded.push_str(&processor.render_file(file)?);
        expanded.push_str("\n\n");
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_stack_with_resource_files() -> Result<()> {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "stack.kdl",
            r#"
project "workshop"
variables {
    domain "workshop.example.dev"
}
resource "domain" kind="digitalocean:domain" {
    name "{{ domain }}"
}
"#,
        );
        write(
            root,
            "resources/cluster.kdl",
            r#"
resource "workshop-cluster" kind="digitalocean:kubernetes" {
    region "{{ region }}"
}
"#,
        );
        write(root, "variables/common.kdl", "variables {\n    region \"nyc1\"\n}\n");

        let stack = load_stack_from_root(root, None)?;
        assert_eq!(stack.name, "workshop");
        assert_eq!(stack.declarations.len(), 2);
        assert_eq!(
            stack.declaration("domain").unwrap().payload["name"],
            "workshop.example.dev"
        );
        assert_eq!(
            stack.declaration("workshop-cluster").unwrap().payload["region"],
            "nyc1"
        );
        Ok(())
    }

    #[test]
    fn test_load_stack_with_environment() -> Result<()> {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "stack.kdl",
            r#"
variables {
    node_count 1
}
resource "workshop-cluster" kind="digitalocean:kubernetes" {
    node_count {{ node_count }}
    tag "{{ ENVIRONMENT }}"
}
environment "prod" {
    variables {
        node_count 3
    }
}
"#,
        );
        write(
            root,
            "stack.prod.kdl",
            r#"resource "backup-bucket" kind="digitalocean:spaces" {}"#,
        );

        let prod = load_stack_from_root(root, Some("prod"))?;
        let cluster = prod.declaration("workshop-cluster").unwrap();
        assert_eq!(cluster.payload["node_count"], 3);
        assert_eq!(cluster.payload["tag"], "prod");
        assert!(prod.declaration("backup-bucket").is_some());

        let temp_dir_dev = tempfile::tempdir().unwrap();
        write(
            temp_dir_dev.path(),
            "stack.kdl",
            &fs::read_to_string(root.join("stack.kdl")).unwrap(),
        );
        let dev = load_stack_from_root(temp_dir_dev.path(), Some("dev"))?;
        assert_eq!(dev.declaration("workshop-cluster").unwrap().payload["node_count"], 1);
        Ok(())
    }

    #[test]
    fn test_undefined_variable_names_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(
            temp_dir.path(),
            "stack.kdl",
            r#"resource "domain" kind="digitalocean:domain" { name "{{ missing_domain }}" }"#,
        );

        let err = load_stack_from_root(temp_dir.path(), None).unwrap_err();
        match err {
            StackError::TemplateError { file, message, .. } => {
                assert!(file.ends_with("stack.kdl"));
                assert!(message.contains("missing_domain"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_file_variables() -> Result<()> {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        write(root, ".env", "DO_REGION=ams3\n");
        write(
            root,
            "stack.kdl",
            r#"resource "cluster" kind="digitalocean:kubernetes" { region "{{ DO_REGION }}" }"#,
        );

        let stack = load_stack_from_root(root, None)?;
        assert_eq!(stack.declaration("cluster").unwrap().payload["region"], "ams3");
        Ok(())
    }

    #[test]
    fn test_missing_root_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = load_stack_from_root(temp_dir.path(), None).unwrap_err();
        assert!(matches!(err, StackError::ProjectRootNotFound(_)));
    }
}
