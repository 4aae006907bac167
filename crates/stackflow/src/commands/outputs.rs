use crate::project::Project;
use crate::utils::{self, MASK};
use colored::Colorize;
use serde_json::{Map, Value};
use stackflow_cloud::{Evaluation, ExportValue};

pub async fn handle(environment: Option<String>, show_secrets: bool, json: bool) -> anyhow::Result<()> {
    let project = Project::load(environment)?;
    let state = project.state_manager().load().await?;
    let evaluation = Evaluation::from_recorded(&project.graph, &state.recorded_outputs());
    let exports = evaluation.exports();

    if json {
        println!("{}", serde_json::to_string_pretty(&exports_json(&exports, show_secrets))?);
        return Ok(());
    }

    if exports.is_empty() {
        println!("{}", "エクスポートは宣言されていません".dimmed());
        return Ok(());
    }
    print_exports(&exports, show_secrets);
    Ok(())
}

/// エクスポートを表示（secret はマスク）
pub fn print_exports(exports: &[ExportValue], show_secrets: bool) {
    println!("{}", "エクスポート:".bold());
    for export in exports {
        match &export.value {
            Ok(_) if export.secret && !show_secrets => {
                println!("  {} = {}", export.name.cyan(), MASK.dimmed());
            }
            Ok(value) => {
                println!("  {} = {}", export.name.cyan(), utils::display_value(value));
            }
            Err(error) => {
                println!("  {} = {} ({})", export.name.cyan(), "未解決".yellow(), error);
            }
        }
    }
}

/// 未解決のエクスポートは null
fn exports_json(exports: &[ExportValue], show_secrets: bool) -> Value {
    let mut object = Map::new();
    for export in exports {
        let value = match &export.value {
            Ok(_) if export.secret && !show_secrets => Value::String(MASK.to_string()),
            Ok(value) => value.clone(),
            Err(_) => Value::Null,
        };
        object.insert(export.name.clone(), value);
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackflow_cloud::ProvisionError;

    fn exports() -> Vec<ExportValue> {
        vec![
            ExportValue {
                name: "endpoint".to_string(),
                secret: false,
                value: Ok(json!("https://k8s.example.dev")),
            },
            ExportValue {
                name: "kubeconfig".to_string(),
                secret: true,
                value: Ok(json!("apiVersion: v1")),
            },
            ExportValue {
                name: "registry".to_string(),
                secret: false,
                value: Err(ProvisionError::NotResolved("registry".to_string())),
            },
        ]
    }

    #[test]
    fn test_exports_json_masks_secrets() {
        assert_eq!(
            exports_json(&exports(), false),
            json!({
                "endpoint": "https://k8s.example.dev",
                "kubeconfig": MASK,
                "registry": null,
            })
        );
    }

    #[test]
    fn test_exports_json_show_secrets() {
        let value = exports_json(&exports(), true);
        assert_eq!(value["kubeconfig"], json!("apiVersion: v1"));
    }
}
