use crate::project::Project;
use colored::Colorize;

pub async fn handle(environment: Option<String>) -> anyhow::Result<()> {
    println!("{}", "宣言を検証中...".blue());

    let project = Project::load(environment)?;
    println!(
        "プロジェクトルート: {}",
        project.root.display().to_string().cyan()
    );
    println!("環境: {}", project.environment_label().cyan());

    println!("{}", "✓ 宣言は正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  スタック: {}", project.stack.name.cyan());
    println!("  リソース: {}個", project.graph.len());
    for node in project.graph.nodes() {
        println!("    - {} ({})", node.name.cyan(), node.kind);
    }
    println!("  依存関係: {}本", project.graph.edges().len());
    if !project.graph.exports().is_empty() {
        println!("  エクスポート: {}個", project.graph.exports().len());
        for export in project.graph.exports() {
            let secret = if export.secret { " [secret]" } else { "" };
            println!("    - {}{}", export.name.cyan(), secret.yellow());
        }
    }

    let registry = project.registry();
    let unhandled = project.unhandled_kinds(&registry);
    if !unhandled.is_empty() {
        println!();
        println!(
            "{}",
            "⚠ 以下の kind を担当するプロビジョナーが設定されていません:".yellow()
        );
        for kind in unhandled {
            println!("    - {}", kind);
        }
    }

    Ok(())
}
