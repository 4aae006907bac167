use crate::project::Project;
use colored::Colorize;
use stackflow_core::EdgeKind;

pub async fn handle(environment: Option<String>) -> anyhow::Result<()> {
    let project = Project::load(environment)?;
    let graph = &project.graph;

    println!(
        "{} ({} ノード, {} 辺)",
        project.stack.name.bold(),
        graph.len(),
        graph.edges().len()
    );

    for &id in graph.topological_order() {
        let node = graph.node(id);
        println!("{} {}", node.name.cyan().bold(), format!("({})", node.kind).dimmed());

        for edge in graph.edges().iter().filter(|e| e.to == id) {
            let source = &graph.node(edge.from).name;
            match edge.kind {
                EdgeKind::Parent => println!("  ← {} {}", "parent".blue(), source),
                EdgeKind::Provider => println!("  ← {} {}", "provider".yellow(), source),
                // 入力ごとの詳細は下で表示
                EdgeKind::Data => {}
            }
        }
        for binding in &node.inputs {
            let projection = if binding.projection.is_identity() {
                String::new()
            } else {
                format!(" {}", binding.projection)
            };
            println!(
                "  ← {} {}.{}{} as {}",
                "data".magenta(),
                graph.node(binding.source).name,
                binding.output,
                projection,
                binding.input
            );
        }
    }

    if !graph.exports().is_empty() {
        println!();
        println!("{}", "exports:".bold());
        for export in graph.exports() {
            let secret = if export.secret { " [secret]" } else { "" };
            println!(
                "  {} ← {}.{} {}{}",
                export.name.cyan(),
                graph.node(export.source).name,
                export.output,
                export.projection,
                secret.yellow()
            );
        }
    }

    Ok(())
}
