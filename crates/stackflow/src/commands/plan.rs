use crate::project::Project;
use colored::Colorize;
use stackflow_cloud::{ActionType, Plan};

pub async fn handle(environment: Option<String>) -> anyhow::Result<()> {
    let project = Project::load(environment)?;
    let state = project.state_manager().load().await?;
    let plan = Plan::build(&project.graph, &state.recorded_outputs());

    println!(
        "{} {} (環境: {})",
        "実行計画:".bold(),
        project.stack.name.cyan(),
        project.environment_label().cyan()
    );
    print_plan(&plan);
    Ok(())
}

/// ウェーブごとにアクションを表示
pub fn print_plan(plan: &Plan) {
    for (wave, actions) in plan.waves().iter().enumerate() {
        println!();
        println!("{}", format!("wave {}", wave).bold());
        for action in actions {
            let marker = match action.action_type {
                ActionType::Create => "+".green(),
                ActionType::NoOp => "=".dimmed(),
            };
            let depends = if action.depends_on.is_empty() {
                String::new()
            } else {
                format!(" ← {}", action.depends_on.join(", "))
            };
            println!(
                "  {} {} ({}){}",
                marker,
                action.name.cyan(),
                action.kind,
                depends.dimmed()
            );
        }
    }

    if !plan.orphaned.is_empty() {
        println!();
        println!(
            "{}",
            "⚠ 状態ファイルにあるが宣言されていないリソース:".yellow()
        );
        for key in &plan.orphaned {
            println!("    - {}", key);
        }
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}
