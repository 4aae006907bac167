use crate::project::Project;
use crate::utils;
use colored::Colorize;
use stackflow_cloud::Scheduler;
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn handle(environment: Option<String>, yes: bool) -> anyhow::Result<()> {
    let project = Project::load(environment)?;
    let state_manager = project.state_manager();
    let lock = state_manager.acquire_lock().await?;
    let mut state = state_manager.load().await?;

    // 削除は依存の逆順
    let targets: Vec<_> = project
        .graph
        .topological_order()
        .iter()
        .rev()
        .map(|id| project.graph.node(*id))
        .filter(|node| state.get(&node.key()).is_some())
        .collect();

    if targets.is_empty() {
        println!("{}", "削除対象のリソースはありません".dimmed());
        lock.release().await?;
        return Ok(());
    }

    println!(
        "{} {} (環境: {})",
        "削除対象:".red().bold(),
        project.stack.name.cyan(),
        project.environment_label().cyan()
    );
    for node in &targets {
        println!("  {} {} ({})", "-".red(), node.name.cyan(), node.kind);
    }
    println!();
    println!("{}", "⚠️  この操作は取り消せません".yellow().bold());
    if !utils::confirm("削除を実行しますか?", yes)? {
        println!("{}", "キャンセルしました".yellow());
        lock.release().await?;
        return Ok(());
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            utils::print_event(&event);
        }
    });

    let scheduler = Scheduler::new(Arc::new(project.registry()))
        .with_recorded_outputs(state.recorded_outputs())
        .with_events(events_tx);
    let report = scheduler
        .destroy(&project.graph, utils::cancel_on_ctrl_c())
        .await;
    drop(scheduler);
    let _ = printer.await;

    for key in &report.destroyed {
        state.remove(key);
    }
    state_manager.save(&state).await?;
    lock.release().await?;

    println!();
    println!("{}個のリソースを削除しました", report.destroyed.len());
    for (key, blocker) in &report.skipped {
        println!(
            "  {} {} ({} が残っているためスキップ)",
            "-".yellow(),
            key,
            blocker.yellow()
        );
    }

    if !report.remaining.is_empty() {
        anyhow::bail!(
            "中断されました。未削除: {}",
            report.remaining.join(", ")
        );
    }
    if !report.failed.is_empty() {
        eprintln!();
        eprintln!("{}", "✗ 削除に失敗したリソース:".red().bold());
        for (key, error) in &report.failed {
            eprintln!("  - {}: {}", key.cyan(), error);
        }
        anyhow::bail!("{}個のリソースの削除に失敗しました", report.failed.len());
    }
    if !report.skipped.is_empty() {
        anyhow::bail!("{}個のリソースを削除できませんでした", report.skipped.len());
    }

    println!("{}", "✓ 削除完了".green().bold());
    Ok(())
}
