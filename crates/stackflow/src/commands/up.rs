use crate::commands::outputs::print_exports;
use crate::commands::plan::print_plan;
use crate::project::Project;
use crate::utils;
use colored::Colorize;
use stackflow_cloud::{Plan, Scheduler, SchedulerOptions};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn handle(environment: Option<String>, yes: bool) -> anyhow::Result<()> {
    let project = Project::load(environment)?;
    println!(
        "{} {} (環境: {})",
        "プロビジョニング:".bold(),
        project.stack.name.cyan(),
        project.environment_label().cyan()
    );

    let state_manager = project.state_manager();
    let lock = state_manager.acquire_lock().await?;
    let mut state = state_manager.load().await?;
    let recorded = state.recorded_outputs();

    let plan = Plan::build(&project.graph, &recorded);
    print_plan(&plan);
    if !plan.has_changes {
        println!("{}", "✓ すべてのリソースは最新です".green());
        lock.release().await?;
        return Ok(());
    }

    let registry = project.registry();
    let unhandled = project.unhandled_kinds(&registry);
    if !unhandled.is_empty() {
        println!(
            "{} プロビジョナー未設定の kind: {}",
            "⚠".yellow(),
            unhandled.join(", ").yellow()
        );
    }

    println!();
    if !utils::confirm("プロビジョニングを実行しますか?", yes)? {
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

    let scheduler = Scheduler::new(Arc::new(registry))
        .with_options(SchedulerOptions {
            parallelism: project.settings.parallelism,
        })
        .with_recorded_outputs(recorded)
        .with_events(events_tx);

    let evaluation = scheduler
        .evaluate(&project.graph, utils::cancel_on_ctrl_c())
        .await;
    // 送信側を閉じてから表示タスクの終了を待つ
    drop(scheduler);
    let _ = printer.await;

    let written = state.record(&evaluation);
    state_manager.save(&state).await?;
    lock.release().await?;
    tracing::debug!(written, "State saved");

    println!();
    println!("{}", evaluation.summary().to_string().bold());

    let exports = evaluation.exports();
    if !exports.is_empty() {
        println!();
        print_exports(&exports, false);
    }

    if evaluation.was_cancelled() {
        let pending: Vec<&str> = evaluation
            .pending()
            .into_iter()
            .map(|o| o.name.as_str())
            .collect();
        anyhow::bail!(
            "中断されました。未完了: {}\n再度 `stackflow up` を実行すると続きから再開します",
            pending.join(", ")
        );
    }

    let failures = evaluation.failures();
    if !failures.is_empty() {
        eprintln!();
        eprintln!("{}", "✗ 失敗したリソース:".red().bold());
        for outcome in &failures {
            if let Some(error) = outcome.status.error() {
                eprintln!("  - {}: {}", outcome.name.cyan(), error);
            }
        }
        anyhow::bail!("{}個のリソースのプロビジョニングに失敗しました", failures.len());
    }

    println!("{}", "✓ プロビジョニング完了".green().bold());
    Ok(())
}
