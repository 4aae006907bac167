use colored::Colorize;
use serde_json::Value;
use stackflow_cloud::SchedulerEvent;
use std::io::{BufRead, IsTerminal, Write};

/// 確認プロンプト
///
/// `--yes` 指定時は常に true。端末でない場合は実行しない（--yes を要求）。
pub fn confirm(prompt: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("対話できない環境です。実行するには --yes を指定してください");
    }

    print!("{} [y/N]: ", prompt.bold());
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// 値を1行で表示用に整形（文字列はそのまま）
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub const MASK: &str = "********";

/// スケジューラーの進捗を1行表示
pub fn print_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::Started { node, kind } => {
            println!("  {} {} ({})", "→".blue(), node.cyan(), kind.dimmed());
        }
        SchedulerEvent::Resolved { node, reused: true } => {
            println!("  {} {} (変更なし)", "=".dimmed(), node);
        }
        SchedulerEvent::Resolved { node, reused: false } => {
            println!("  {} {}", "✓".green(), node.cyan());
        }
        SchedulerEvent::Failed { node, error } => {
            println!("  {} {}: {}", "✗".red(), node.cyan(), error.to_string().red());
        }
        SchedulerEvent::Skipped {
            node,
            failed_dependency,
        } => {
            println!(
                "  {} {} ({} の失敗によりスキップ)",
                "-".yellow(),
                node,
                failed_dependency.yellow()
            );
        }
        SchedulerEvent::Interrupted { node } => {
            println!("  {} {} (中断)", "⏸".yellow(), node);
        }
    }
}

/// Ctrl-C でキャンセルされるトークン
pub fn cancel_on_ctrl_c() -> stackflow_cloud::CancellationToken {
    let cancel = stackflow_cloud::CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!(
                "{}",
                "中断しています... 実行中のプロビジョナーの完了を待っています".yellow()
            );
            trigger.cancel();
        }
    });
    cancel
}
