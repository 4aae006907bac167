mod commands;
mod project;
mod utils;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "宣言したリソースグラフを、依存順にプロビジョニングする。", long_about = None)]
struct Cli {
    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// 環境名の指定（位置引数 / -e / STACKFLOW_ENV）
#[derive(Args, Debug, Clone)]
struct EnvArgs {
    /// 環境名 (dev, stg, prod)
    environment: Option<String>,
    /// 環境名 (-e/--env フラグ、STACKFLOW_ENV 環境変数)
    #[arg(
        short = 'e',
        long = "env",
        env = "STACKFLOW_ENV",
        conflicts_with = "environment",
        hide = true
    )]
    env_flag: Option<String>,
}

impl EnvArgs {
    fn resolve(self) -> Option<String> {
        self.environment.or(self.env_flag)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 宣言を読み込み、グラフを検証
    Validate {
        #[command(flatten)]
        env: EnvArgs,
    },
    /// 実行計画を表示（副作用なし）
    Plan {
        #[command(flatten)]
        env: EnvArgs,
    },
    /// グラフをプロビジョニング
    Up {
        #[command(flatten)]
        env: EnvArgs,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// エクスポートを表示
    Outputs {
        #[command(flatten)]
        env: EnvArgs,
        /// secret なエクスポートもマスクせずに表示
        #[arg(long)]
        show_secrets: bool,
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// プロビジョニング済みのリソースを依存の逆順に削除
    Destroy {
        #[command(flatten)]
        env: EnvArgs,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// ノードと辺を表示
    Graph {
        #[command(flatten)]
        env: EnvArgs,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrへ（RUST_LOG が優先）
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { env } => commands::validate::handle(env.resolve()).await,
        Commands::Plan { env } => commands::plan::handle(env.resolve()).await,
        Commands::Up { env, yes } => commands::up::handle(env.resolve(), yes).await,
        Commands::Outputs {
            env,
            show_secrets,
            json,
        } => commands::outputs::handle(env.resolve(), show_secrets, json).await,
        Commands::Destroy { env, yes } => commands::destroy::handle(env.resolve(), yes).await,
        Commands::Graph { env } => commands::graph::handle(env.resolve()).await,
        Commands::Version => {
            println!("stackflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
