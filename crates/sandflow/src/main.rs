mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sand")]
#[command(about = "使い捨てのLXCサンドボックスを、1コマンドで。", long_about = None)]
struct Cli {
    /// コンテナディレクトリ (設定ファイルより優先)
    #[arg(short = 'p', long, global = true, env = "SANDFLOW_CONTAINER_PATH")]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// baseコンテナをダウンロードしてセットアップ
    Setup {
        /// 既存のbaseコンテナを削除して再セットアップ（⚠️ 全テストコンテナも削除）
        #[arg(short, long)]
        force_delete: bool,
    },
    /// テストコンテナをbaseからclone
    Create {
        /// 作成するコンテナ名
        name: String,
        /// snapshot cloneを使わずfull copyでcloneする
        #[arg(long)]
        no_snapshot: bool,
    },
    /// コンテナを起動
    Start {
        /// コンテナ名
        name: String,
        /// ネットワーク疎通を待たない
        #[arg(long)]
        no_wait: bool,
    },
    /// コンテナを停止
    Stop {
        /// コンテナ名
        name: String,
    },
    /// コンテナディレクトリ内の全コンテナを削除
    Destroy {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// コンテナの一覧を表示
    Ps,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("sandflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = sandflow_config::SandflowConfig::load()?;
    if let Some(path) = cli.path {
        config.container_path = path;
    }
    tracing::debug!("container_path = {}", config.container_path.display());
    let config = Arc::new(config);

    match cli.command {
        Commands::Setup { force_delete } => {
            commands::setup::handle(config, force_delete).await?;
        }
        Commands::Create { name, no_snapshot } => {
            commands::create::handle(config, &name, no_snapshot).await?;
        }
        Commands::Start { name, no_wait } => {
            commands::start::handle(config, &name, no_wait).await?;
        }
        Commands::Stop { name } => {
            commands::stop::handle(config, &name).await?;
        }
        Commands::Destroy { yes } => {
            if !yes {
                eprintln!(
                    "{} 全コンテナを削除します。実行するには {} を付けてください。",
                    "警告:".yellow().bold(),
                    "--yes".cyan()
                );
                std::process::exit(1);
            }
            commands::destroy::handle(config).await?;
        }
        Commands::Ps => {
            commands::ps::handle(config).await?;
        }
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
