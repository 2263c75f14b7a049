use colored::Colorize;
use sandflow_config::SandflowConfig;
use sandflow_container::{ContainerBucket, ContainerState};
use std::sync::Arc;

pub async fn handle(config: Arc<SandflowConfig>) -> anyhow::Result<()> {
    println!("{}", "コンテナ一覧を取得中...".blue());
    println!(
        "  コンテナディレクトリ: {}",
        config.container_path.display().to_string().cyan()
    );

    let bucket = ContainerBucket::new(config);
    let mut containers: Vec<_> = bucket.get_all().await?.into_values().collect();
    containers.sort_by(|a, b| a.name().cmp(b.name()));

    println!();
    if containers.is_empty() {
        println!("{}", "コンテナはありません".dimmed());
        return Ok(());
    }

    println!("{}", format!("{:<24} {:<12}", "NAME", "STATE").bold());
    println!("{}", "─".repeat(36).dimmed());
    for container in &containers {
        let state = container
            .state()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let state_colored = if container.state() == Some(ContainerState::Running) {
            state.green()
        } else {
            state.red()
        };
        println!("{:<24} {:<12}", container.name().cyan(), state_colored);
    }

    Ok(())
}
