use colored::Colorize;
use sandflow_config::SandflowConfig;
use sandflow_container::ContainerBucket;
use std::sync::Arc;

pub async fn handle(
    config: Arc<SandflowConfig>,
    name: &str,
    no_snapshot: bool,
) -> anyhow::Result<()> {
    println!("コンテナ {} を作成中...", name.cyan());

    let bucket = ContainerBucket::new(config);
    let container = bucket.create_from_base(name, no_snapshot, false).await?;

    println!(
        "{}",
        format!("✓ コンテナ {} を作成しました！", container.name()).green()
    );
    Ok(())
}
