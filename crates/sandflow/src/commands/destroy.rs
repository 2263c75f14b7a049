use colored::Colorize;
use sandflow_config::SandflowConfig;
use sandflow_container::ContainerBucket;
use std::sync::Arc;

pub async fn handle(config: Arc<SandflowConfig>) -> anyhow::Result<()> {
    println!("{}", "全コンテナを削除中...".blue());

    let bucket = ContainerBucket::new(config);
    let count = bucket.get_all().await?.len();
    bucket.destroy_all().await?;

    println!(
        "{}",
        format!("✓ {count} 個のコンテナを削除しました").green()
    );
    Ok(())
}
