use colored::Colorize;
use sandflow_config::SandflowConfig;
use sandflow_container::{ContainerBucket, ContainerError};
use std::sync::Arc;

pub async fn handle(config: Arc<SandflowConfig>, name: &str) -> anyhow::Result<()> {
    println!("コンテナ {} を停止中...", name.cyan());

    let bucket = ContainerBucket::new(config.clone());
    let mut container = bucket.get(name).await?.ok_or_else(|| {
        ContainerError::NotFound {
            name: name.to_string(),
            path: config.container_path.clone(),
        }
    })?;
    container.stop().await?;

    println!(
        "{}",
        format!("✓ コンテナ {} を停止しました", name).green()
    );
    Ok(())
}
