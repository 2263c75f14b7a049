use colored::Colorize;
use sandflow_config::SandflowConfig;
use sandflow_container::{ContainerBucket, ContainerError};
use std::sync::Arc;

pub async fn handle(
    config: Arc<SandflowConfig>,
    name: &str,
    no_wait: bool,
) -> anyhow::Result<()> {
    println!("コンテナ {} を起動中...", name.cyan());

    let bucket = ContainerBucket::new(config.clone());
    let mut container = bucket.get(name).await?.ok_or_else(|| {
        ContainerError::NotFound {
            name: name.to_string(),
            path: config.container_path.clone(),
        }
    })?;
    container.start(!no_wait).await?;

    println!(
        "{}",
        format!("✓ コンテナ {} が起動しました！", name).green()
    );
    Ok(())
}
