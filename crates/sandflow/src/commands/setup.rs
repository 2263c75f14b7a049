use colored::Colorize;
use sandflow_config::SandflowConfig;
use sandflow_container::{BASE, ContainerBucket};
use std::sync::Arc;

pub async fn handle(config: Arc<SandflowConfig>, force_delete: bool) -> anyhow::Result<()> {
    println!("{}", "baseコンテナをセットアップ中...".blue());
    println!(
        "  コンテナディレクトリ: {}",
        config.container_path.display().to_string().cyan()
    );
    println!("  イメージ: {}", config.base_image_url.cyan());

    let bucket = ContainerBucket::new(config);
    bucket.setup_base(BASE, force_delete).await?;

    println!();
    println!("{}", "✓ baseコンテナの準備ができました！".green());
    println!("{}", "次のコマンドでテストコンテナを作成できます:".bold());
    println!("  {} create <name>", "sand".cyan());
    Ok(())
}
