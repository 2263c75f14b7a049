pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sandflowの設定
///
/// プロセス起動時に一度だけ構築し、`Arc` で各コンポーネントに渡す。
/// グローバル変数としては保持しない（テストで別の設定を注入できるように）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandflowConfig {
    /// コンテナを格納するディレクトリ
    pub container_path: PathBuf,

    /// baseコンテナイメージ (tar.xz) のダウンロードURL
    pub base_image_url: String,

    /// lxcコマンドをsudo経由で実行するか
    pub use_sudo: bool,

    /// snapshot clone (overlayfs/aufs) をサポートするホストか
    ///
    /// サポートしないホストでは常に full copy cloneになる。
    pub support_snapshot_clone: bool,

    /// lxc-ls がパス指定で絞り込めないホスト向けの一覧モード
    ///
    /// このモードでは container_path を直接走査し、lxc-ls --active の
    /// 結果とつき合わせて状態を判定する。
    pub constrained_listing: bool,

    /// 仮想マシン上で動作しているか (clone時のbacking store選択に影響)
    pub vm_host: bool,

    /// コンテナ起動後、ネットワーク疎通を待つ最大秒数
    pub network_timeout_secs: u64,

    /// ネットワーク疎通チェックの間隔 (ミリ秒)
    ///
    /// 未指定時は通常ホストで100ms、constrainedホストで2000ms。
    pub network_check_interval_ms: Option<u64>,

    /// base イメージ取得のリトライ上限 (秒)
    pub fetch_retry_budget_secs: u64,

    /// base イメージ取得のリトライ間隔 (秒)
    pub fetch_retry_interval_secs: u64,

    /// ホスト側のharnessインストールディレクトリ
    ///
    /// site-packages / tools をここからコンテナにbind mountする。
    pub harness_host_dir: PathBuf,

    /// コンテナ起動後にコンテナ内で実行するコマンド
    pub post_start_commands: Vec<String>,
}

impl Default for SandflowConfig {
    fn default() -> Self {
        Self {
            container_path: PathBuf::from("/var/lib/sandflow/containers"),
            base_image_url: "https://images.chronista.club/sandflow/base.tar.xz".to_string(),
            use_sudo: true,
            support_snapshot_clone: true,
            constrained_listing: false,
            vm_host: false,
            network_timeout_secs: 300,
            network_check_interval_ms: None,
            fetch_retry_budget_secs: 300,
            fetch_retry_interval_secs: 10,
            harness_host_dir: PathBuf::from("/usr/local/harness"),
            post_start_commands: Vec::new(),
        }
    }
}

impl SandflowConfig {
    /// ネットワーク疎通チェックの間隔
    pub fn network_check_interval(&self) -> Duration {
        let ms = self.network_check_interval_ms.unwrap_or(if self.constrained_listing {
            2000
        } else {
            100
        });
        Duration::from_millis(ms)
    }

    /// ネットワーク疎通待ちのタイムアウト
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    /// baseイメージ取得リトライの上限
    pub fn fetch_retry_budget(&self) -> Duration {
        Duration::from_secs(self.fetch_retry_budget_secs)
    }

    /// baseイメージ取得リトライの間隔
    pub fn fetch_retry_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_retry_interval_secs)
    }

    /// YAMLファイルから設定を読み込む
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SandflowConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルを探索して読み込む。見つからなければデフォルト設定。
    ///
    /// 環境変数による上書き (SANDFLOW_*) は最後に適用される。
    pub fn load() -> Result<Self> {
        let mut config = match find_config_file() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// SANDFLOW_* 環境変数で設定を上書き
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SANDFLOW_CONTAINER_PATH") {
            self.container_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("SANDFLOW_BASE_IMAGE_URL") {
            self.base_image_url = url;
        }
        if let Ok(value) = std::env::var("SANDFLOW_USE_SUDO") {
            self.use_sudo = parse_bool("SANDFLOW_USE_SUDO", &value)?;
        }
        if let Ok(value) = std::env::var("SANDFLOW_SNAPSHOT_CLONE") {
            self.support_snapshot_clone = parse_bool("SANDFLOW_SNAPSHOT_CLONE", &value)?;
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Sandflowの設定ディレクトリを取得 (~/.config/sandflow)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("sandflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 SANDFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: sandflow.yaml, .sandflow.yaml
/// 3. ~/.config/sandflow/sandflow.yaml (グローバル設定)
pub fn find_config_file() -> Option<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("SANDFLOW_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. カレントディレクトリで検索
    if let Ok(current_dir) = std::env::current_dir() {
        for filename in ["sandflow.yaml", ".sandflow.yaml"] {
            let path = current_dir.join(filename);
            if path.exists() {
                return Some(path);
            }
        }
    }

    // 3. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("sandflow").join("sandflow.yaml");
        if global_config.exists() {
            return Some(global_config);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = SandflowConfig::default();
        assert_eq!(
            config.container_path,
            PathBuf::from("/var/lib/sandflow/containers")
        );
        assert!(config.use_sudo);
        assert!(config.support_snapshot_clone);
        assert!(!config.constrained_listing);
        assert_eq!(config.network_timeout_secs, 300);
    }

    #[test]
    fn test_network_check_interval_profiles() {
        let mut config = SandflowConfig::default();
        assert_eq!(config.network_check_interval(), Duration::from_millis(100));

        // constrainedホストではネットワーク起動が遅いため間隔を広げる
        config.constrained_listing = true;
        assert_eq!(config.network_check_interval(), Duration::from_millis(2000));

        config.network_check_interval_ms = Some(500);
        assert_eq!(config.network_check_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("sandflow.yaml");
        fs::write(
            &config_path,
            "container_path: /tmp/containers\nsupport_snapshot_clone: false\n",
        )
        .unwrap();

        let config = SandflowConfig::from_file(&config_path).unwrap();
        assert_eq!(config.container_path, PathBuf::from("/tmp/containers"));
        assert!(!config.support_snapshot_clone);
        // 未指定のフィールドはデフォルト値
        assert_eq!(config.network_timeout_secs, 300);
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("sandflow.yaml");
        fs::write(&config_path, "container_path: [not, a, path").unwrap();

        let result = SandflowConfig::from_file(&config_path);
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "use_sudo: false\n").unwrap();

        unsafe {
            std::env::set_var("SANDFLOW_CONFIG_PATH", config_path.to_str().unwrap());
        }

        let result = find_config_file();
        assert_eq!(result, Some(config_path));

        unsafe {
            std::env::remove_var("SANDFLOW_CONFIG_PATH");
        }
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("sandflow.yaml"), "use_sudo: false\n").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();
        assert!(result.is_some());
        assert!(result.unwrap().ends_with("sandflow.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var("SANDFLOW_CONTAINER_PATH", "/tmp/override");
            std::env::set_var("SANDFLOW_SNAPSHOT_CLONE", "false");
        }

        let mut config = SandflowConfig::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.container_path, PathBuf::from("/tmp/override"));
        assert!(!config.support_snapshot_clone);

        unsafe {
            std::env::remove_var("SANDFLOW_CONTAINER_PATH");
            std::env::remove_var("SANDFLOW_SNAPSHOT_CLONE");
        }
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_bool() {
        unsafe {
            std::env::set_var("SANDFLOW_USE_SUDO", "maybe");
        }

        let mut config = SandflowConfig::default();
        let result = config.apply_env_overrides();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { .. })
        ));

        unsafe {
            std::env::remove_var("SANDFLOW_USE_SUDO");
        }
    }
}
