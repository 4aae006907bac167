pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{ProvisionerSettings, Settings};

use std::path::{Path, PathBuf};

/// 設定ファイル名（優先順）
pub const SETTINGS_FILES: [&str; 2] = ["stackflow.local.yaml", "stackflow.yaml"];

/// プロジェクトの設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 STACKFLOW_CONFIG_PATH (直接パス指定)
/// 2. プロジェクトルート: stackflow.local.yaml, stackflow.yaml
/// 3. <root>/.stackflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/stackflow/config.yaml (グローバル設定)
///
/// どれも見つからなければ `None`（デフォルト設定を使用）
pub fn find_settings_file(project_root: &Path) -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("STACKFLOW_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::ConfigPathNotFound(path));
        }
        return Ok(Some(path));
    }

    // 2. プロジェクトルート / 3. .stackflow/
    for dir in [project_root.to_path_buf(), project_root.join(".stackflow")] {
        for filename in &SETTINGS_FILES {
            let path = dir.join(filename);
            if path.is_file() {
                return Ok(Some(path));
            }
        }
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stackflow").join("config.yaml");
        if global_config.is_file() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// 設定を検索して読み込む（見つからなければデフォルト）
pub fn load_settings(project_root: &Path) -> Result<Settings> {
    match find_settings_file(project_root)? {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading settings");
            Settings::from_file(&path)
        }
        None => {
            tracing::debug!("No settings file found, using defaults");
            Ok(Settings::default())
        }
    }
}
