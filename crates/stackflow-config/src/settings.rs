//! 実行設定
//!
//! `stackflow.yaml` の内容。Scheduler と CLI へ明示的に渡されます。

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// デフォルトの状態ディレクトリ
pub const DEFAULT_STATE_DIR: &str = ".stackflow";

/// 実行設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// 対象環境名（CLI引数・STACKFLOW_ENV が優先）
    pub environment: Option<String>,
    /// 同時に実行するプロビジョナー呼び出しの上限（0 = 無制限）
    pub parallelism: usize,
    /// state.json / lock.json の置き場所（プロジェクトルートからの相対パス可）
    pub state_dir: PathBuf,
    /// kind プレフィックス → 外部コマンド
    pub provisioners: BTreeMap<String, ProvisionerSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: None,
            parallelism: 0,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            provisioners: BTreeMap::new(),
        }
    }
}

/// 外部コマンドによるプロビジョナー設定
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionerSettings {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// タイムアウト（秒）
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// YAML文字列から読み込み
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self> {
        // 空ファイルはデフォルト扱い
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// ファイルから読み込み
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, path)
    }

    fn validate(&self) -> Result<()> {
        for (prefix, provisioner) in &self.provisioners {
            if prefix.is_empty() {
                return Err(ConfigError::Invalid(
                    "provisioners のキー（kind プレフィックス）が空です".to_string(),
                ));
            }
            if provisioner.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "provisioners.\"{prefix}\" に command がありません"
                )));
            }
        }
        Ok(())
    }

    /// プロジェクトルートを基準に状態ディレクトリを解決
    pub fn state_dir_in(&self, project_root: &Path) -> PathBuf {
        if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            project_root.join(&self.state_dir)
        }
    }

    /// 環境名を決定（明示指定 > 設定ファイル）
    pub fn resolve_environment(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.environment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKSHOP: &str = r#"
environment: dev
parallelism: 4
state_dir: .state
provisioners:
  "digitalocean:":
    command: ./provisioners/digitalocean.sh
    args: ["--region", "nyc1"]
    env:
      DO_PROJECT: workshop
  "kubernetes:":
    command: ./provisioners/kubernetes.sh
    timeout_secs: 600
"#;

    fn parse(content: &str) -> Result<Settings> {
        Settings::from_yaml(content, Path::new("stackflow.yaml"))
    }

    #[test]
    fn test_parse_full_settings() {
        let settings = parse(WORKSHOP).unwrap();
        assert_eq!(settings.environment.as_deref(), Some("dev"));
        assert_eq!(settings.parallelism, 4);
        assert_eq!(settings.state_dir, PathBuf::from(".state"));
        assert_eq!(settings.provisioners.len(), 2);

        let digitalocean = &settings.provisioners["digitalocean:"];
        assert_eq!(digitalocean.command, "./provisioners/digitalocean.sh");
        assert_eq!(digitalocean.args, vec!["--region", "nyc1"]);
        assert_eq!(digitalocean.env["DO_PROJECT"], "workshop");
        assert_eq!(digitalocean.timeout_secs, None);

        let kubernetes = &settings.provisioners["kubernetes:"];
        assert!(kubernetes.args.is_empty());
        assert_eq!(kubernetes.timeout_secs, Some(600));
    }

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings = parse("parallelism: 2").unwrap();
        assert_eq!(settings.parallelism, 2);
        assert_eq!(settings.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
        assert!(settings.environment.is_none());
        assert!(settings.provisioners.is_empty());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(parse("").unwrap(), Settings::default());
        assert_eq!(parse("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = parse("paralelism: 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_command_rejected() {
        let err = parse("provisioners:\n  \"aws:\":\n    command: \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_state_dir_in() {
        let settings = Settings::default();
        assert_eq!(
            settings.state_dir_in(Path::new("/srv/stack")),
            PathBuf::from("/srv/stack/.stackflow")
        );

        let absolute = Settings {
            state_dir: PathBuf::from("/var/lib/stackflow"),
            ..Default::default()
        };
        assert_eq!(
            absolute.state_dir_in(Path::new("/srv/stack")),
            PathBuf::from("/var/lib/stackflow")
        );
    }

    #[test]
    fn test_resolve_environment() {
        let settings = parse("environment: dev").unwrap();
        assert_eq!(settings.resolve_environment(Some("prod")).as_deref(), Some("prod"));
        assert_eq!(settings.resolve_environment(None).as_deref(), Some("dev"));
        assert_eq!(Settings::default().resolve_environment(None), None);
    }
}
