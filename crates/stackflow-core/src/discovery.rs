//! ファイル自動発見
//!
//! 規約ベースのディレクトリ構造から stack の KDL ファイルを発見します。
//!
//! ```text
//! project/
//! ├── stack.kdl              # ルート（または .stackflow/stack.kdl）
//! ├── resources/**/*.kdl     # リソース宣言の分割ファイル
//! ├── variables/**/*.kdl     # 変数定義
//! ├── stack.<env>.kdl        # 環境固有オーバーライド
//! ├── stack.local.kdl        # ローカルオーバーライド
//! └── .env
//! ```

use crate::error::{Result, StackError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const ROOT_FILE: &str = "stack.kdl";
pub const STATE_DIR: &str = ".stackflow";

/// 発見されたファイル群
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    /// ルートファイル (stack.kdl)
    pub root: Option<PathBuf>,
    /// リソース定義ファイル (resources/**/*.kdl)
    pub resources: Vec<PathBuf>,
    /// 変数定義ファイル (variables/**/*.kdl)
    pub variables: Vec<PathBuf>,
    /// 環境固有オーバーライド (stack.<env>.kdl)
    pub environment_override: Option<PathBuf>,
    /// ローカルオーバーライド (stack.local.kdl)
    pub local_override: Option<PathBuf>,
    /// 環境変数ファイル (.env)
    pub env_file: Option<PathBuf>,
}

impl DiscoveredFiles {
    /// 読み込み順（後のファイルほど優先）に並べたKDLファイル
    pub fn kdl_files(&self) -> Vec<&Path> {
        self.variables
            .iter()
            .map(PathBuf::as_path)
            .chain(self.root.as_deref())
            .chain(self.resources.iter().map(PathBuf::as_path))
            .chain(self.environment_override.as_deref())
            .chain(self.local_override.as_deref())
            .collect()
    }
}

/// プロジェクトルートを検出
///
/// 1. 環境変数 STACKFLOW_PROJECT_ROOT
/// 2. カレントディレクトリから上へ stack.kdl / .stackflow/stack.kdl を探す
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("STACKFLOW_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking STACKFLOW_PROJECT_ROOT");
        if has_root_file(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
    }

    find_project_root_from(&std::env::current_dir()?)
}

/// 指定ディレクトリから上へプロジェクトルートを探す
pub fn find_project_root_from(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        if has_root_file(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(StackError::ProjectRootNotFound(start_dir.to_path_buf()))
}

fn has_root_file(dir: &Path) -> bool {
    dir.join(ROOT_FILE).exists() || dir.join(STATE_DIR).join(ROOT_FILE).exists()
}

/// `name` をプロジェクト直下、なければ .stackflow/ 内で探す
fn locate(project_root: &Path, name: &str) -> Option<PathBuf> {
    [project_root.join(name), project_root.join(STATE_DIR).join(name)]
        .into_iter()
        .find(|p| p.exists())
}

/// プロジェクトルートからファイルを発見
///
/// `environment` が指定されている場合は stack.<env>.kdl も対象になります。
#[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn discover_files(project_root: &Path, environment: Option<&str>) -> Result<DiscoveredFiles> {
    let mut discovered = DiscoveredFiles {
        root: locate(project_root, ROOT_FILE),
        local_override: locate(project_root, "stack.local.kdl"),
        env_file: locate(project_root, ".env"),
        ..Default::default()
    };

    if let Some(env) = environment {
        discovered.environment_override = locate(project_root, &format!("stack.{env}.kdl"));
    }

    let resources_dir = project_root.join("resources");
    if resources_dir.is_dir() {
        discovered.resources = discover_kdl_files(&resources_dir)?;
        info!(resource_file_count = discovered.resources.len(), "Discovered resource files");
    }

    let variables_dir = project_root.join("variables");
    if variables_dir.is_dir() {
        discovered.variables = discover_kdl_files(&variables_dir)?;
        info!(variable_file_count = discovered.variables.len(), "Discovered variable files");
    }

    debug!(?discovered, "File discovery finished");
    Ok(discovered)
}

/// ディレクトリ配下の .kdl ファイルを再帰的に発見（パス順）
fn discover_kdl_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();
    visit_dir(dir, &mut files, &mut visited)?;
    files.sort();
    Ok(files)
}

fn visit_dir(dir: &Path, files: &mut Vec<PathBuf>, visited: &mut HashSet<PathBuf>) -> Result<()> {
    let discovery_error = |message: String| StackError::DiscoveryError {
        path: dir.to_path_buf(),
        message,
    };

    let canonical = dir
        .canonicalize()
        .map_err(|e| discovery_error(format!("パスの正規化に失敗: {e}")))?;
    // シンボリックリンクのループ
    if !visited.insert(canonical.clone()) {
        warn!(dir = %canonical.display(), "Symlink loop detected, skipping");
        return Ok(());
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| discovery_error(format!("ディレクトリの読み込みに失敗: {e}")))?;
    for entry in entries {
        let path = entry
            .map_err(|e| discovery_error(format!("ディレクトリエントリの読み込みに失敗: {e}")))?
            .path();
        if path.is_dir() {
            visit_dir(&path, files, visited)?;
        } else if path.extension().and_then(|s| s.to_str()) == Some("kdl") {
            files.push(path);
        }
    }
    Ok(())
}
