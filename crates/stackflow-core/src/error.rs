use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("テンプレートエラー: {file}\n理由: {message}")]
    TemplateError {
        file: PathBuf,
        line: Option<usize>,
        message: String,
    },

    #[error("テンプレート展開エラー: {0}")]
    TemplateRenderError(String),

    #[error("ファイル発見エラー: {path}\n理由: {message}")]
    DiscoveryError { path: PathBuf, message: String },

    #[error(
        "プロジェクトルートが見つかりません\n探索開始位置: {0}\nヒント: stack.kdl ファイルを含むディレクトリで実行してください"
    )]
    ProjectRootNotFound(PathBuf),

    /// 宣言が未宣言のノードを参照している
    #[error("リソース '{declaration}' の {role} が未宣言のノード '{reference}' を参照しています")]
    UnresolvedReference {
        declaration: String,
        role: String,
        reference: String,
    },

    /// グラフに循環が存在する（Builderの不変条件違反）
    #[error("循環依存が検出されました: {0}")]
    CycleDetected(String),

    #[error("リソース名 '{name}' は kind '{existing}' として宣言済みです（'{requested}' は使用できません）")]
    DuplicateName {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("'{0}' が異なる内容で再宣言されています")]
    ConflictingDeclaration(String),

    #[error("エクスポート '{export}' が未宣言のノード '{reference}' を参照しています")]
    UnresolvedExport { export: String, reference: String },

    #[error("射影パスが不正です: {0}")]
    InvalidProjection(String),
}

pub type Result<T> = std::result::Result<T, StackError>;
