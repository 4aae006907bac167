//! Stack定義

use super::declaration::{Declaration, OutputRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// エクスポート（外部に公開する出力）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    /// エクスポート名（例: kubeconfig）
    pub name: String,
    /// 参照する出力
    #[serde(flatten)]
    pub from: OutputRef,
    /// 表示時にマスクするか
    #[serde(default)]
    pub secret: bool,
}

impl Export {
    pub fn new(name: impl Into<String>, from: OutputRef) -> Self {
        Self {
            name: name.into(),
            from,
            secret: false,
        }
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// Stack - 宣言の集合
///
/// 宣言は記述順に保持されます。順序はグラフ構築時の参照解決に使われます。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stack {
    /// Stack名（プロジェクト名）
    pub name: String,
    /// リソース宣言（記述順）
    pub declarations: Vec<Declaration>,
    /// エクスポート
    #[serde(default)]
    pub exports: Vec<Export>,
    /// ファイル内で定義された環境名
    #[serde(default)]
    pub environments: Vec<String>,
    /// プロジェクト共通の変数
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl Stack {
    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name == name)
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }
}
