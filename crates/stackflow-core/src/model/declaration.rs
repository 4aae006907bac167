//! リソース宣言

use super::projection::Projection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 他ノードの出力への参照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    /// 出力を生成するノード名
    pub source: String,
    /// 出力名（例: kube_configs）
    pub output: String,
    /// 出力値に適用する射影
    #[serde(default)]
    pub projection: Projection,
}

impl OutputRef {
    pub fn new(source: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            projection: Projection::identity(),
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }
}

/// 入力バインディング（入力名 ← 他ノードの出力）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBinding {
    /// このリソース側の入力名
    pub input: String,
    /// 参照する出力
    #[serde(flatten)]
    pub from: OutputRef,
}

/// リソース宣言
///
/// 名前・種別・desired-state ペイロードと、親/プロバイダー/入力の参照を持ちます。
/// ペイロードの中身はコアでは解釈せず、そのままプロビジョナーへ渡します。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// リソース名（グラフ内で一意）
    pub name: String,
    /// リソース種別（例: digitalocean:domain, kubernetes:namespace）
    pub kind: String,
    /// desired-state ペイロード
    #[serde(default)]
    pub payload: Value,
    /// 親リソース（ライフサイクルのスコープ）
    #[serde(default)]
    pub parent: Option<String>,
    /// このリソースをプロビジョニングするプロバイダーノード
    #[serde(default)]
    pub provider: Option<String>,
    /// 他ノードの出力に依存する入力
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
}

impl Declaration {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            payload: Value::Object(Default::default()),
            parent: None,
            provider: None,
            inputs: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>, from: OutputRef) -> Self {
        self.inputs.push(InputBinding {
            input: input.into(),
            from,
        });
        self
    }

    /// 状態ファイル等で使う識別キー (kind:name)
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }
}
