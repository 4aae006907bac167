//! リソースグラフ
//!
//! 宣言列から依存グラフ（DAG）を構築します。
//! 参照は宣言済みのノードにしか向けられないため、構築順がそのままトポロジカル順になります。
//! 構築は純粋な処理で、副作用はありません（plan/dry-run でも同じものを使います）。

use crate::error::{Result, StackError};
use crate::model::{Declaration, Export, Projection, Stack};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::debug;

/// ノードID（宣言順のインデックス）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 辺の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// 親子（ライフサイクル）関係
    Parent,
    /// プロバイダー（制御プレーン/認証情報）関係
    Provider,
    /// 出力→入力のデータ依存
    Data,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Parent => write!(f, "parent"),
            EdgeKind::Provider => write!(f, "provider"),
            EdgeKind::Data => write!(f, "data"),
        }
    }
}

/// 「from は to より先に存在しなければならない」を表す辺
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

/// 解決済みの入力バインディング
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBinding {
    pub input: String,
    pub source: NodeId,
    pub output: String,
    pub projection: Projection,
}

/// グラフ上のリソースノード
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: NodeId,
    pub name: String,
    pub kind: String,
    pub payload: Value,
    pub parent: Option<NodeId>,
    pub provider: Option<NodeId>,
    pub inputs: Vec<DataBinding>,
}

impl ResourceNode {
    /// 識別キー (kind:name)
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }
}

/// 解決済みのエクスポート
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBinding {
    pub name: String,
    pub source: NodeId,
    pub output: String,
    pub projection: Projection,
    pub secret: bool,
}

/// 構築済みのリソースグラフ
///
/// 評価中は読み取り専用です。
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<ResourceNode>,
    edges: Vec<Edge>,
    index: HashMap<String, NodeId>,
    dependencies: Vec<Vec<NodeId>>,
    dependents: Vec<Vec<NodeId>>,
    order: Vec<NodeId>,
    exports: Vec<ExportBinding>,
}

impl Graph {
    /// 宣言列からグラフを構築
    pub fn build(declarations: &[Declaration]) -> Result<Self> {
        let mut builder = GraphBuilder::new();
        for declaration in declarations {
            builder.declare(declaration.clone())?;
        }
        builder.finish()
    }

    /// Stack（宣言＋エクスポート）からグラフを構築
    #[tracing::instrument(skip(stack), fields(stack = %stack.name))]
    pub fn from_stack(stack: &Stack) -> Result<Self> {
        let mut builder = GraphBuilder::new();
        for declaration in &stack.declarations {
            builder.declare(declaration.clone())?;
        }
        for export in &stack.exports {
            builder.export(export.clone())?;
        }
        builder.finish()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &ResourceNode {
        &self.nodes[id.0]
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&ResourceNode> {
        self.id_of(name).map(|id| self.node(id))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// 直接の依存先（重複なし、ID順）
    pub fn dependencies(&self, id: NodeId) -> &[NodeId] {
        &self.dependencies[id.0]
    }

    /// 直接の依存元（重複なし、ID順）
    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        &self.dependents[id.0]
    }

    /// 依存を持たないノード
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|n| n.id)
            .filter(|id| self.dependencies[id.0].is_empty())
            .collect()
    }

    /// トポロジカル順
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    /// 推移的な依存元（自身は含まない）
    pub fn transitive_dependents(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue: VecDeque<NodeId> = self.dependents(id).iter().copied().collect();
        let mut result = Vec::new();

        while let Some(next) = queue.pop_front() {
            if seen[next.0] {
                continue;
            }
            seen[next.0] = true;
            result.push(next);
            queue.extend(self.dependents(next).iter().copied());
        }

        result.sort();
        result
    }

    /// 各ノードの深さ（最長の依存チェーン長）
    ///
    /// 同じ深さのノード同士は互いに依存しません。
    pub fn waves(&self) -> Vec<usize> {
        let mut depth = vec![0usize; self.nodes.len()];
        for id in &self.order {
            depth[id.0] = self.dependencies[id.0]
                .iter()
                .map(|dep| depth[dep.0] + 1)
                .max()
                .unwrap_or(0);
        }
        depth
    }

    pub fn exports(&self) -> &[ExportBinding] {
        &self.exports
    }

    pub fn export(&self, name: &str) -> Option<&ExportBinding> {
        self.exports.iter().find(|e| e.name == name)
    }
}

/// グラフビルダー
///
/// 宣言を1つずつ受け取り、参照を検証してノードと辺を追加します。
#[derive(Debug, Default)]
pub struct GraphBuilder {
    declarations: Vec<Declaration>,
    nodes: Vec<ResourceNode>,
    edges: Vec<Edge>,
    index: HashMap<String, NodeId>,
    exports: Vec<ExportBinding>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 宣言を追加
    ///
    /// 同じ名前・種別・内容の再宣言は既存ノードに畳み込まれます。
    pub fn declare(&mut self, declaration: Declaration) -> Result<NodeId> {
        if let Some(&existing_id) = self.index.get(&declaration.name) {
            let existing = &self.declarations[existing_id.0];
            if existing.kind != declaration.kind {
                return Err(StackError::DuplicateName {
                    name: declaration.name,
                    existing: existing.kind.clone(),
                    requested: declaration.kind,
                });
            }
            if *existing != declaration {
                return Err(StackError::ConflictingDeclaration(declaration.name));
            }
            debug!(node = %declaration.name, "Collapsed identical re-declaration");
            return Ok(existing_id);
        }

        let id = NodeId(self.nodes.len());
        let mut edges = Vec::new();

        let parent = match declaration.parent.as_deref() {
            Some(parent) => {
                let from = self.resolve(&declaration.name, "parent", parent)?;
                edges.push(Edge {
                    from,
                    to: id,
                    kind: EdgeKind::Parent,
                });
                Some(from)
            }
            None => None,
        };

        let provider = match declaration.provider.as_deref() {
            Some(provider) => {
                let from = self.resolve(&declaration.name, "provider", provider)?;
                edges.push(Edge {
                    from,
                    to: id,
                    kind: EdgeKind::Provider,
                });
                Some(from)
            }
            None => None,
        };

        let mut inputs = Vec::with_capacity(declaration.inputs.len());
        for binding in &declaration.inputs {
            let role = format!("入力 '{}'", binding.input);
            let source = self.resolve(&declaration.name, &role, &binding.from.source)?;
            edges.push(Edge {
                from: source,
                to: id,
                kind: EdgeKind::Data,
            });
            inputs.push(DataBinding {
                input: binding.input.clone(),
                source,
                output: binding.from.output.clone(),
                projection: binding.from.projection.clone(),
            });
        }

        debug!(
            node = %declaration.name,
            kind = %declaration.kind,
            edges = edges.len(),
            "Declared resource"
        );

        self.nodes.push(ResourceNode {
            id,
            name: declaration.name.clone(),
            kind: declaration.kind.clone(),
            payload: declaration.payload.clone(),
            parent,
            provider,
            inputs,
        });
        self.edges.extend(edges);
        self.index.insert(declaration.name.clone(), id);
        self.declarations.push(declaration);

        Ok(id)
    }

    /// エクスポートを追加
    pub fn export(&mut self, export: Export) -> Result<()> {
        let source =
            self.index
                .get(&export.from.source)
                .copied()
                .ok_or_else(|| StackError::UnresolvedExport {
                    export: export.name.clone(),
                    reference: export.from.source.clone(),
                })?;

        let binding = ExportBinding {
            name: export.name,
            source,
            output: export.from.output,
            projection: export.from.projection,
            secret: export.secret,
        };
        match self.exports.iter().find(|e| e.name == binding.name) {
            Some(existing) if *existing == binding => Ok(()),
            Some(_) => Err(StackError::ConflictingDeclaration(binding.name)),
            None => {
                self.exports.push(binding);
                Ok(())
            }
        }
    }

    /// グラフを確定
    ///
    /// 隣接リストを計算し、非巡回であることを検証します。
    pub fn finish(self) -> Result<Graph> {
        let count = self.nodes.len();
        let mut dependencies = vec![Vec::new(); count];
        let mut dependents = vec![Vec::new(); count];

        for edge in &self.edges {
            if edge.from >= edge.to {
                return Err(StackError::CycleDetected(format!(
                    "{} -> {} ({})",
                    self.nodes[edge.from.0].name, self.nodes[edge.to.0].name, edge.kind
                )));
            }
            dependencies[edge.to.0].push(edge.from);
            dependents[edge.from.0].push(edge.to);
        }
        for list in dependencies.iter_mut().chain(dependents.iter_mut()) {
            list.sort();
            list.dedup();
        }

        let order = kahn_order(&dependencies, &dependents).ok_or_else(|| {
            StackError::CycleDetected("トポロジカルソートが全ノードを訪問できませんでした".to_string())
        })?;

        Ok(Graph {
            nodes: self.nodes,
            edges: self.edges,
            index: self.index,
            dependencies,
            dependents,
            order,
            exports: self.exports,
        })
    }

    fn resolve(&self, declaration: &str, role: &str, reference: &str) -> Result<NodeId> {
        self.index
            .get(reference)
            .copied()
            .ok_or_else(|| StackError::UnresolvedReference {
                declaration: declaration.to_string(),
                role: role.to_string(),
                reference: reference.to_string(),
            })
    }
}

/// Kahn法によるトポロジカルソート（循環があれば None）
fn kahn_order(dependencies: &[Vec<NodeId>], dependents: &[Vec<NodeId>]) -> Option<Vec<NodeId>> {
    let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut queue: VecDeque<NodeId> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(i, _)| NodeId(i))
        .collect();
    let mut order = Vec::with_capacity(dependencies.len());

    while let Some(id) = queue.pop_front() {
        order.push(id);
        for dependent in &dependents[id.0] {
            remaining[dependent.0] -= 1;
            if remaining[dependent.0] == 0 {
                queue.push_back(*dependent);
            }
        }
    }

    (order.len() == dependencies.len()).then_some(order)
}
