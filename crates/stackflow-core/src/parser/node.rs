//! KDLノードの共通ヘルパー

use crate::error::{Result, StackError};
use crate::template::kdl_value_to_json;
use kdl::{KdlDocument, KdlNode, KdlValue};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// 位置引数を列挙
pub(crate) fn arguments(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

/// 最初の位置引数（文字列）
pub(crate) fn first_string(node: &KdlNode) -> Option<&str> {
    arguments(node).next().and_then(|v| v.as_string())
}

/// プロパティ値（同名があれば後勝ち）
pub(crate) fn property<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .rev()
        .find(|e| e.name().map(|n| n.value()) == Some(key))
        .map(|e| e.value())
}

pub(crate) fn string_property<'a>(node: &'a KdlNode, key: &str) -> Option<&'a str> {
    property(node, key).and_then(|v| v.as_string())
}

pub(crate) fn required_string_property(node: &KdlNode, key: &str, context: &str) -> Result<String> {
    string_property(node, key)
        .map(str::to_string)
        .ok_or_else(|| StackError::InvalidConfig(format!("{context} には {key}=\"...\" が必要です")))
}

/// `key "value"` 形式の子ノードを文字列マップに変換
pub(crate) fn string_children(node: &KdlNode) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value().to_string();
            let value = match arguments(child).next() {
                Some(KdlValue::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            map.insert(key, value);
        }
    }
    map
}

/// KDLノードをペイロード（JSON）に変換
///
/// - 引数1つ → スカラー、複数 → 配列
/// - プロパティ・子ノード → オブジェクト
/// - 子ノードが全て `-` → 配列
pub fn node_to_payload(node: &KdlNode) -> Value {
    let mut args: Vec<Value> = arguments(node).map(kdl_value_to_json).collect();
    let props: Vec<(String, Value)> = node
        .entries()
        .iter()
        .filter_map(|e| {
            e.name()
                .map(|n| (n.value().to_string(), kdl_value_to_json(e.value())))
        })
        .collect();

    if props.is_empty() && node.children().is_none() {
        return match args.len() {
            0 => Value::Null,
            1 => args.remove(0),
            _ => Value::Array(args),
        };
    }

    let mut object = Map::new();
    if !args.is_empty() {
        object.insert("args".to_string(), Value::Array(args));
    }
    object.extend(props);
    if let Some(children) = node.children() {
        match document_to_payload(children, &[]) {
            Value::Object(fields) => object.extend(fields),
            items => {
                object.insert("items".to_string(), items);
            }
        }
    }
    Value::Object(object)
}

/// ブロック内の子ノードをペイロードに変換（`skip` の名前は除外）
pub(crate) fn document_to_payload(doc: &KdlDocument, skip: &[&str]) -> Value {
    let nodes: Vec<&KdlNode> = doc
        .nodes()
        .iter()
        .filter(|n| !skip.contains(&n.name().value()))
        .collect();

    if !nodes.is_empty() && nodes.iter().all(|n| n.name().value() == "-") {
        return Value::Array(nodes.into_iter().map(node_to_payload).collect());
    }

    let mut object = Map::new();
    let mut repeated = HashSet::new();
    for child in nodes {
        let key = child.name().value().to_string();
        let value = node_to_payload(child);
        match object.get_mut(&key) {
            None => {
                object.insert(key, value);
            }
            Some(existing) => {
                // 同名ノードの繰り返しは配列にまとめる
                if repeated.insert(key) {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                } else if let Value::Array(items) = existing {
                    items.push(value);
                }
            }
        }
    }
    Value::Object(object)
}
