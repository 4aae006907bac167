//! 出力値の射影
//!
//! 解決済みの出力値から一部（リストの要素・オブジェクトのフィールド）を取り出します。
//! パス表記: `[0].raw_config`, `items[2].name`

use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// 射影の1ステップ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionStep {
    /// リストのインデックス指定
    Index(usize),
    /// オブジェクトのフィールド指定
    Field(String),
}

/// 射影の適用失敗
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("index {index} is out of range (len {len}) at '{path}'")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("field '{field}' is missing at '{path}'")]
    MissingField { path: String, field: String },

    #[error("expected a list at '{path}', found {found}")]
    NotAList { path: String, found: &'static str },

    #[error("expected an object at '{path}', found {found}")]
    NotAnObject { path: String, found: &'static str },
}

/// 出力値に対する射影（空なら値全体）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    steps: Vec<ProjectionStep>,
}

impl Projection {
    /// 値全体を返す射影
    pub fn identity() -> Self {
        Self::default()
    }

    /// パス文字列をパース
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        let mut steps = Vec::new();
        if path.is_empty() {
            return Ok(Self { steps });
        }

        let invalid = |reason: &str| StackError::InvalidProjection(format!("'{path}': {reason}"));

        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(invalid("空のセグメントがあります"));
            }

            let (field, mut rest) = match segment.find('[') {
                Some(pos) => segment.split_at(pos),
                None => (segment, ""),
            };

            if !field.is_empty() {
                if field.contains(']') {
                    return Err(invalid("対応する '[' のない ']' があります"));
                }
                steps.push(ProjectionStep::Field(field.to_string()));
            }

            while !rest.is_empty() {
                if !rest.starts_with('[') {
                    return Err(invalid("インデックスの後に不正な文字があります"));
                }
                let close = rest
                    .find(']')
                    .ok_or_else(|| invalid("']' が閉じられていません"))?;
                let index = rest[1..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid("インデックスは非負整数で指定してください"))?;
                steps.push(ProjectionStep::Index(index));
                rest = &rest[close + 1..];
            }
        }

        Ok(Self { steps })
    }

    /// インデックス指定を追加
    pub fn index(mut self, index: usize) -> Self {
        self.steps.push(ProjectionStep::Index(index));
        self
    }

    /// フィールド指定を追加
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.steps.push(ProjectionStep::Field(name.into()));
        self
    }

    pub fn steps(&self) -> &[ProjectionStep] {
        &self.steps
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// 解決済みの値に射影を適用
    pub fn apply(&self, value: &Value) -> std::result::Result<Value, ProjectionError> {
        let mut current = value;
        let mut walked = Projection::identity();

        for step in &self.steps {
            current = match step {
                ProjectionStep::Index(index) => {
                    let list = current.as_array().ok_or_else(|| ProjectionError::NotAList {
                        path: walked.to_string(),
                        found: type_name(current),
                    })?;
                    list.get(*index)
                        .ok_or_else(|| ProjectionError::IndexOutOfRange {
                            path: walked.to_string(),
                            index: *index,
                            len: list.len(),
                        })?
                }
                ProjectionStep::Field(field) => {
                    let object =
                        current
                            .as_object()
                            .ok_or_else(|| ProjectionError::NotAnObject {
                                path: walked.to_string(),
                                found: type_name(current),
                            })?;
                    object
                        .get(field)
                        .ok_or_else(|| ProjectionError::MissingField {
                            path: walked.to_string(),
                            field: field.clone(),
                        })?
                }
            };
            walked.steps.push(step.clone());
        }

        Ok(current.clone())
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "$");
        }
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                ProjectionStep::Index(index) => write!(f, "[{index}]")?,
                ProjectionStep::Field(field) if i == 0 => write!(f, "{field}")?,
                ProjectionStep::Field(field) => write!(f, ".{field}")?,
            }
        }
        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_index_then_field() {
        let projection = Projection::parse("[0].raw_config").unwrap();
        assert_eq!(
            projection.steps(),
            &[
                ProjectionStep::Index(0),
                ProjectionStep::Field("raw_config".to_string())
            ]
        );
        assert_eq!(projection.to_string(), "[0].raw_config");
    }

    #[test]
    fn test_parse_field_with_index() {
        let projection = Projection::parse("items[2].name").unwrap();
        assert_eq!(projection, Projection::identity().field("items").index(2).field("name"));
    }

    #[test]
    fn test_parse_empty_is_identity() {
        assert!(Projection::parse("").unwrap().is_identity());
        assert_eq!(Projection::identity().to_string(), "$");
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        assert!(Projection::parse("a..b").is_err());
        assert!(Projection::parse("[x]").is_err());
        assert!(Projection::parse("[0").is_err());
        assert!(Projection::parse("a]").is_err());
        assert!(Projection::parse("[-1]").is_err());
    }

    #[test]
    fn test_apply_list_index() {
        let value = json!(["cfg0", "cfg1"]);
        let projection = Projection::identity().index(0);
        assert_eq!(projection.apply(&value).unwrap(), json!("cfg0"));
    }

    #[test]
    fn test_apply_out_of_range() {
        let value = json!(["cfg0", "cfg1"]);
        let err = Projection::identity().index(2).apply(&value).unwrap_err();
        assert_eq!(
            err,
            ProjectionError::IndexOutOfRange {
                path: "$".to_string(),
                index: 2,
                len: 2
            }
        );
    }

    #[test]
    fn test_apply_empty_list() {
        let err = Projection::parse("[0].raw_config")
            .unwrap()
            .apply(&json!([]))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::IndexOutOfRange { len: 0, .. }));
    }

    #[test]
    fn test_apply_missing_field() {
        let value = json!([{ "name": "default" }]);
        let err = Projection::parse("[0].raw_config")
            .unwrap()
            .apply(&value)
            .unwrap_err();
        assert_eq!(
            err,
            ProjectionError::MissingField {
                path: "[0]".to_string(),
                field: "raw_config".to_string()
            }
        );
    }

    #[test]
    fn test_apply_type_mismatch() {
        let err = Projection::identity().index(0).apply(&json!({"a": 1})).unwrap_err();
        assert!(matches!(err, ProjectionError::NotAList { found: "object", .. }));

        let err = Projection::identity().field("a").apply(&json!("text")).unwrap_err();
        assert!(matches!(err, ProjectionError::NotAnObject { found: "string", .. }));
    }

    #[test]
    fn test_identity_returns_whole_value() {
        let value = json!({"kube_configs": [{"raw_config": "apiVersion: v1"}]});
        assert_eq!(Projection::identity().apply(&value).unwrap(), value);
    }
}
