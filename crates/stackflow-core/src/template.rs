//! テンプレート展開
//!
//! stack.kdl を Tera テンプレートとして展開してからパースします。
//! 変数は以下の順で上書きされます（後勝ち）:
//!
//! 1. トップレベルの `variables { ... }`
//! 2. `environment "<name>" { variables { ... } }`
//! 3. `.env` ファイル
//! 4. `STACKFLOW_*` / `CI_*` 環境変数

use crate::error::{Result, StackError};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// 変数コンテキスト
pub type Variables = HashMap<String, Value>;

/// テンプレートに公開する環境変数のプレフィックス
const ALLOWED_ENV_PREFIXES: &[&str] = &["STACKFLOW_", "CI_"];

/// テンプレートプロセッサ
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    pub fn add_variable(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), &value);
    }

    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// 許可されたプレフィックスの環境変数を追加
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        let mut count = 0;
        for (key, value) in std::env::vars() {
            if ALLOWED_ENV_PREFIXES.iter().any(|p| key.starts_with(p)) {
                debug!(key = %key, "Adding environment variable");
                self.context.insert(key, &Value::String(value));
                count += 1;
            }
        }
        info!(env_var_count = count, "Added filtered environment variables");
    }

    /// .env ファイルの変数を追加（プレフィックス制限なし）
    #[tracing::instrument(skip(self))]
    pub fn add_env_file_variables(&mut self, env_file_path: &Path) -> Result<()> {
        let content =
            std::fs::read_to_string(env_file_path).map_err(|e| StackError::IoError {
                path: env_file_path.to_path_buf(),
                message: e.to_string(),
            })?;

        let variables = parse_env_file(&content);
        let count = variables.len();
        for (key, value) in variables {
            self.context.insert(key, &Value::String(value));
        }

        info!(
            env_file = %env_file_path.display(),
            variable_count = count,
            "Loaded variables from .env file"
        );
        Ok(())
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| StackError::TemplateRenderError(describe_tera_error(&e)))
    }

    /// ファイルを読み込んで展開
    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        self.render_str(&content).map_err(|e| match e {
            StackError::TemplateRenderError(message) => StackError::TemplateError {
                file: path.to_path_buf(),
                line: None,
                message,
            },
            other => other,
        })
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// `KEY=VALUE` 形式の .env をパース（空行と `#` コメントは無視）
fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let key = key.trim().trim_start_matches("export ").trim();
            (key.to_string(), strip_quotes(value.trim()).to_string())
        })
        .collect()
}

/// 変数定義を抽出
///
/// テンプレート展開前のテキストから `variables { ... }` ブロックを取り出します。
/// `environment` を指定すると、その環境ブロック内の変数がトップレベルの変数を上書きします。
pub fn extract_variables(kdl_content: &str, environment: Option<&str>) -> Result<Variables> {
    let blocks = environment_blocks(kdl_content, None)?;

    // 環境ブロックを除いたトップレベル部分
    let mut top_level = String::with_capacity(kdl_content.len());
    let mut last_end = 0;
    for (start, end) in &blocks {
        top_level.push_str(&kdl_content[last_end..*start]);
        last_end = *end + 1;
    }
    top_level.push_str(&kdl_content[last_end.min(kdl_content.len())..]);

    let mut variables = variables_in(&top_level)?;

    if let Some(name) = environment {
        for (start, end) in environment_blocks(kdl_content, Some(name))? {
            let body_start = kdl_content[start..end]
                .find('{')
                .map(|offset| start + offset + 1)
                .unwrap_or(end);
            variables.extend(variables_in(&kdl_content[body_start..end])?);
        }
    }

    Ok(variables)
}

/// environment ブロックの範囲（開始位置, 閉じ括弧の位置）を列挙
fn environment_blocks(content: &str, name: Option<&str>) -> Result<Vec<(usize, usize)>> {
    let name_pattern = match name {
        Some(name) => regex::escape(name),
        None => r#"[^"']+"#.to_string(),
    };
    let pattern = format!(r#"environment\s+["']{name_pattern}["']\s*\{{"#);
    let re = Regex::new(&pattern)
        .map_err(|e| StackError::InvalidConfig(format!("正規表現のコンパイルエラー: {e}")))?;

    Ok(re
        .find_iter(content)
        .filter_map(|m| find_matching_brace(content, m.end() - 1).map(|end| (m.start(), end)))
        .collect())
}

/// テキスト中の variables ブロックを全て読み取る
fn variables_in(content: &str) -> Result<Variables> {
    let re = Regex::new(r"variables\s*\{")
        .map_err(|e| StackError::InvalidConfig(format!("正規表現のコンパイルエラー: {e}")))?;

    let mut variables = HashMap::new();
    for m in re.find_iter(content) {
        let Some(end) = find_matching_brace(content, m.end() - 1) else {
            continue;
        };
        // ブロック本体だけを KDL としてパース（他の箇所の {{ }} を避ける）
        let doc: kdl::KdlDocument = content[m.end()..end].parse().map_err(|e| {
            StackError::InvalidConfig(format!("KDL パースエラー (variables ブロック): {e}"))
        })?;
        for node in doc.nodes() {
            if let Some(entry) = node.entries().first() {
                variables.insert(
                    node.name().value().to_string(),
                    kdl_value_to_json(entry.value()),
                );
            }
        }
    }
    Ok(variables)
}

/// 対応する閉じ波括弧の位置（文字列リテラル内は無視）
fn find_matching_brace(content: &str, open_pos: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    if bytes.get(open_pos) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (pos, &c) in bytes.iter().enumerate().skip(open_pos) {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            b'\\' => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_quotes(s: &str) -> &str {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if quoted { &s[1..s.len() - 1] } else { s }
}

/// Tera のエラーチェーンから利用者向けのメッセージを作る
fn describe_tera_error(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full_error = details.join(" | ");

    if let Some(start) = full_error.find("Variable `")
        && let Some(len) = full_error[start + 10..].find('`')
        && full_error.contains("not found in context")
    {
        let var_name = &full_error[start + 10..start + 10 + len];
        return format!(
            "未定義の変数: `{var_name}`\nヒント: variables ブロックで定義するか、.env ファイルに追加してください"
        );
    }

    full_error
}

/// KDL値をJSON値に変換
pub(crate) fn kdl_value_to_json(value: &kdl::KdlValue) -> Value {
    if let Some(s) = value.as_string() {
        Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i).map(Value::from).unwrap_or(Value::Null)
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if let Some(b) = value.as_bool() {
        Value::Bool(b)
    } else {
        Value::Null
    }
}
