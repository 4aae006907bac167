use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// provision.sh: 出力を返し、呼び出し順をログに残す
const PROVISION_SCRIPT: &str = r#"#!/bin/sh
cat > /dev/null
if [ "$1" = destroy ]; then
    echo "$STACKFLOW_NODE" >> destroyed.log
    exit 0
fi
echo "$STACKFLOW_NODE" >> provisioned.log
case "$STACKFLOW_KIND" in
    test:cluster)
        echo '{"kube_configs": [{"raw_config": "apiVersion: v1"}], "endpoint": "https://k8s.example.dev"}'
        ;;
    test:broken)
        echo "quota exceeded" >&2
        exit 1
        ;;
    *)
        printf '{"id": "%s"}\n' "$STACKFLOW_NODE"
        ;;
esac
"#;

const SETTINGS: &str = r#"
parallelism: 2
provisioners:
  "test:":
    command: sh
    args: ["provision.sh"]
"#;

pub const WORKSHOP: &str = r#"
project "workshop"

resource "cluster" kind="test:cluster" {
    region "nyc1"
}

resource "k8s" kind="test:provider" parent="cluster" {
    input "kubeconfig" from="cluster" output="kube_configs" path="[0].raw_config"
}

resource "platform" kind="test:namespace" parent="k8s" provider="k8s"

export "kubeconfig" from="cluster" output="kube_configs" path="[0].raw_config" secret=#true
export "endpoint" from="cluster" output="endpoint"
"#;

pub struct TestProject {
    pub root: TempDir,
    config_home: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let config_home = tempfile::tempdir().unwrap();
        fs::write(root.path().join("provision.sh"), PROVISION_SCRIPT).unwrap();
        fs::write(root.path().join("stackflow.yaml"), SETTINGS).unwrap();
        Self { root, config_home }
    }

    pub fn workshop() -> Self {
        let project = Self::new();
        project.write_stack_kdl(WORKSHOP);
        project
    }

    /// demos/<name> をコピーしたプロジェクト
    pub fn demo(name: &str) -> Self {
        let root = tempfile::tempdir().unwrap();
        let config_home = tempfile::tempdir().unwrap();
        let source = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../demos")
            .join(name);
        copy_dir(&source, root.path());
        Self { root, config_home }
    }

    pub fn write_stack_kdl(&self, content: &str) {
        fs::write(self.root.path().join("stack.kdl"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// プロジェクトルートで実行する stackflow コマンド（環境変数は隔離）
    pub fn stackflow(&self) -> Command {
        let mut cmd = Command::cargo_bin("stackflow").unwrap();
        cmd.current_dir(self.root.path())
            .env_remove("STACKFLOW_ENV")
            .env_remove("STACKFLOW_CONFIG_PATH")
            .env_remove("STACKFLOW_PROJECT_ROOT")
            .env_remove("RUST_LOG")
            .env("XDG_CONFIG_HOME", self.config_home.path())
            .env("NO_COLOR", "1");
        cmd
    }

    /// ログファイルの行（存在しなければ空）
    pub fn log(&self, name: &str) -> Vec<String> {
        read_lines(&self.root.path().join(name))
    }

    pub fn state(&self) -> serde_json::Value {
        let content =
            fs::read_to_string(self.root.path().join(".stackflow").join("state.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            // 実行済みデモの状態ファイルは持ち込まない
            if entry.file_name() != ".stackflow" {
                copy_dir(&entry.path(), &target);
            }
        } else {
            fs::copy(entry.path(), target).unwrap();
        }
    }
}
