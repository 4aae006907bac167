//! プロジェクトの読み込み（ルート検出 → 設定 → 宣言 → グラフ）

use anyhow::Context;
use stackflow_cloud::{ProvisionerRegistry, StateManager};
use stackflow_config::Settings;
use stackflow_core::{Graph, Stack};
use stackflow_exec::{CommandSpec, ExecProvisioner};
use std::path::PathBuf;
use std::sync::Arc;

pub struct Project {
    pub root: PathBuf,
    pub settings: Settings,
    pub environment: Option<String>,
    pub stack: Stack,
    pub graph: Graph,
}

impl Project {
    /// カレントディレクトリからプロジェクトを読み込む
    pub fn load(environment: Option<String>) -> anyhow::Result<Self> {
        let root = stackflow_core::find_project_root()?;
        let settings = stackflow_config::load_settings(&root)?;
        let environment = settings.resolve_environment(environment.as_deref());

        tracing::debug!(root = %root.display(), environment = ?environment, "Loading project");
        let stack = stackflow_core::load_stack_from_root(&root, environment.as_deref())?;

        if let Some(env) = &environment
            && !stack.environments.is_empty()
            && !stack.environments.contains(env)
        {
            tracing::warn!(environment = %env, "Environment is not declared in any stack file");
        }

        let graph = Graph::from_stack(&stack)
            .with_context(|| format!("スタック '{}' のグラフを構築できません", stack.name))?;

        Ok(Self {
            root,
            settings,
            environment,
            stack,
            graph,
        })
    }

    pub fn environment_label(&self) -> &str {
        self.environment.as_deref().unwrap_or("(default)")
    }

    pub fn state_manager(&self) -> StateManager {
        StateManager::new(self.settings.state_dir_in(&self.root))
            .with_environment(self.environment.as_deref())
    }

    /// 設定の provisioners からレジストリを組み立てる
    pub fn registry(&self) -> ProvisionerRegistry {
        let mut registry = ProvisionerRegistry::default();
        for (prefix, provisioner) in &self.settings.provisioners {
            let spec = CommandSpec {
                command: provisioner.command.clone(),
                args: provisioner.args.clone(),
                env: provisioner.env.clone(),
                working_dir: Some(self.root.clone()),
                timeout_secs: provisioner.timeout_secs,
            };
            let name = prefix.trim_end_matches(':');
            registry.register(prefix.clone(), Arc::new(ExecProvisioner::new(name, spec)));
        }
        registry
    }

    /// どのプロビジョナーにも割り当てられない kind
    pub fn unhandled_kinds(&self, registry: &ProvisionerRegistry) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .graph
            .nodes()
            .iter()
            .filter(|node| registry.resolve(&node.kind).is_none())
            .map(|node| node.kind.clone())
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}
