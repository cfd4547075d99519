use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILENAME: &str = ".pipeforge.toml";
pub const DEFAULT_PIPELINE_NAME: &str = "Pipeline";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_RUNNER: &str = "ubuntu-latest";
pub const DEFAULT_WORKFLOW_PATH: &str = ".github/workflows/pipeline.yml";
pub const DEFAULT_ACTIONS_DIR: &str = ".github/actions";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub domains: BTreeMap<String, DomainConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PipelineSection {
    pub name: Option<String>,
    #[serde(default)]
    pub branch_flow: Vec<String>,
    pub initial_branch: Option<String>,
    pub final_branch: Option<String>,
    pub runner: Option<String>,
    pub workflow_path: Option<String>,
    pub actions_dir: Option<String>,
    /// Keyed by the branch being promoted into.
    #[serde(default)]
    pub auto_promote: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DomainConfig {
    #[serde(default)]
    pub paths: Vec<String>,
    pub description: Option<String>,
    pub prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub testable: bool,
    #[serde(default)]
    pub deployable: bool,
    #[serde(default)]
    pub remote_testable: bool,
}

impl DomainConfig {
    /// Explicit `prefixes` win; otherwise the legacy flags map to fixed prefixes.
    pub fn resolved_prefixes(&self) -> Vec<String> {
        if let Some(prefixes) = &self.prefixes {
            return prefixes.clone();
        }
        [
            (self.testable, "test"),
            (self.deployable, "deploy"),
            (self.remote_testable, "remote-test"),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, prefix)| prefix.to_string())
        .collect()
    }
}

impl PipelineConfig {
    pub fn name(&self) -> &str {
        self.pipeline
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_PIPELINE_NAME)
    }

    /// Ordered promotion chain. Falls back to the final branch, then `main`.
    pub fn branch_flow(&self) -> Vec<String> {
        if !self.pipeline.branch_flow.is_empty() {
            return self.pipeline.branch_flow.clone();
        }
        vec![
            self.pipeline
                .final_branch
                .clone()
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        ]
    }

    pub fn initial_branch(&self) -> String {
        self.pipeline
            .initial_branch
            .clone()
            .or_else(|| self.branch_flow().first().cloned())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
    }

    pub fn final_branch(&self) -> String {
        self.pipeline
            .final_branch
            .clone()
            .or_else(|| self.branch_flow().last().cloned())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
    }

    pub fn runner(&self) -> &str {
        self.pipeline.runner.as_deref().unwrap_or(DEFAULT_RUNNER)
    }

    pub fn workflow_path(&self) -> &str {
        self.pipeline
            .workflow_path
            .as_deref()
            .unwrap_or(DEFAULT_WORKFLOW_PATH)
    }

    /// Actions directory relative to the project root, without leading `./` or trailing `/`.
    pub fn actions_dir(&self) -> &str {
        let raw = self
            .pipeline
            .actions_dir
            .as_deref()
            .unwrap_or(DEFAULT_ACTIONS_DIR);
        raw.trim_start_matches("./").trim_end_matches('/')
    }

    pub fn auto_promotes_into(&self, branch: &str) -> bool {
        self.pipeline
            .auto_promote
            .get(branch)
            .copied()
            .unwrap_or(false)
    }

    pub fn validate(&self) -> Result<()> {
        let flow = self.branch_flow();
        let mut seen = BTreeSet::new();
        for branch in &flow {
            if branch.trim().is_empty() {
                bail!("branch_flow contains an empty branch name");
            }
            if !seen.insert(branch.as_str()) {
                bail!("branch_flow lists `{branch}` more than once");
            }
        }
        for (label, branch) in [
            ("initial_branch", self.initial_branch()),
            ("final_branch", self.final_branch()),
        ] {
            if !seen.contains(branch.as_str()) {
                bail!("{label} `{branch}` is not part of branch_flow");
            }
        }
        for branch in self.pipeline.auto_promote.keys() {
            if !seen.contains(branch.as_str()) {
                bail!("auto_promote key `{branch}` is not part of branch_flow");
            }
        }

        for (name, domain) in &self.domains {
            if !is_identifier(name) {
                bail!("domain name `{name}` may only contain letters, digits, `-` and `_`");
            }
            if domain.paths.iter().all(|path| path.trim().is_empty()) {
                bail!("domain `{name}` needs at least one path");
            }
            for prefix in domain.resolved_prefixes() {
                if !is_identifier(&prefix) {
                    bail!(
                        "domain `{name}` prefix `{prefix}` may only contain letters, digits, `-` and `_`"
                    );
                }
            }
        }
        Ok(())
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Load and parse a PipelineConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<PipelineConfig> {
    if !config_path.exists() {
        return Ok(PipelineConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: PipelineConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Load a config and reject anything the generators cannot honour.
pub fn load_validated_config(config_path: &Path) -> Result<PipelineConfig> {
    let config = load_config(config_path)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
    Ok(config)
}

pub fn starter_config() -> String {
    format!(
        r#"[pipeline]
name = "{DEFAULT_PIPELINE_NAME}"
branch_flow = ["develop", "{DEFAULT_BRANCH}"]
runner = "{DEFAULT_RUNNER}"
workflow_path = "{DEFAULT_WORKFLOW_PATH}"
actions_dir = "{DEFAULT_ACTIONS_DIR}"

[pipeline.auto_promote]
{DEFAULT_BRANCH} = false

[domains.app]
paths = ["src/**"]
description = "Application code"
prefixes = ["test"]
"#
    )
}
