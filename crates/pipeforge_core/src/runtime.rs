use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{DEFAULT_CONFIG_FILENAME, PipelineConfig, starter_config};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub project_root_exists: bool,
    pub config_exists: bool,
    pub workflow_exists: bool,
    pub actions_dir_exists: bool,
    pub warnings: Vec<String>,
}

impl ResolvedPaths {
    pub fn workflow_path(&self, config: &PipelineConfig) -> PathBuf {
        absolutize(Path::new(config.workflow_path()), &self.project_root)
    }

    pub fn actions_dir(&self, config: &PipelineConfig) -> PathBuf {
        absolutize(Path::new(config.actions_dir()), &self.project_root)
    }

    pub fn action_path(&self, config: &PipelineConfig, name: &str) -> PathBuf {
        self.actions_dir(config).join(name).join("action.yml")
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

pub fn inspect_runtime(paths: &ResolvedPaths, config: &PipelineConfig) -> RuntimeStatus {
    let project_root_exists = paths.project_root.exists();
    let config_exists = paths.config_path.exists();
    let workflow_exists = paths.workflow_path(config).exists();
    let actions_dir_exists = paths.actions_dir(config).exists();

    let mut warnings = Vec::new();
    if !config_exists {
        warnings.push(format!(
            "{} is missing; run `pipeforge init` to write a starter configuration",
            normalize_for_display(&paths.config_path)
        ));
    }
    if config.domains.is_empty() {
        warnings.push("no domains configured; change detection has no outputs".to_string());
    }

    RuntimeStatus {
        project_root_exists,
        config_exists,
        workflow_exists,
        actions_dir_exists,
        warnings,
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env);

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = non_empty(lookup_env("PIPEFORGE_CONFIG")) {
        (
            absolutize(Path::new(value.trim()), &project_root),
            ValueSource::Env,
        )
    } else {
        (project_root.join(DEFAULT_CONFIG_FILENAME), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        project_root,
        config_path,
        root_source,
        config_source,
    })
}

/// Write the starter configuration. Returns `true` when a write occurred.
pub fn init_project(paths: &ResolvedPaths, force: bool) -> Result<bool> {
    write_text_file(&paths.config_path, &starter_config(), force)
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> (PathBuf, ValueSource)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return (absolutize(path, &context.cwd), ValueSource::Flag);
    }

    if let Some(value) = non_empty(lookup_env("PIPEFORGE_PROJECT_ROOT")) {
        return (
            absolutize(Path::new(value.trim()), &context.cwd),
            ValueSource::Env,
        );
    }

    match detect_project_root_heuristic(&context.cwd) {
        Some(root) => (root, ValueSource::Heuristic),
        None => (context.cwd.clone(), ValueSource::Default),
    }
}

/// Nearest ancestor holding a pipeforge config, else the nearest git checkout.
fn detect_project_root_heuristic(cwd: &Path) -> Option<PathBuf> {
    let mut seen = HashSet::new();
    let candidates = ancestors(cwd)
        .into_iter()
        .filter(|candidate| seen.insert(normalize_for_display(candidate)))
        .collect::<Vec<_>>();
    candidates
        .iter()
        .find(|candidate| candidate.join(DEFAULT_CONFIG_FILENAME).is_file())
        .or_else(|| candidates.iter().find(|candidate| candidate.join(".git").exists()))
        .cloned()
}

fn ancestors(path: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut cursor = Some(path);
    while let Some(current) = cursor {
        out.push(current.to_path_buf());
        cursor = current.parent();
    }
    out
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
