use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use serde::Serialize;
use similar::TextDiff;
use tracing::{debug, info, warn};

use crate::actions::{ActionTemplate, action_templates};
use crate::compose::compose_workflow;
use crate::config::PipelineConfig;
use crate::runtime::{ResolvedPaths, normalize_for_display};

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub force: bool,
    pub dry_run: bool,
    pub include_actions: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Workflow,
    Action,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub path: String,
    pub kind: DocumentKind,
    pub status: String,
    pub changed: bool,
    pub written: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub placeholders_added: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recovered_jobs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateReport {
    pub documents: Vec<DocumentReport>,
    pub failures: Vec<DocumentFailure>,
}

impl GenerateReport {
    pub fn has_changes(&self) -> bool {
        self.documents.iter().any(|document| document.changed)
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Generate the workflow and, optionally, every leaf action. Each document succeeds or
/// fails on its own; a failure is recorded and the next document still runs.
pub fn generate(
    paths: &ResolvedPaths,
    config: &PipelineConfig,
    options: &GenerateOptions,
) -> GenerateReport {
    let mut report = GenerateReport::default();

    let workflow_path = paths.workflow_path(config);
    record(
        &mut report,
        &workflow_path,
        generate_workflow(&workflow_path, config, options),
    );

    if options.include_actions {
        for template in action_templates() {
            let path = paths.action_path(config, template.name);
            record(&mut report, &path, generate_action(&path, &template, options));
        }
    }
    report
}

fn record(report: &mut GenerateReport, path: &Path, outcome: Result<DocumentReport>) {
    match outcome {
        Ok(document) => report.documents.push(document),
        Err(error) => {
            warn!(path = %path.display(), "{error:#}");
            report.failures.push(DocumentFailure {
                path: normalize_for_display(path),
                error: format!("{error:#}"),
            });
        }
    }
}

pub fn generate_workflow(
    path: &Path,
    config: &PipelineConfig,
    options: &GenerateOptions,
) -> Result<DocumentReport> {
    let existing = read_existing(path)?;
    let composition = compose_workflow(config, existing.as_deref(), options.force)
        .with_context(|| format!("failed to generate {}", path.display()))?;

    let changed = existing.as_deref() != Some(composition.text.as_str());
    let diff = (options.dry_run && changed).then(|| {
        unified_diff(
            existing.as_deref().unwrap_or_default(),
            &composition.text,
            &normalize_for_display(path),
        )
    });
    let written = changed && !options.dry_run;
    if written {
        write_atomic(path, &composition.text)?;
    }
    info!(
        path = %path.display(),
        status = composition.status.as_str(),
        changed,
        written,
        "workflow generated"
    );

    Ok(DocumentReport {
        path: normalize_for_display(path),
        kind: DocumentKind::Workflow,
        status: composition.status.as_str().to_string(),
        changed,
        written,
        warnings: composition.warnings,
        placeholders_added: composition.placeholders_added,
        recovered_jobs: composition.recovered_jobs,
        diff,
    })
}

/// Missing files are created, identical files left alone, and locally modified files
/// kept unless `force` is set.
pub fn generate_action(
    path: &Path,
    template: &ActionTemplate,
    options: &GenerateOptions,
) -> Result<DocumentReport> {
    let existing = read_existing(path)?;
    let (status, changed) = match existing.as_deref() {
        None => ("created", true),
        Some(current) if current == template.content => ("unchanged", false),
        Some(_) if options.force => ("overwritten", true),
        Some(_) => ("modified", false),
    };
    let diff = (options.dry_run && changed).then(|| {
        unified_diff(
            existing.as_deref().unwrap_or_default(),
            template.content,
            &normalize_for_display(path),
        )
    });
    let written = changed && !options.dry_run;
    if written {
        write_atomic(path, template.content)?;
    }
    let mut warnings = Vec::new();
    if status == "modified" {
        warnings.push("local edits kept; pass --force to restore the generated action".to_string());
    }
    debug!(path = %path.display(), status, written, "action generated");

    Ok(DocumentReport {
        path: normalize_for_display(path),
        kind: DocumentKind::Action,
        status: status.to_string(),
        changed,
        written,
        warnings,
        placeholders_added: Vec::new(),
        recovered_jobs: Vec::new(),
        diff,
    })
}

fn read_existing(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Write through a sibling temp file and rename it over the target, so a failed write
/// never leaves a truncated document behind.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;

    let temp_path = temp_sibling(path);
    fs::write(&temp_path, content)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    if let Err(error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(error).with_context(|| format!("failed to replace {}", path.display()));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    path.with_file_name(format!(".{file_name}.{}.tmp", process::id()))
}

pub fn unified_diff(old: &str, new: &str, label: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::config::DomainConfig;
    use crate::region::START_MARKER;
    use crate::runtime::ValueSource;

    fn fixture(root: &Path) -> (ResolvedPaths, PipelineConfig) {
        let paths = ResolvedPaths {
            project_root: root.to_path_buf(),
            config_path: root.join(".pipeforge.toml"),
            root_source: ValueSource::Flag,
            config_source: ValueSource::Default,
        };
        let mut config = PipelineConfig::default();
        config.pipeline.branch_flow = vec!["develop".to_string(), "main".to_string()];
        config.domains.insert(
            "api".to_string(),
            DomainConfig {
                paths: vec!["src/**".to_string()],
                testable: true,
                ..DomainConfig::default()
            },
        );
        (paths, config)
    }

    fn options() -> GenerateOptions {
        GenerateOptions {
            include_actions: true,
            ..GenerateOptions::default()
        }
    }

    #[test]
    fn first_run_creates_workflow_and_actions() {
        let temp = tempdir().expect("tempdir");
        let (paths, config) = fixture(temp.path());

        let report = generate(&paths, &config, &options());
        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(report.documents.len(), 6);
        assert_eq!(report.documents[0].status, "created");
        assert_eq!(report.documents[0].placeholders_added, vec!["test-api"]);
        assert!(report.documents.iter().all(|document| document.written));

        let workflow = fs::read_to_string(paths.workflow_path(&config)).expect("workflow");
        assert!(workflow.contains(START_MARKER));
        assert!(paths.action_path(&config, "calculate-version").is_file());
    }

    #[test]
    fn second_run_changes_nothing() {
        let temp = tempdir().expect("tempdir");
        let (paths, config) = fixture(temp.path());
        generate(&paths, &config, &options());

        let report = generate(&paths, &config, &options());
        assert!(!report.has_changes());
        assert_eq!(report.documents[0].status, "merged");
        assert!(report.documents[1..].iter().all(|document| document.status == "unchanged"));
    }

    #[test]
    fn dry_run_reports_diff_without_writing() {
        let temp = tempdir().expect("tempdir");
        let (paths, config) = fixture(temp.path());
        let report = generate(
            &paths,
            &config,
            &GenerateOptions {
                dry_run: true,
                ..options()
            },
        );
        assert!(report.has_changes());
        assert!(!paths.workflow_path(&config).exists());
        let diff = report.documents[0].diff.as_deref().expect("diff");
        assert!(diff.contains("+name: Pipeline"));
    }

    #[test]
    fn modified_action_is_kept_unless_forced() {
        let temp = tempdir().expect("tempdir");
        let (paths, config) = fixture(temp.path());
        generate(&paths, &config, &options());
        let action = paths.action_path(&config, "create-tag");
        fs::write(&action, "name: mine\n").expect("edit action");

        let report = generate(&paths, &config, &options());
        let entry = report
            .documents
            .iter()
            .find(|document| document.path.ends_with("create-tag/action.yml"))
            .expect("create-tag report");
        assert_eq!(entry.status, "modified");
        assert!(!entry.changed);
        assert_eq!(fs::read_to_string(&action).expect("read"), "name: mine\n");

        let forced = generate(
            &paths,
            &config,
            &GenerateOptions {
                force: true,
                ..options()
            },
        );
        let entry = forced
            .documents
            .iter()
            .find(|document| document.path.ends_with("create-tag/action.yml"))
            .expect("create-tag report");
        assert_eq!(entry.status, "overwritten");
        assert_ne!(fs::read_to_string(&action).expect("read"), "name: mine\n");
    }

    #[test]
    fn structural_failure_is_isolated_and_leaves_file_untouched() {
        let temp = tempdir().expect("tempdir");
        let (paths, config) = fixture(temp.path());
        let workflow = paths.workflow_path(&config);
        fs::create_dir_all(workflow.parent().expect("parent")).expect("mkdir");
        fs::write(&workflow, "on: push\n").expect("write workflow");

        let report = generate(&paths, &config, &options());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].error.contains("structural error"));
        assert_eq!(fs::read_to_string(&workflow).expect("read"), "on: push\n");
        assert_eq!(report.documents.len(), 5);
    }

    #[test]
    fn write_atomic_replaces_content_and_cleans_up() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("nested").join("file.yml");
        write_atomic(&target, "one\n").expect("first write");
        write_atomic(&target, "two\n").expect("second write");
        assert_eq!(fs::read_to_string(&target).expect("read"), "two\n");
        let leftovers = fs::read_dir(target.parent().expect("parent"))
            .expect("list")
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn unified_diff_has_headers() {
        let diff = unified_diff("a\nb\n", "a\nc\n", "x.yml");
        assert!(diff.starts_with("--- a/x.yml\n+++ b/x.yml\n"));
        assert!(diff.contains("-b\n+c\n"));
    }
}
