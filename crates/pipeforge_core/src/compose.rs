//! Per-document state machine: pick a generation mode, run the merge, splice the
//! custom region back at its anchor and post-process the text.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::document::{Document, Insertion};
use crate::emit::INDENT_STEP;
use crate::error::MergeError;
use crate::jobs::{self, ANCHOR_JOB, JOBS_KEY, MANAGED_JOBS};
use crate::merge::{MergeReport, apply_operations};
use crate::reflow;
use crate::region::{self, Extraction};

const TRIGGERS_KEY: &str = "on";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    /// No previous file.
    Created,
    /// Merged in place; the existing custom region was kept.
    Merged,
    /// Merged in place; the file had no region so one was seeded.
    Updated,
    /// Regenerated from scratch after `--force` or an unparseable file.
    Rebuilt,
}

impl GenerationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Merged => "merged",
            Self::Updated => "updated",
            Self::Rebuilt => "rebuilt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub text: String,
    pub status: GenerationStatus,
    pub warnings: Vec<String>,
    pub placeholders_added: Vec<String>,
    pub recovered_jobs: Vec<String>,
    pub merge: MergeReport,
}

/// Produce the workflow text for `config`, merging into `existing` when given.
///
/// Only structural errors surface; an unparseable existing file degrades to a rebuild
/// and a lone sentinel marker degrades to "no region", both with a warning.
pub fn compose_workflow(
    config: &PipelineConfig,
    existing: Option<&str>,
    force: bool,
) -> Result<Composition, MergeError> {
    let jobs_path = vec![JOBS_KEY.to_string()];
    let mut warnings = Vec::new();
    let mut recovered_jobs = Vec::new();

    let (mut document, status, body, previous) = match existing {
        None => (Document::new(), GenerationStatus::Created, String::new(), None),
        Some(text) => {
            let extraction = region::extract(text);
            if extraction.scan.is_mismatch() {
                let message = format!(
                    "custom region markers are unbalanced ({:?}); the lone marker was dropped and no region was recovered",
                    extraction.scan
                );
                warn!("{message}");
                warnings.push(message);
            }
            let parsed = Document::parse(&extraction.remainder);
            match (force, parsed) {
                (false, Ok(document)) => {
                    let (status, body) = match extraction.body {
                        Some(body) => (GenerationStatus::Merged, body),
                        None => (GenerationStatus::Updated, String::new()),
                    };
                    (document, status, body, None)
                }
                (force, parsed) => {
                    let previous = match parsed {
                        Ok(document) => Some(document),
                        Err(err) => {
                            let message = format!(
                                "existing workflow could not be parsed ({err}); rebuilding from configuration"
                            );
                            warn!("{message}");
                            warnings.push(message);
                            None
                        }
                    };
                    debug!(force, "rebuilding workflow");
                    let body = rebuild_region_body(
                        &extraction,
                        previous.as_ref(),
                        &jobs_path,
                        &mut recovered_jobs,
                        &mut warnings,
                    );
                    (Document::new(), GenerationStatus::Rebuilt, body, previous)
                }
            }
        }
    };

    let operations = jobs::build_operations(config);
    let mut merge = apply_operations(&mut document, &operations)?;
    if let Some(previous) = &previous {
        carry_user_entries(&mut document, previous, &mut warnings);
        merge = apply_operations(&mut document, &operations)?;
    }
    remove_stale_jobs(&mut document, config, &jobs_path);
    for path in &merge.skipped {
        let message = format!("`{path}` was not written because an ancestor is not a mapping");
        warn!("{message}");
        warnings.push(message);
    }

    let job_indent = document
        .resolve_or_create(&jobs_path)
        .map_err(|blocked| {
            MergeError::structural(JOBS_KEY, format!("`{blocked}` is not a mapping"))
        })?
        .entry_indent();

    let body = if status == GenerationStatus::Updated {
        region::example_stub(job_indent)
    } else {
        body
    };
    for name in region::entry_names(&body) {
        if MANAGED_JOBS.contains(&name.as_str()) {
            let message = format!("custom job `{name}` has the same name as a managed job");
            warn!("{message}");
            warnings.push(message);
        }
    }

    let taken = document.keys(&jobs_path).into_iter().collect::<BTreeSet<_>>();
    let placeholders = jobs::placeholder_jobs(config);
    let region_merge = region::merge_placeholders(&body, &placeholders, &taken, job_indent);
    for name in &region_merge.suppressed {
        debug!(job = %name, "placeholder already present");
    }

    let block = region::wrap(&region_merge.body, job_indent);
    let rendered = document.render_with(Some(&Insertion {
        parent: &jobs_path,
        after: ANCHOR_JOB,
        text: &block,
    }));
    let text = reflow::reflow_guards(&rendered, reflow::DEFAULT_THRESHOLD, MANAGED_JOBS);

    if let Err(err) = serde_yaml::from_str::<serde_yaml::Value>(&text) {
        let message = format!("generated workflow is not valid YAML: {err}");
        warn!("{message}");
        warnings.push(message);
    }

    Ok(Composition {
        text,
        status,
        warnings,
        placeholders_added: region_merge.added,
        recovered_jobs,
        merge,
    })
}

/// Region body for a rebuild: the recovered region plus every non-managed job of the
/// previous document that the region does not already define.
fn rebuild_region_body(
    extraction: &Extraction,
    previous: Option<&Document>,
    jobs_path: &[String],
    recovered_jobs: &mut Vec<String>,
    warnings: &mut Vec<String>,
) -> String {
    let body = extraction
        .body
        .as_deref()
        .map(|body| region::reindent_body(body, INDENT_STEP))
        .unwrap_or_default();
    let Some(previous) = previous else {
        return body;
    };

    let in_region = region::entry_names(&body)
        .into_iter()
        .collect::<BTreeSet<_>>();
    let mut parts = Vec::new();
    if !body.trim().is_empty() {
        parts.push(body);
    }
    for (name, text) in region::recover_unmanaged_jobs(previous, jobs_path, MANAGED_JOBS, INDENT_STEP) {
        if in_region.contains(&name) {
            let message =
                format!("job `{name}` exists inside and outside the custom region; kept the region copy");
            warn!("{message}");
            warnings.push(message);
            continue;
        }
        debug!(job = %name, "moving job into custom region");
        parts.push(text.trim_end().to_string());
        recovered_jobs.push(name);
    }
    parts.join("\n\n")
}

/// Move every top-level entry except the regenerated triggers and jobs from the previous
/// document into the rebuilt one. Generated keys keep their fresh formatting but take the
/// previous value; other keys are placed before `jobs` as written.
fn carry_user_entries(document: &mut Document, previous: &Document, warnings: &mut Vec<String>) {
    let Some(previous_root) = previous.mapping(&[]) else {
        return;
    };
    let Ok(root) = document.resolve_or_create(&[]) else {
        return;
    };
    for entry in previous_root.entries() {
        if entry.key() == JOBS_KEY || entry.key() == TRIGGERS_KEY {
            continue;
        }
        debug!(key = entry.key(), "carrying top-level entry into rebuild");
        root.adopt(entry, JOBS_KEY);
    }

    let triggers = vec![TRIGGERS_KEY.to_string()];
    let generated = document.keys(&triggers);
    for key in previous.keys(&triggers) {
        if !generated.contains(&key) {
            let message = format!("trigger `on.{key}` is not generated and was dropped by the rebuild");
            warn!("{message}");
            warnings.push(message);
        }
    }
}

/// Managed jobs this configuration no longer generates.
fn remove_stale_jobs(document: &mut Document, config: &PipelineConfig, jobs_path: &[String]) {
    let generated = jobs::generated_jobs(config);
    for name in MANAGED_JOBS.iter().filter(|name| !generated.contains(name)) {
        let mut path = jobs_path.to_vec();
        path.push((*name).to_string());
        if document.remove(&path).is_some() {
            debug!(job = name, "removed managed job not generated by this configuration");
        }
    }
}
