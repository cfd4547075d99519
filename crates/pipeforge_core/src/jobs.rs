//! Operation lists for the workflow skeleton and the placeholder jobs.
//!
//! Each sub-generator returns its own slice of operations; the composer concatenates
//! them in generation order, which is also the key order of a freshly created file.

use serde_yaml::Value;

use crate::config::PipelineConfig;
use crate::ops::{Operation, mapping, sequence, string};
use crate::region::Placeholder;

/// Jobs the engine owns. Anything else under `jobs` belongs to the user.
pub const MANAGED_JOBS: &[&str] = &["changes", "version", "tag", "promote", "release"];

/// The custom region is reinserted right after this job.
pub const ANCHOR_JOB: &str = "version";

pub const JOBS_KEY: &str = "jobs";

const CHECKOUT_ACTION: &str = "actions/checkout@v4";

pub fn build_operations(config: &PipelineConfig) -> Vec<Operation> {
    let mut operations = header_operations(config);
    operations.extend(job_operations(config));
    operations
}

pub fn header_operations(config: &PipelineConfig) -> Vec<Operation> {
    let flow = config.branch_flow();
    vec![
        Operation::preserve("name", string(config.name())).comment(
            "Generated by pipeforge. Managed jobs are rewritten on every run;\n\
             jobs between the custom markers are kept as written.",
        ),
        Operation::preserve(
            "run-name",
            string("${{ github.workflow }} on ${{ github.ref_name }}"),
        ),
        Operation::preserve("on", mapping(Vec::<(String, Value)>::new())).space_before(),
        Operation::set(
            "on.workflow_dispatch.inputs.version",
            mapping([
                ("description", string("Override the calculated version")),
                ("required", Value::Bool(false)),
                ("type", string("string")),
            ]),
        ),
        Operation::set("on.pull_request.branches", sequence(flow.clone())).required(),
        Operation::set("on.push.branches", sequence(flow)).required(),
        Operation::preserve(
            "concurrency",
            mapping([
                ("group", string("${{ github.workflow }}-${{ github.ref }}")),
                ("cancel-in-progress", Value::Bool(false)),
            ]),
        )
        .space_before(),
        Operation::preserve(
            "permissions",
            mapping([
                ("contents", string("write")),
                ("pull-requests", string("write")),
            ]),
        )
        .space_before(),
        Operation::preserve("env", mapping(Vec::<(String, Value)>::new())).space_before(),
        Operation::preserve("env.NODE_VERSION", string("20"))
            .comment("Runtime pin for custom jobs; edits here are kept."),
        Operation::preserve(JOBS_KEY, mapping(Vec::<(String, Value)>::new())).space_before(),
    ]
}

pub fn job_operations(config: &PipelineConfig) -> Vec<Operation> {
    let mut operations = vec![
        job("changes", changes_job(config)).comment("Detect which domains changed"),
        job("version", version_job(config))
            .space_before()
            .comment("Calculate the next version from the commit history"),
        job("tag", tag_job(config))
            .space_before()
            .comment(format!(
                "Tag the calculated version on pushes to {}",
                config.initial_branch()
            )),
    ];
    if config.branch_flow().len() > 1 {
        operations.push(
            job("promote", promote_job(config))
                .space_before()
                .comment("Promote the tagged version to the next branch in the flow"),
        );
    }
    operations.push(
        job("release", release_job(config))
            .space_before()
            .comment(format!(
                "Publish a release from {}",
                config.final_branch()
            )),
    );
    operations
}

/// Managed job names this configuration generates, in generation order.
pub fn generated_jobs(config: &PipelineConfig) -> Vec<&'static str> {
    MANAGED_JOBS
        .iter()
        .copied()
        .filter(|name| *name != "promote" || config.branch_flow().len() > 1)
        .collect()
}

/// One suggestion job per domain and resolved prefix.
pub fn placeholder_jobs(config: &PipelineConfig) -> Vec<Placeholder> {
    let mut placeholders = Vec::new();
    for (domain, settings) in &config.domains {
        for prefix in settings.resolved_prefixes() {
            placeholders.push(Placeholder {
                value: placeholder_job(config, &prefix, domain),
                prefix,
                domain: domain.clone(),
            });
        }
    }
    placeholders
}

fn job(name: &str, value: Value) -> Operation {
    Operation::set(&format!("{JOBS_KEY}.{name}"), value).required()
}

fn expression(body: &str) -> String {
    format!("${{{{ {body} }}}}")
}

fn local_action(config: &PipelineConfig, name: &str) -> String {
    format!("./{}/{name}", config.actions_dir())
}

fn checkout(full_history: bool) -> Value {
    if full_history {
        mapping([
            ("uses", string(CHECKOUT_ACTION)),
            ("with", mapping([("fetch-depth", Value::from(0))])),
        ])
    } else {
        mapping([("uses", string(CHECKOUT_ACTION))])
    }
}

fn push_guard(branch_test: &str) -> String {
    expression(&format!(
        "always() && github.event_name == 'push' && {branch_test} && needs.version.result == 'success' && needs.version.outputs.version != ''"
    ))
}

fn quoted(branch: &str) -> String {
    format!("'{}'", branch.replace('\'', "''"))
}

fn changes_job(config: &PipelineConfig) -> Value {
    let mut outputs = serde_yaml::Mapping::new();
    let mut filters = String::new();
    for (name, domain) in &config.domains {
        outputs.insert(
            string(name.as_str()),
            string(expression(&format!(
                "fromJSON(steps.detect.outputs.changes)['{name}']"
            ))),
        );
        for path in domain.paths.iter().filter(|path| !path.trim().is_empty()) {
            filters.push_str(&format!("{name}={}\n", path.trim()));
        }
    }

    let mut detect = vec![
        ("id", string("detect")),
        ("uses", string(local_action(config, "detect-changes"))),
    ];
    if !filters.is_empty() {
        detect.push(("with", mapping([("filters", string(filters))])));
    }

    mapping([
        ("runs-on", string(config.runner())),
        ("outputs", Value::Mapping(outputs)),
        ("steps", sequence([checkout(true), mapping(detect)])),
    ])
}

fn version_job(config: &PipelineConfig) -> Value {
    mapping([
        ("needs", string("changes")),
        (
            "if",
            string(expression(
                "always() && needs.changes.result == 'success' && (github.event_name == 'push' || github.event_name == 'workflow_dispatch')",
            )),
        ),
        ("runs-on", string(config.runner())),
        (
            "outputs",
            mapping([(
                "version",
                string(expression("steps.calculate.outputs.version")),
            )]),
        ),
        (
            "steps",
            sequence([
                checkout(true),
                mapping([
                    ("id", string("calculate")),
                    ("uses", string(local_action(config, "calculate-version"))),
                    (
                        "with",
                        mapping([
                            ("override", string(expression("inputs.version"))),
                            ("branch", string(expression("github.ref_name"))),
                            ("final-branch", string(config.final_branch())),
                        ]),
                    ),
                ]),
            ]),
        ),
    ])
}

fn tag_job(config: &PipelineConfig) -> Value {
    let branch = config.initial_branch();
    mapping([
        ("needs", sequence(["changes", "version"])),
        (
            "if",
            string(push_guard(&format!("github.ref_name == {}", quoted(&branch)))),
        ),
        ("runs-on", string(config.runner())),
        (
            "steps",
            sequence([
                checkout(true),
                mapping([
                    ("uses", string(local_action(config, "create-tag"))),
                    (
                        "with",
                        mapping([(
                            "version",
                            string(expression("needs.version.outputs.version")),
                        )]),
                    ),
                ]),
            ]),
        ),
    ])
}

/// `${{ }}` bodies mapping the current branch to its successor and auto-merge flag.
fn promotion_expressions(config: &PipelineConfig) -> (String, String) {
    let flow = config.branch_flow();
    let targets = flow
        .windows(2)
        .map(|pair| {
            format!(
                "github.ref_name == {} && {}",
                quoted(&pair[0]),
                quoted(&pair[1])
            )
        })
        .collect::<Vec<_>>();
    let target = format!("{} || ''", targets.join(" || "));

    let automatic = flow
        .windows(2)
        .filter(|pair| config.auto_promotes_into(&pair[1]))
        .map(|pair| format!("github.ref_name == {}", quoted(&pair[0])))
        .collect::<Vec<_>>();
    let auto_merge = if automatic.is_empty() {
        "'false'".to_string()
    } else {
        format!("({}) && 'true' || 'false'", automatic.join(" || "))
    };
    (target, auto_merge)
}

fn promote_job(config: &PipelineConfig) -> Value {
    let (target, auto_merge) = promotion_expressions(config);
    mapping([
        ("needs", sequence(["version", "tag"])),
        (
            "if",
            string(expression(&format!(
                "always() && github.event_name == 'push' && github.ref_name != {} && needs.version.result == 'success' && needs.tag.result != 'failure'",
                quoted(&config.final_branch())
            ))),
        ),
        ("runs-on", string(config.runner())),
        (
            "steps",
            sequence([
                checkout(true),
                mapping([
                    ("uses", string(local_action(config, "promote-branch"))),
                    (
                        "with",
                        mapping([
                            ("source-branch", string(expression("github.ref_name"))),
                            ("target-branch", string(expression(&target))),
                            ("auto-merge", string(expression(&auto_merge))),
                            (
                                "version",
                                string(expression("needs.version.outputs.version")),
                            ),
                        ]),
                    ),
                ]),
            ]),
        ),
    ])
}

fn release_job(config: &PipelineConfig) -> Value {
    let branch = config.final_branch();
    mapping([
        ("needs", string("version")),
        (
            "if",
            string(push_guard(&format!("github.ref_name == {}", quoted(&branch)))),
        ),
        ("runs-on", string(config.runner())),
        (
            "steps",
            sequence([
                checkout(true),
                mapping([
                    ("uses", string(local_action(config, "create-release"))),
                    (
                        "with",
                        mapping([(
                            "version",
                            string(expression("needs.version.outputs.version")),
                        )]),
                    ),
                ]),
            ]),
        ),
    ])
}

fn placeholder_job(config: &PipelineConfig, prefix: &str, domain: &str) -> Value {
    let label = title_case(prefix);
    mapping([
        ("needs", sequence(["changes", "version"])),
        (
            "if",
            string(expression(&format!(
                "needs.changes.outputs.{domain} == 'true'"
            ))),
        ),
        ("runs-on", string(config.runner())),
        (
            "steps",
            sequence([
                checkout(false),
                mapping([
                    ("name", string(format!("{label} {domain}"))),
                    (
                        "run",
                        string(format!(
                            "echo \"Replace this step with the {prefix} commands for {domain}\""
                        )),
                    ),
                ]),
            ]),
        ),
    ])
}

fn title_case(prefix: &str) -> String {
    let words = prefix.replace(['-', '_'], " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
