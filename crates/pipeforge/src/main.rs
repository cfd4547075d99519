use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use pipeforge_core::config::{PipelineConfig, load_validated_config};
use pipeforge_core::generate::{GenerateOptions, GenerateReport, generate};
use pipeforge_core::jobs::placeholder_jobs;
use pipeforge_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, init_project, inspect_runtime, resolve_paths,
};

#[derive(Debug, Parser)]
#[command(
    name = "pipeforge",
    version,
    about = "Generate and maintain a CI pipeline workflow without clobbering hand-written jobs"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase log verbosity (-v, -vv, -vvv)")]
    verbose: u8,
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Write a starter .pipeforge.toml")]
    Init(InitArgs),
    #[command(about = "Regenerate the workflow and its actions")]
    Generate(GenerateArgs),
    #[command(about = "Exit non-zero when regeneration would change anything")]
    Check(CheckArgs),
    #[command(about = "Validate the configuration and show what it implies")]
    Validate,
    #[command(about = "Print resolved paths and where they came from")]
    Paths,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long, help = "Rebuild the workflow from scratch and overwrite modified actions")]
    force: bool,
    #[arg(long, help = "Show a diff instead of writing")]
    dry_run: bool,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
    #[arg(long, help = "Only generate the workflow file")]
    skip_actions: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[arg(long, help = "Only check the workflow file")]
    skip_actions: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Generate(args)) => run_generate(&runtime, args),
        Some(Commands::Check(args)) => run_check(&runtime, args),
        Some(Commands::Validate) => run_validate(&runtime),
        Some(Commands::Paths) => run_paths(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Logs go to stderr so `--json` output stays machine-readable.
fn init_tracing(verbose: u8, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match verbose {
        0 => "pipeforge=warn,pipeforge_core=error",
        1 => "pipeforge=info,pipeforge_core=info",
        2 => "pipeforge=debug,pipeforge_core=debug",
        _ => "pipeforge=trace,pipeforge_core=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let wrote_config = init_project(&paths, args.force)?;

    println!("Initialized pipeforge configuration");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("wrote_config: {}", format_flag(wrote_config));
    if !wrote_config {
        println!("hint: config already exists; pass --force to overwrite it");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_generate(runtime: &RuntimeOptions, args: GenerateArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_validated_config(&paths.config_path)?;
    let report = generate(
        &paths,
        &config,
        &GenerateOptions {
            force: args.force,
            dry_run: args.dry_run,
            include_actions: !args.skip_actions,
        },
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("generate");
        println!("project_root: {}", normalize_path(&paths.project_root));
        println!("dry_run: {}", format_flag(args.dry_run));
        println!("force: {}", format_flag(args.force));
        print_report(&report, args.dry_run);
        if runtime.diagnostics {
            println!("\n[diagnostics]\n{}", paths.diagnostics());
        }
    }

    if !report.is_success() {
        bail!("{} document(s) failed to generate", report.failures.len());
    }
    Ok(())
}

fn run_check(runtime: &RuntimeOptions, args: CheckArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_validated_config(&paths.config_path)?;
    let report = generate(
        &paths,
        &config,
        &GenerateOptions {
            force: false,
            dry_run: true,
            include_actions: !args.skip_actions,
        },
    );

    println!("check");
    println!("project_root: {}", normalize_path(&paths.project_root));
    print_report(&report, true);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    if !report.is_success() {
        bail!("{} document(s) failed to generate", report.failures.len());
    }
    if report.has_changes() {
        bail!("generated files are out of date; run `pipeforge generate`");
    }
    Ok(())
}

fn run_validate(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_validated_config(&paths.config_path)?;

    println!("config: valid");
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("pipeline.name: {}", config.name());
    println!("pipeline.branch_flow: {}", config.branch_flow().join(" -> "));
    println!("pipeline.initial_branch: {}", config.initial_branch());
    println!("pipeline.final_branch: {}", config.final_branch());
    println!("pipeline.runner: {}", config.runner());
    print_domains(&config);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_paths(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_validated_config(&paths.config_path)?;
    let status = inspect_runtime(&paths, &config);

    println!("paths");
    println!(
        "project_root: {} ({})",
        normalize_path(&paths.project_root),
        paths.root_source.as_str()
    );
    println!(
        "config_path: {} ({})",
        normalize_path(&paths.config_path),
        paths.config_source.as_str()
    );
    println!(
        "workflow_path: {}",
        normalize_path(&paths.workflow_path(&config))
    );
    println!("actions_dir: {}", normalize_path(&paths.actions_dir(&config)));
    println!(
        "project_root_exists: {}",
        format_flag(status.project_root_exists)
    );
    println!("config_exists: {}", format_flag(status.config_exists));
    println!("workflow_exists: {}", format_flag(status.workflow_exists));
    println!(
        "actions_dir_exists: {}",
        format_flag(status.actions_dir_exists)
    );
    print_warnings(&status.warnings);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn print_report(report: &GenerateReport, show_diff: bool) {
    for document in &report.documents {
        println!(
            "{}: {} (changed: {}, written: {})",
            document.path,
            document.status,
            format_flag(document.changed),
            format_flag(document.written)
        );
        for name in &document.placeholders_added {
            println!("  placeholder_added: {name}");
        }
        for name in &document.recovered_jobs {
            println!("  recovered_job: {name}");
        }
        for warning in &document.warnings {
            println!("  warning: {warning}");
        }
        if show_diff && let Some(diff) = &document.diff {
            print!("{diff}");
        }
    }
    for failure in &report.failures {
        println!("{}: failed", failure.path);
        println!("  error: {}", failure.error);
    }
}

fn print_domains(config: &PipelineConfig) {
    println!("domains.count: {}", config.domains.len());
    for (name, domain) in &config.domains {
        println!(
            "domain.{name}: paths=[{}] prefixes=[{}]{}",
            domain.paths.join(", "),
            domain.resolved_prefixes().join(", "),
            domain
                .description
                .as_deref()
                .map(|description| format!(" description={description}"))
                .unwrap_or_default()
        );
    }
    let mut names = placeholder_jobs(config)
        .iter()
        .map(|placeholder| placeholder.name())
        .collect::<Vec<_>>();
    names.sort();
    if names.is_empty() {
        println!("placeholders: <none>");
    } else {
        println!("placeholders: {}", names.join(", "));
    }
}

fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!("warnings:");
    for warning in warnings {
        println!("  - {warning}");
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    let resolved = resolve_paths(&context, &overrides)?;
    tracing::debug!(
        project_root = %resolved.project_root.display(),
        root_source = resolved.root_source.as_str(),
        config_source = resolved.config_source.as_str(),
        "resolved runtime paths"
    );
    Ok(resolved)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, LogFormat};

    #[test]
    fn parses_generate_flags() {
        let cli = Cli::try_parse_from([
            "pipeforge",
            "--project-root",
            "/repo",
            "-vv",
            "generate",
            "--dry-run",
            "--skip-actions",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Text));
        match cli.command {
            Some(Commands::Generate(args)) => {
                assert!(args.dry_run);
                assert!(args.skip_actions);
                assert!(!args.force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["pipeforge", "check", "--log-format", "json", "--diagnostics"])
            .expect("parse");
        assert!(cli.diagnostics);
        assert!(matches!(cli.log_format, LogFormat::Json));
        assert!(matches!(cli.command, Some(Commands::Check(_))));
    }
}
