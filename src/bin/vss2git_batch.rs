//! CLI: migrate a selection of source projects into git repositories.
//!
//! Usage: `vss2git-batch [--settings FILE] <migrate|list|select> ...`
//! Example: vss2git-batch migrate --catalog repo.json --output /srv/migrated
//!
//! Set RUST_LOG=vss2git_batch=debug for per-phase spans.

use std::collections::VecDeque;
use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};
use vss2git_batch::settings::SETTINGS_FILENAME;
use vss2git_batch::{
  BatchReport, CatalogReader, CommandEngine, OutputLayout, PipelineController, ProjectIndex,
  ProjectKey, SelectionOutcome, Settings,
};

/// Exit status when the batch finished but not every selection succeeded.
const EXIT_INCOMPLETE: i32 = 2;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Batch-migrate source projects into independent git repositories.
#[derive(Parser, Debug)]
#[command(name = "vss2git-batch", version)]
#[command(
  after_help = r#"Environment variables (override --settings and --output when set):
  VSS2GIT_SETTINGS   Settings file (default: vss2git.toml).
  VSS2GIT_OUTPUT     Output root holding _success, _fail, staging and batch logs.

Examples:
  vss2git-batch select add '$/Product/App' '$/Product/Lib|BAAAAAAA'
  vss2git-batch migrate --catalog repo.json --output /srv/migrated --converter vss-export
  vss2git-batch list --catalog repo.json --output /srv/migrated"#
)]
struct Cli {
  /// Settings file. Overridden by VSS2GIT_SETTINGS if set.
  #[arg(long, global = true, value_name = "FILE", default_value = SETTINGS_FILENAME)]
  settings: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Migrate the selected projects.
  Migrate(MigrateArgs),
  /// List every project in the catalog with its selection key.
  List(SourceArgs),
  /// Edit the saved selection.
  Select {
    #[command(subcommand)]
    action: SelectAction,
  },
}

#[derive(Args, Debug)]
struct SourceArgs {
  /// JSON catalog of the source repository. Defaults to the settings value.
  #[arg(long, value_name = "FILE")]
  catalog: Option<PathBuf>,

  /// Output root. Overridden by VSS2GIT_OUTPUT if set.
  #[arg(long, value_name = "DIR")]
  output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MigrateArgs {
  #[command(flatten)]
  source: SourceArgs,

  /// Converter command run once per project. Defaults to the settings value.
  #[arg(long, value_name = "CMD", env = "VSS2GIT_CONVERTER")]
  converter: Option<String>,

  /// Migrate projects even when a successful result already exists.
  #[arg(long)]
  no_skip_migrated: bool,

  /// Print the batch report as JSON.
  #[arg(long)]
  json: bool,

  /// Keys to migrate instead of the saved selection (`path` or `path|physicalId`).
  #[arg(value_name = "KEY")]
  keys: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum SelectAction {
  /// Add keys to the selection.
  Add {
    #[arg(value_name = "KEY", required = true)]
    keys: Vec<String>,
  },
  /// Remove keys from the selection.
  Remove {
    #[arg(value_name = "KEY", required = true)]
    keys: Vec<String>,
  },
  /// Print the selection.
  Show,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::CLOSE)
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  // Env vars override flags. These are the values used by the program (not read from env again).
  let settings_path = env::var("VSS2GIT_SETTINGS")
    .ok()
    .map(PathBuf::from)
    .unwrap_or_else(|| cli.settings.clone());

  let result = match cli.command {
    Command::Migrate(args) => migrate(&settings_path, args).await,
    Command::List(args) => list(&settings_path, args),
    Command::Select { action } => select(&settings_path, action),
  };
  match result {
    Ok(code) => process::exit(code),
    Err(e) => {
      eprintln!("Error: {e}");
      let mut source = e.source();
      while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
      }
      process::exit(1);
    }
  }
}

fn output_dir(flag: Option<PathBuf>, settings: &Settings) -> Option<PathBuf> {
  env::var("VSS2GIT_OUTPUT")
    .ok()
    .map(PathBuf::from)
    .or(flag)
    .or_else(|| settings.output_dir.clone())
}

fn parse_keys(keys: &[String]) -> CliResult<Vec<ProjectKey>> {
  let keys = keys
    .iter()
    .map(|k| ProjectKey::from_combined(k.trim()))
    .collect::<Result<Vec<_>, _>>()?;
  Ok(keys)
}

async fn migrate(settings_path: &Path, args: MigrateArgs) -> CliResult<i32> {
  let settings = Settings::load_or_default(settings_path)?;
  let catalog = args
    .source
    .catalog
    .clone()
    .or_else(|| settings.source_catalog.clone())
    .ok_or("no source catalog: pass --catalog or set source_catalog")?;
  let output = output_dir(args.source.output.clone(), &settings)
    .ok_or("no output directory: pass --output, set VSS2GIT_OUTPUT or output_dir")?;
  let converter = args
    .converter
    .clone()
    .or_else(|| settings.converter_command.clone())
    .ok_or("no converter: pass --converter, set VSS2GIT_CONVERTER or converter_command")?;

  let mut config = settings.to_config()?;
  if args.no_skip_migrated {
    config.skip_migrated = false;
  }
  let keys = if args.keys.is_empty() {
    settings.selected_projects()?
  } else {
    parse_keys(&args.keys)?
  };
  if keys.is_empty() {
    eprintln!("Nothing selected. Add projects with `vss2git-batch select add <KEY>`.");
    return Ok(0);
  }
  info!(
    catalog = %catalog.display(),
    output = %output.display(),
    selections = keys.len(),
    "options (env, flags or settings)"
  );

  let reader = Arc::new(CatalogReader::load(&catalog)?);
  let engine = Arc::new(CommandEngine::new(&converter)?.with_source(&catalog));
  let mut controller = PipelineController::new(config, OutputLayout::new(output), reader, engine);

  let handle = controller.handle();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received; stopping after the active project");
      handle.cancel();
    }
  });

  let report = controller.run(VecDeque::from(keys)).await?;
  if args.json {
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    print_report(&report);
  }
  Ok(if report.is_clean() { 0 } else { EXIT_INCOMPLETE })
}

fn print_report(report: &BatchReport) {
  for s in &report.selections {
    let (status, detail) = match &s.outcome {
      SelectionOutcome::Succeeded { destination } => ("ok", destination.display().to_string()),
      SelectionOutcome::Failed {
        destination: Some(d),
      } => ("FAILED", d.display().to_string()),
      SelectionOutcome::Failed { destination: None } => ("FAILED", "nothing committed".into()),
      SelectionOutcome::Cancelled {
        staging_dir: Some(d),
      } => ("cancelled", format!("staging left at {}", d.display())),
      SelectionOutcome::Cancelled { staging_dir: None } => ("cancelled", String::new()),
      SelectionOutcome::Skipped { reason } => ("skipped", reason.clone()),
      SelectionOutcome::Unresolved { error } => ("FAILED", error.clone()),
    };
    println!("{status:<10} {}  {detail}", s.key.display_name());
  }
  println!(
    "Batch finished: {} succeeded, {} failed, {} skipped{}",
    report.succeeded(),
    report.failed(),
    report.skipped(),
    if report.cancelled { " (cancelled)" } else { "" }
  );
  if let Some(path) = &report.error_log {
    println!("Errors: {}", path.display());
  }
}

fn list(settings_path: &Path, args: SourceArgs) -> CliResult<i32> {
  let settings = Settings::load_or_default(settings_path)?;
  let catalog = args
    .catalog
    .clone()
    .or_else(|| settings.source_catalog.clone())
    .ok_or("no source catalog: pass --catalog or set source_catalog")?;
  let layout = output_dir(args.output, &settings).map(OutputLayout::new);
  let reader = CatalogReader::load(&catalog)?;
  let index = ProjectIndex::build(&reader);
  for (key, _) in index.entries()? {
    let done = layout.as_ref().is_some_and(|l| l.is_migrated(&key));
    println!(
      "{}\t{}{}",
      key.to_combined(),
      key.display_name(),
      if done { " [done]" } else { "" }
    );
  }
  Ok(0)
}

fn select(settings_path: &Path, action: SelectAction) -> CliResult<i32> {
  let mut settings = Settings::load_or_default(settings_path)?;
  let (added, keys) = match action {
    SelectAction::Show => {
      for key in settings.selected_projects()? {
        println!("{}", key.to_combined());
      }
      return Ok(0);
    }
    SelectAction::Add { keys } => (true, parse_keys(&keys)?),
    SelectAction::Remove { keys } => (false, parse_keys(&keys)?),
  };
  let mut changed = 0;
  for key in &keys {
    let hit = if added {
      settings.select(key)
    } else {
      settings.deselect(key)
    };
    changed += usize::from(hit);
  }
  settings.save(settings_path)?;
  println!(
    "{} {changed} project(s); {} selected",
    if added { "Added" } else { "Removed" },
    settings.projects.len()
  );
  Ok(0)
}
