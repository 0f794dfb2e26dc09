//! Thin CLI wrapper: `status`, `make`, `migrate [<target>]`, `help`.
//! Parses arguments, loads configuration, and prints the engine's own
//! structured output; it owns none of the migration logic itself.

use schema_connector::{ActionCategory, PromptReply, Prompter};
use schema_core::{Config, Migrator, Target};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "schema-engine", about = "Declarative SQLite schema migrations")]
struct Opt {
    /// Path to the migrator's TOML config file.
    #[structopt(long, default_value = "migrator.toml")]
    config: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Print the current migration state without changing anything.
    Status,
    /// Diff the declarative schema against migration history and write a
    /// new migration file if anything changed.
    Make,
    /// Apply or reverse migrations to reach `target` (a 4-digit id,
    /// `latest`, or `zero`). Defaults to `latest`.
    Migrate {
        target: Option<String>,
        /// Compute and log the undo/redo plan without changing the
        /// database: the transaction is rolled back unconditionally.
        #[structopt(long)]
        dry_run: bool,
    },
}

struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn prompt(&self, category: ActionCategory, description: &str) -> PromptReply {
        loop {
            print!("[{category:?}] {description} — proceed, skip, or require manual migration? [y/n/m] ");
            let _ = io::stdout().flush();
            let mut line = String::new();
            if io::stdin().read_line(&mut line).is_err() {
                return PromptReply::Skip;
            }
            if let Some(reply) = PromptReply::parse(&line) {
                return reply;
            }
            println!("please answer y, n, or m");
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();

    let config = match Config::load_or_default(&opt.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut migrator = match Migrator::open(config) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let prompter = StdinPrompter;

    let result = match opt.command {
        Command::Status => run_status(&mut migrator),
        Command::Make => run_make(&mut migrator, &prompter),
        Command::Migrate { target, dry_run } => {
            let target = target.as_deref().map(Target::parse).unwrap_or(Target::Latest);
            run_migrate(&mut migrator, target, dry_run, &prompter)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_status(migrator: &mut Migrator) -> Result<(), String> {
    let report = migrator.status().map_err(|e| e.to_string())?;
    println!("current migration: {}", report.current_id);
    if let Some(name) = &report.current_name {
        println!("  name: {name}");
    }
    if !report.missing_migrations.is_empty() {
        println!("missing migrations (on disk, not applied): {:?}", report.missing_migrations);
    }
    if !report.extra_migrations.is_empty() {
        println!("extra migrations (applied, not on disk): {:?}", report.extra_migrations);
    }
    println!("schema changes pending: {}", report.has_schema_changes);
    println!("live data diverged from history: {}", report.has_tampered_data);
    if let Some(err) = &report.schema_diff_error {
        println!("schema diff error: {err}");
    }
    Ok(())
}

fn run_make(migrator: &mut Migrator, prompter: &dyn Prompter) -> Result<(), String> {
    match migrator.make(prompter) {
        Ok(Some(file)) => {
            println!("wrote migration {}_{}", file.id, file.name);
            Ok(())
        }
        Ok(None) => {
            println!("no changes detected");
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

fn run_migrate(migrator: &mut Migrator, target: Target, dry_run: bool, prompter: &dyn Prompter) -> Result<(), String> {
    let report = if dry_run {
        migrator.migrate_dry_run(target, prompter).map_err(|e| e.to_string())?
    } else {
        migrator.migrate(target, prompter).map_err(|e| e.to_string())?
    };
    if report.no_op {
        println!("already at target, nothing to do");
        return Ok(());
    }
    let prefix = if dry_run { "[dry run] " } else { "" };
    if !report.undone.is_empty() {
        println!("{prefix}undone: {:?}", report.undone);
    }
    if !report.applied.is_empty() {
        println!("{prefix}applied: {:?}", report.applied);
    }
    Ok(())
}
