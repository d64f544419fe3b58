//! Battery acceptance-test tracker CLI.
//!
//! Records live under `.tracker/tests/` in the project root. Results are
//! printed to stdout as JSON; failures go to stderr with a stable exit code.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use tracker::core::types::{NewReading, NewTest};
use tracker::error::TrackerError;
use tracker::exit_codes;
use tracker::io::config::load_config;
use tracker::io::export::{ExportScope, write_csv};
use tracker::io::init::{InitOptions, TrackerPaths, ensure_layout, init_tracker};
use tracker::io::store::{JsonStore, load_test};
use tracker::logging;
use tracker::record::ReadingKind;
use tracker::service::TestLifecycle;

#[derive(Parser)]
#[command(name = "tracker", version, about = "Battery acceptance-test tracker")]
struct Cli {
    /// Project root containing `.tracker/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.tracker/` with default config.
    Init {
        /// Rewrite config and scaffolding; stored tests are kept.
        #[arg(short, long)]
        force: bool,
    },
    /// Create a test from a JSON file describing the test and its banks.
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    /// Record an OCV or CCV reading on a cycle.
    Reading(ReadingArgs),
    /// Close a cycle.
    Complete {
        #[arg(long)]
        cycle: Uuid,
        /// End time (RFC 3339). Defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Print the status report of a test.
    Status {
        #[arg(long)]
        test: Uuid,
    },
    /// List tests ordered by creation time.
    List {
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Export readings as CSV.
    Export(ExportArgs),
    /// Delete a test and everything it owns.
    Delete {
        #[arg(long)]
        test: Uuid,
    },
    /// Check every stored test against the schema and invariants.
    Validate,
}

#[derive(Args)]
struct ReadingArgs {
    #[arg(long)]
    cycle: Uuid,
    #[command(flatten)]
    kind: KindFlags,
    /// Cell voltages in cell order, comma separated.
    #[arg(long, value_delimiter = ',', required = true)]
    values: Vec<f64>,
    /// Minutes since the previous CCV reading.
    #[arg(long)]
    interval: Option<u32>,
    /// Reading time (RFC 3339). Defaults to now.
    #[arg(long)]
    at: Option<DateTime<Utc>>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct KindFlags {
    #[arg(long)]
    ocv: bool,
    #[arg(long)]
    ccv: bool,
}

#[derive(Args)]
struct ExportArgs {
    #[command(flatten)]
    target: ExportTarget,
    /// Write to a file instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ExportTarget {
    #[arg(long)]
    test: Option<Uuid>,
    #[arg(long)]
    bank: Option<Uuid>,
    #[arg(long)]
    cycle: Option<Uuid>,
}

impl ExportTarget {
    fn scope(&self) -> Result<ExportScope> {
        match (self.test, self.bank, self.cycle) {
            (Some(id), None, None) => Ok(ExportScope::Test(id)),
            (None, Some(id), None) => Ok(ExportScope::Bank(id)),
            (None, None, Some(id)) => Ok(ExportScope::Cycle(id)),
            _ => Err(anyhow!("export needs exactly one of --test, --bank, --cycle")),
        }
    }
}

fn main() {
    logging::init("warn");
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            err.downcast_ref::<TrackerError>()
                .map(exit_codes::for_error)
                .unwrap_or(exit_codes::FAILED)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Init { force } = cli.command {
        let paths = init_tracker(&cli.root, &InitOptions { force })?;
        return print_json(&json!({ "tracker_dir": paths.tracker_dir }));
    }

    let paths = TrackerPaths::new(&cli.root);
    ensure_layout(&paths)?;
    if let Command::Validate = cli.command {
        return cmd_validate(&paths);
    }

    let config = load_config(&paths.config_path)?;
    let mut service = TestLifecycle::new(JsonStore::new(&paths.tests_dir), config);

    match cli.command {
        Command::Init { .. } | Command::Validate => Ok(()),
        Command::Create { file } => {
            let input = read_new_test(&file)?;
            print_json(&service.create_test(&input)?)
        }
        Command::Reading(args) => {
            let input = NewReading {
                kind: if args.kind.ocv {
                    ReadingKind::Ocv
                } else {
                    ReadingKind::Ccv
                },
                cell_values: args.values,
                timestamp: args.at,
                time_interval: args.interval,
            };
            print_json(&service.submit_reading(args.cycle, &input)?)
        }
        Command::Complete { cycle, at } => print_json(&service.complete_cycle(cycle, at)?),
        Command::Status { test } => print_json(&service.get_test_status(test)?),
        Command::List { skip, limit } => print_json(&service.list_tests(skip, limit)?),
        Command::Export(args) => {
            let export = service.export_csv(args.target.scope()?)?;
            match args.out {
                Some(path) => {
                    write_csv(&path, &export.contents)?;
                    print_json(&json!({ "path": path }))
                }
                None => {
                    print!("{}", export.contents);
                    Ok(())
                }
            }
        }
        Command::Delete { test } => {
            service.delete_test(test)?;
            print_json(&json!({ "deleted": test }))
        }
    }
}

fn read_new_test(path: &Path) -> Result<NewTest> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let input: NewTest =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(input)
}

/// Load every `*.json` document, reporting all failures at once.
fn cmd_validate(paths: &TrackerPaths) -> Result<()> {
    load_config(&paths.config_path)?;
    let entries = fs::read_dir(&paths.tests_dir)
        .with_context(|| format!("read directory {}", paths.tests_dir.display()))?;

    let mut checked = 0usize;
    let mut failures = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        checked += 1;
        if let Err(err) = load_test(&path) {
            failures.push(format!("{:#}", err));
        }
    }
    if !failures.is_empty() {
        return Err(anyhow!(
            "{} of {} tests invalid:\n- {}",
            failures.len(),
            checked,
            failures.join("\n- ")
        ));
    }
    print_json(&json!({ "tests": checked, "valid": true }))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["tracker", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_reading_values() {
        let id = Uuid::new_v4().to_string();
        let cli = Cli::parse_from([
            "tracker", "reading", "--cycle", &id, "--ccv", "--values", "3.1,3.2", "--interval",
            "30",
        ]);
        let Command::Reading(args) = cli.command else {
            panic!("expected reading");
        };
        assert!(args.kind.ccv);
        assert_eq!(args.values, vec![3.1, 3.2]);
        assert_eq!(args.interval, Some(30));
    }

    #[test]
    fn reading_requires_exactly_one_kind() {
        let id = Uuid::new_v4().to_string();
        assert!(
            Cli::try_parse_from(["tracker", "reading", "--cycle", &id, "--values", "3.1"]).is_err()
        );
        assert!(
            Cli::try_parse_from([
                "tracker", "reading", "--cycle", &id, "--ocv", "--ccv", "--values", "3.1"
            ])
            .is_err()
        );
    }

    #[test]
    fn export_target_maps_to_scope() {
        let id = Uuid::new_v4();
        let cli = Cli::parse_from(["tracker", "export", "--bank", &id.to_string()]);
        let Command::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.target.scope().expect("scope"), ExportScope::Bank(id));
    }
}
