use anyhow::Context;
use clap::{Parser, Subcommand};
use fieldcalc::cli;
use fieldcalc::{EngineConfig, FormulaEngine, ResultType};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fieldcalc")]
#[command(about = "Computed-field formulas: validate, correct, evaluate and aggregate over records.")]
#[command(long_about = "fieldcalc - computed-field formula engine

Formulas are small JavaScript-flavoured expressions over the fields of a
record (JSON or YAML). Field names are checked before evaluation, and
mistyped names are corrected to the closest existing field.

COMMANDS:
  extract    - List the field references of a formula
  validate   - Check references against a sample record
  correct    - Rewrite mistyped field names
  evaluate   - Evaluate a formula against a record
  aggregate  - Build chart points from a record set
  audit      - Show formula dependency order / cycles

EXAMPLES:
  fieldcalc extract \"won / (won + lost) * 100\"
  fieldcalc validate \"convertedAt - created_at\" --record deal.json
  fieldcalc evaluate \"converted_at - created_at\" --record deal.json --result-type duration
  fieldcalc aggregate --records deals.json --formulas formulas.yaml --charts charts.yaml")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (YAML)
    #[arg(long, global = true, env = "FIELDCALC_CONFIG")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    /// Show debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the field references of a formula
    Extract {
        /// Formula text
        formula: String,
    },

    /// Check a formula's field references against a sample record
    Validate {
        /// Formula text
        formula: String,

        /// Sample record (JSON or YAML)
        #[arg(short, long)]
        record: PathBuf,

        /// Sibling formula fields whose ids count as fields
        #[arg(short, long)]
        formulas: Option<PathBuf>,
    },

    /// Rewrite unresolved field names with their closest match
    Correct {
        /// Formula text
        formula: String,

        /// Sample record (JSON or YAML)
        #[arg(short, long)]
        record: PathBuf,

        /// Sibling formula fields whose ids count as fields
        #[arg(short, long)]
        formulas: Option<PathBuf>,
    },

    #[command(long_about = "Evaluate a formula against one record.

The formula is corrected first (mistyped field names are replaced by their
closest match) unless --no-correct is given. Other formula fields can be
referenced by id when --formulas is given.

RESULT TYPES:
  number, string, date, boolean  - value is printed as computed
  duration                       - seconds are rendered as minutes/hours/days")]
    /// Evaluate a formula against a record
    Evaluate {
        /// Formula text
        formula: String,

        /// Record (JSON or YAML)
        #[arg(short, long)]
        record: PathBuf,

        /// Sibling formula fields (JSON or YAML list)
        #[arg(short, long)]
        formulas: Option<PathBuf>,

        /// Declared result type
        #[arg(short = 't', long)]
        result_type: Option<ResultType>,

        /// Evaluate the formula exactly as written
        #[arg(long)]
        no_correct: bool,
    },

    /// Build chart points from a record set
    Aggregate {
        /// Records (JSON or YAML list)
        #[arg(long)]
        records: PathBuf,

        /// Formula fields evaluated per record
        #[arg(long)]
        formulas: PathBuf,

        /// Chart specs (x_field, y_field, aggregation)
        #[arg(long)]
        charts: PathBuf,
    },

    /// Show the dependency order of formula fields
    Audit {
        /// Formula fields (JSON or YAML list)
        #[arg(long)]
        formulas: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "fieldcalc=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let engine = FormulaEngine::new(config);
    let json = cli.json;

    let outcome = match cli.command {
        Commands::Extract { formula } => cli::extract(&engine, &formula, json),

        Commands::Validate {
            formula,
            record,
            formulas,
        } => cli::validate(&engine, &formula, record, formulas, json),

        Commands::Correct {
            formula,
            record,
            formulas,
        } => cli::correct(&engine, &formula, record, formulas, json),

        Commands::Evaluate {
            formula,
            record,
            formulas,
            result_type,
            no_correct,
        } => cli::evaluate(
            &engine,
            &formula,
            record,
            formulas,
            result_type,
            no_correct,
            json,
        ),

        Commands::Aggregate {
            records,
            formulas,
            charts,
        } => cli::aggregate(&engine, records, formulas, charts, json),

        Commands::Audit { formulas } => cli::audit(formulas, json),
    };

    outcome?;
    Ok(())
}
