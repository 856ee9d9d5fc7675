use anyhow::Context;
use bootstrap_app::{plan, provision, verify, VerificationReport, VerifyOptions};
use bootstrap_db::MongoCatalog;
use bootstrap_kernel::settings::{Mode, Settings};
use bootstrap_kernel::{BootstrapError, PlannedStep, RunReport};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::Instrument;
use uuid::Uuid;

/// Provision the application database: user, role, collections and indexes.
#[derive(Parser, Debug)]
#[command(name = "bootstrap-cli", version)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Command-line overrides, applied on top of the loaded settings.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Administrative connection string (overrides database.uri)
    #[arg(long, global = true)]
    uri: Option<String>,

    /// Target database name (overrides database.name)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Create every object and fail on the first one that already exists
    #[arg(long, global = true, conflicts_with = "ensure")]
    strict: bool,

    /// Converge on the configured state, leaving existing objects in place
    #[arg(long, global = true)]
    ensure: bool,

    /// Revert this run's changes when a step fails
    #[arg(long, global = true)]
    rollback: bool,

    /// Skip index creation and index checks
    #[arg(long, global = true)]
    no_indexes: bool,
}

impl Overrides {
    fn apply(&self, settings: &mut Settings) {
        if let Some(uri) = &self.uri {
            settings.database.uri = uri.clone();
        }
        if let Some(database) = &self.database {
            settings.database.name = database.clone();
        }
        if self.strict {
            settings.run.mode = Mode::Strict;
        }
        if self.ensure {
            settings.run.mode = Mode::Ensure;
        }
        if self.rollback {
            settings.run.rollback_on_failure = true;
        }
        if self.no_indexes {
            settings.run.create_indexes = false;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply every provisioning step in order
    Run {
        /// Output format
        #[arg(long, value_enum, default_value_t = Output::Text)]
        output: Output,
    },
    /// Check that the server matches the configuration
    Verify {
        /// Also require every configured collection to be empty
        #[arg(long)]
        expect_empty: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = Output::Text)]
        output: Output,
    },
    /// Print the steps a run would perform, without connecting
    Plan {
        /// Output format
        #[arg(long, value_enum, default_value_t = Output::Text)]
        output: Output,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Output {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load().with_context(|| "failed to load bootstrap settings")?;
    cli.overrides.apply(&mut settings);

    bootstrap_telemetry::init(&settings.telemetry)
        .with_context(|| "failed to initialize telemetry")?;

    let run_id = Uuid::now_v7();
    let span = tracing::info_span!("bootstrap", %run_id, env = %settings.environment);
    execute(cli.command, &settings).instrument(span).await
}

async fn execute(command: Command, settings: &Settings) -> anyhow::Result<()> {
    match command {
        Command::Plan { output } => {
            let steps = plan(settings).with_context(|| "settings rejected")?;
            match output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&steps)?),
                Output::Text => print_plan(settings, &steps),
            }
        }
        Command::Run { output } => {
            settings.validate().with_context(|| "settings rejected")?;
            let catalog = connect(settings).await?;

            tracing::info!(
                database = %settings.database.name,
                uri = %settings.database.redacted_uri(),
                mode = %settings.run.mode,
                "provisioning started"
            );
            let report = match provision(settings, &catalog).await {
                Ok(report) => report,
                Err(err) => {
                    print_failure(&err);
                    return Err(anyhow::Error::new(err).context(format!(
                        "provisioning database '{}' failed",
                        settings.database.name
                    )));
                }
            };
            tracing::info!(changes = report.changes.len(), "provisioning complete");

            match output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                Output::Text => print_run(&report),
            }
        }
        Command::Verify {
            expect_empty,
            output,
        } => {
            settings.validate().with_context(|| "settings rejected")?;
            let catalog = connect(settings).await?;

            let report = verify(settings, &catalog, VerifyOptions { expect_empty })
                .await
                .with_context(|| {
                    format!("verifying database '{}' failed", settings.database.name)
                })?;

            match output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                Output::Text => print_verification(&report),
            }
            report
                .into_result()
                .with_context(|| "provisioned state does not match the configuration")?;
        }
    }

    Ok(())
}

async fn connect(settings: &Settings) -> anyhow::Result<MongoCatalog> {
    MongoCatalog::connect(&settings.database.uri, settings.database.connect_options())
        .await
        .with_context(|| {
            format!(
                "failed to configure client for {}",
                settings.database.redacted_uri()
            )
        })
}

fn print_plan(settings: &Settings, steps: &[PlannedStep]) {
    println!(
        "plan for database '{}' (mode: {}, rollback: {})",
        settings.database.name,
        settings.run.mode,
        if settings.run.rollback_on_failure {
            "on"
        } else {
            "off"
        }
    );
    for (position, step) in steps.iter().enumerate() {
        println!("{:>2}. {:<20} {}", position + 1, step.step, step.description);
    }
}

fn print_run(report: &RunReport) {
    println!("database '{}'", report.database);
    for step in &report.steps {
        println!("  {:<20} {}", step.step, step.outcome);
    }
    for change in &report.changes {
        println!("  + {change}");
    }
}

/// Tell the operator what a failed run left behind on the server.
fn print_failure(err: &BootstrapError) {
    if let Some(failures) = err.rollback_failures() {
        for failure in failures {
            eprintln!("rollback error: {}", failure_chain(failure));
        }
    }
    for change in err.left_in_place() {
        eprintln!("left in place: {change}");
    }
}

fn failure_chain(err: &BootstrapError) -> String {
    let mut chain = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

fn print_verification(report: &VerificationReport) {
    println!("database '{}'", report.database);
    for check in &report.checks {
        let mark = if check.passed { "ok  " } else { "FAIL" };
        println!("  [{mark}] {}", check.detail);
    }
    for warning in &report.warnings {
        println!("  [warn] {warning}");
    }
}
