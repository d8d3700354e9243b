use clap::{Args, Parser, Subcommand, ValueEnum};
use weft_core::logging::{self, LogFormat};
use weft_harness::scenario::{DESTROYED_RECEIVER_ERROR, RECEIVER_ALIAS, isolation};
use weft_harness::{ExpectedErrors, RaceScenario};
use weft_runtime::{CreationState, RuntimeConfig};

use crate::error::{DemoError, Result};
use crate::report::ScenarioReport;

#[derive(Debug, Parser)]
#[command(
    name = "weft-demo",
    about = "Replay the weft destroy race and batch isolation scenarios",
    version
)]
pub struct Cli {
    /// Log output format (filter via WEFT_LOG).
    #[arg(long = "log-format", value_enum, default_value_t = LogFormatArg::Text, global = true)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Destroy a component between queueing and encoding its fetch.
    Race(RaceArgs),

    /// Queue a clean and a poisoned action in one batch.
    Isolation(IsolationArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RaceArgs {
    /// Times the fetched component's config references the receiver.
    #[arg(long, default_value_t = 2)]
    pub sites: usize,

    /// Skip the destroying observer and let the fetch succeed.
    #[arg(long = "no-destroy")]
    pub no_destroy: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct IsolationArgs {
    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    logging::init(cli.log_format.into());
    let (scenario, result) = match cli.command {
        Commands::Race(args) => ("race", run_race(args)),
        Commands::Isolation(args) => ("isolation", run_isolation(args)),
    };
    match &result {
        Ok(()) => tracing::info!(message = "demo.finished", scenario),
        Err(err) => tracing::error!(message = "demo.failed", scenario, error = %err),
    }
    result
}

fn creation_label(state: &CreationState) -> String {
    match state {
        CreationState::Pending => "pending".into(),
        CreationState::Created(_) => "created".into(),
        CreationState::Failed(err) => format!("failed ({err})"),
    }
}

pub fn run_race(args: RaceArgs) -> Result<()> {
    let outcome = RaceScenario::new()
        .config(RuntimeConfig::from_env().with_wire_logging(true))
        .reference_sites(args.sites)
        .destroy_before_send(!args.no_destroy)
        .run()?;

    let rt = &outcome.runtime;
    let mut report = ScenarioReport::new("race")
        .requests(outcome.server.bodies())
        .errors(rt.errors())
        .detail("reference_sites", args.sites)
        .detail("destroyed_in_pre_send", outcome.destroyed_in_pre_send)
        .detail("on_complete_ran", outcome.completed)
        .detail("creation", creation_label(&outcome.creation.state()))
        .detail("receiver_found", rt.find(outcome.host, RECEIVER_ALIAS).is_some())
        .detail("turns", rt.turns_run());
    if let Some(fetch) = &outcome.fetch {
        report = report.action("getComponent", fetch);
    }
    report.print(args.json)?;

    if args.no_destroy {
        if !outcome.completed {
            return Err(DemoError::diverged("race", "creation did not complete"));
        }
        return Ok(());
    }
    ExpectedErrors::new()
        .expect_times(DESTROYED_RECEIVER_ERROR, args.sites)
        .verify(rt.errors())
        .map_err(|err| DemoError::diverged("race", err.to_string()))?;
    if outcome.completed {
        return Err(DemoError::diverged("race", "on_complete ran for a failed creation"));
    }
    Ok(())
}

pub fn run_isolation(args: IsolationArgs) -> Result<()> {
    let outcome = isolation(RuntimeConfig::from_env().with_wire_logging(true))?;
    ScenarioReport::new("isolation")
        .requests(outcome.server.bodies())
        .action("live", &outcome.live)
        .action("doomed", &outcome.doomed)
        .errors(outcome.runtime.errors())
        .detail("turns", outcome.runtime.turns_run())
        .print(args.json)?;

    let states = (outcome.live.state().as_str(), outcome.doomed.state().as_str());
    if states != ("completed", "errored") {
        return Err(DemoError::diverged(
            "isolation",
            format!("expected completed/errored, got {}/{}", states.0, states.1),
        ));
    }
    Ok(())
}
