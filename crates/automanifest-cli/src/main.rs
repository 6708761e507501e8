use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use automanifest_api::{
    Coordinator, JsonActivitySource, PlannerApi, PlannerConfig, RefreshOutcome, SqliteScheduler,
};
use automanifest_core::{derive_saved_state, expand, histogram, ActivitySummary, HistogramShape, Seed};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use time::OffsetDateTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "am")]
#[command(about = "AutoManifest daily planner CLI")]
struct Cli {
    /// Database path; overrides `db_path` from the config file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Refresh(RefreshArgs),
    Bootstrap(BootstrapArgs),
    Show,
    Intention {
        #[command(subcommand)]
        command: IntentionCommand,
    },
    Verify,
    Derive(DeriveArgs),
    Plot(PlotArgs),
    Nudges {
        #[command(subcommand)]
        command: NudgesCommand,
    },
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Debug, Args)]
struct RefreshArgs {
    #[arg(long, default_value_t = false)]
    force: bool,
    #[command(flatten)]
    activity: ActivityArgs,
}

#[derive(Debug, Args)]
struct BootstrapArgs {
    #[command(flatten)]
    activity: ActivityArgs,
}

#[derive(Debug, Args)]
struct ActivityArgs {
    /// JSON export of calendar events and completed reminders.
    #[arg(long)]
    activity: PathBuf,
    /// Evaluation instant; defaults to the local clock.
    #[arg(long)]
    now: Option<String>,
}

#[derive(Debug, Subcommand)]
enum IntentionCommand {
    Set(IntentionSetArgs),
    Show,
}

#[derive(Debug, Args)]
struct IntentionSetArgs {
    #[arg(long)]
    text: String,
}

#[derive(Debug, Args)]
struct DeriveArgs {
    #[arg(long)]
    seed_hex: String,
    /// Start of the summarized day (RFC 3339).
    #[arg(long)]
    day: String,
    #[arg(long, default_value_t = 0)]
    events: u32,
    #[arg(long, default_value_t = 0)]
    focus: u32,
    #[arg(long, default_value_t = 0)]
    reminders: u32,
    #[arg(long, default_value_t = 0)]
    streak: u32,
    #[arg(long)]
    intention: Option<String>,
}

#[derive(Debug, Args)]
struct PlotArgs {
    #[arg(long, default_value_t = 64)]
    bins: usize,
    #[arg(long, default_value_t = 8)]
    height: u64,
}

#[derive(Debug, Subcommand)]
enum NudgesCommand {
    List,
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    IntegrityCheck,
    Backup(DbBackupArgs),
    Restore(DbRestoreArgs),
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct DbBackupArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct DbRestoreArgs {
    #[arg(long = "in")]
    input: PathBuf,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(&cli)?;
    let api = PlannerApi::new(config.db_path.clone());
    match cli.command {
        Command::Refresh(args) => run_refresh(&config, &args),
        Command::Bootstrap(args) => run_bootstrap(&config, &args),
        Command::Show => run_show(&api),
        Command::Intention { command } => run_intention(command, &config, &api),
        Command::Verify => run_verify(&api),
        Command::Derive(args) => run_derive(&args, &config),
        Command::Plot(args) => run_plot(&args, &config, &api),
        Command::Nudges { command } => match command {
            NudgesCommand::List => run_nudges_list(&api),
        },
        Command::Db { command } => run_db(command, &api),
    }
}

fn load_config(cli: &Cli) -> Result<PlannerConfig> {
    let mut config = match cli.config.as_ref() {
        Some(path) => PlannerConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PlannerConfig::default(),
    };
    if let Some(db) = cli.db.as_ref() {
        config.db_path.clone_from(db);
    }
    Ok(config)
}

fn mk_coordinator(
    config: &PlannerConfig,
    activity: &ActivityArgs,
) -> Result<Coordinator<JsonActivitySource, SqliteScheduler>> {
    let source = JsonActivitySource::from_path(&activity.activity)?;
    let scheduler = SqliteScheduler::new(config.db_path.clone());
    Ok(Coordinator::new(config.clone(), source, scheduler))
}

fn emit_outcome(outcome: &RefreshOutcome) -> Result<()> {
    emit_json(serde_json::to_value(outcome).context("failed to serialize refresh outcome")?)
}

fn run_refresh(config: &PlannerConfig, args: &RefreshArgs) -> Result<()> {
    let now = parse_optional_rfc3339(args.activity.now.as_deref())?;
    let mut coordinator = mk_coordinator(config, &args.activity)?;
    let outcome = coordinator.refresh_if_needed(args.force, now);
    emit_outcome(&outcome)
}

fn run_bootstrap(config: &PlannerConfig, args: &BootstrapArgs) -> Result<()> {
    let now = parse_optional_rfc3339(args.activity.now.as_deref())?;
    let mut coordinator = mk_coordinator(config, &args.activity)?;
    let outcome = coordinator.bootstrap(now);
    emit_outcome(&outcome)
}

fn run_show(api: &PlannerApi) -> Result<()> {
    let state = api.saved_state()?;
    let mode_label = state.as_ref().map(|state| state.mode.label());
    emit_json(serde_json::json!({
        "state": state,
        "mode_label": mode_label
    }))
}

fn run_intention(
    command: IntentionCommand,
    config: &PlannerConfig,
    api: &PlannerApi,
) -> Result<()> {
    match command {
        IntentionCommand::Set(args) => {
            api.set_intention(&args.text)?;
            emit_json(serde_json::json!({
                "intention": args.text,
                "is_default": false
            }))
        }
        IntentionCommand::Show => {
            let stored = api.intention()?;
            let is_default = stored.is_none();
            emit_json(serde_json::json!({
                "intention": stored.unwrap_or_else(|| config.default_intention.clone()),
                "is_default": is_default
            }))
        }
    }
}

fn run_verify(api: &PlannerApi) -> Result<()> {
    let result = api.verify_saved()?;
    emit_json(serde_json::to_value(&result).context("failed to serialize verification result")?)
}

fn run_derive(args: &DeriveArgs, config: &PlannerConfig) -> Result<()> {
    let seed = Seed::from_hex(&args.seed_hex).context("invalid --seed-hex")?;
    let day = parse_rfc3339(&args.day)?;
    let summary = ActivitySummary::new(day, args.events, args.focus, args.reminders, args.streak);
    let intention = args.intention.clone().unwrap_or_else(|| config.default_intention.clone());

    let state = derive_saved_state(summary, &seed, &intention, config.derivation_params())
        .context("derivation failed")?;
    tracing::debug!(mode = %state.mode, commitment = %state.commitment_hex(), "offline derivation");

    emit_json(serde_json::json!({
        "intention": intention,
        "mode_label": state.mode.label(),
        "state": state
    }))
}

fn run_plot(args: &PlotArgs, config: &PlannerConfig, api: &PlannerApi) -> Result<()> {
    let state = api.saved_state()?.ok_or_else(|| anyhow!("no saved plan to plot"))?;
    let seed = Seed::from_hex(&state.seed_hex).context("saved plan has an invalid seed")?;
    let bytes = expand(&seed, &state.summary, config.expansion_len)
        .context("failed to expand saved plan")?;
    let chart = histogram(&bytes, args.bins, HistogramShape::from(state.mode));

    emit_json(serde_json::json!({
        "mode": state.mode,
        "shape": chart.shape,
        "bins": chart.bins,
        "scaled": chart.scaled(args.height),
        "height": args.height
    }))
}

fn run_nudges_list(api: &PlannerApi) -> Result<()> {
    let nudges = api.nudges()?;
    let refresh_request = api.refresh_request()?;
    emit_json(serde_json::json!({
        "nudges": nudges,
        "refresh_request": refresh_request
    }))
}

fn run_db(command: DbCommand, api: &PlannerApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty()
            }))
        }
        DbCommand::Migrate(args) => {
            let result = api.migrate(args.dry_run)?;
            emit_json(serde_json::to_value(&result).context("failed to serialize migrate result")?)
        }
        DbCommand::IntegrityCheck => {
            let report = api.integrity_check()?;
            emit_json(serde_json::to_value(&report).context("failed to serialize integrity report")?)
        }
        DbCommand::Backup(args) => {
            api.backup(&args.out)?;
            emit_json(serde_json::json!({
                "backup_path": args.out,
                "status": "ok"
            }))
        }
        DbCommand::Restore(args) => {
            let saved_state = api.restore(&args.input)?;
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "restored_from": args.input,
                "saved_state": saved_state,
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions
            }))
        }
    }
}

fn parse_optional_rfc3339(value: Option<&str>) -> Result<OffsetDateTime> {
    match value {
        Some(raw) => parse_rfc3339(raw),
        None => Ok(OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())),
    }
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}
