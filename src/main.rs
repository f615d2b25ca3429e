/// Version injected at compile time via ADOKIT_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("ADOKIT_VERSION") {
    Some(v) => v,
    None => "dev",
};

use adokit::ado::auth::{self, Credentials};
use adokit::ado::client::AdoClient;
use adokit::ado::http::AdoHttpClient;
use adokit::config::Config;
use adokit::job::{BatchMode, JobSpec};
use adokit::ledger::StateLedger;
use adokit::resource::{get_all_resource_keys, get_resource, Identity};
use adokit::Session;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Manage Azure DevOps resources
#[derive(Parser, Debug)]
#[command(name = "adokit", version, about, long_about = None)]
struct Args {
    /// Organization to use
    #[arg(short, long, global = true)]
    organization: Option<String>,

    /// Project to use
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Service root, for on-premises servers
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Print the changes a command would make without making them
    #[arg(long, global = true)]
    plan: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the resource kinds this build knows about
    Kinds,

    /// List every resource of a kind
    List {
        kind: String,
        /// Parent scope as var=value, e.g. repository_id=<id>
        #[arg(long = "scope", value_parser = parse_scope)]
        scope: Vec<(String, String)>,
    },

    /// Show one resource
    Get {
        kind: String,
        id: String,
        #[arg(long = "scope", value_parser = parse_scope)]
        scope: Vec<(String, String)>,
    },

    /// Run builds or pipelines and wait for them
    Run {
        /// `builds` or `pipeline-runs`
        kind: String,
        /// Definition (or pipeline) ids to run
        #[arg(required = true)]
        definitions: Vec<String>,
        #[arg(long)]
        branch: Option<String>,
        /// Seconds to wait for each job
        #[arg(long, default_value_t = 3600)]
        timeout: u64,
        /// Run all jobs at once instead of one after another
        #[arg(long)]
        parallel: bool,
    },

    /// Delete everything recorded in the state file
    Teardown {
        #[arg(long)]
        state_file: Option<PathBuf>,
    },

    /// Show or change the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the saved configuration
    Show,

    /// Save one or more settings
    Set {
        #[arg(long)]
        organization: Option<String>,
        #[arg(long)]
        project: Option<String>,
        /// Account the PAT belongs to
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        poll_interval_ms: Option<u64>,
        #[arg(long)]
        state_file: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("adokit {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("adokit").join("adokit.log");
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".adokit").join("adokit.log");
    }

    PathBuf::from("adokit.log")
}

fn parse_scope(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((var, value)) if !var.is_empty() => Ok((var.to_string(), value.to_string())),
        _ => Err(format!("expected var=value, got {}", raw)),
    }
}

/// Build a client from CLI > env > config
fn connect(args: &Args, config: &Config) -> Result<AdoClient> {
    let organization = args
        .organization
        .clone()
        .or_else(|| config.effective_organization())
        .context("No organization configured. Set ADO_ORG or use --organization")?;
    anyhow::ensure!(
        auth::validate_organization(&organization),
        "invalid organization name: {}",
        organization
    );

    let project = args
        .project
        .clone()
        .or_else(|| config.effective_project())
        .context("No project configured. Set ADO_PROJECT or use --project")?;
    anyhow::ensure!(
        auth::validate_project(&project),
        "invalid project name: {}",
        project
    );

    let credentials = Credentials::from_env(config.effective_email().as_deref())?;
    let http = AdoHttpClient::new(credentials)?;
    let base_url = args
        .base_url
        .clone()
        .unwrap_or_else(|| config.effective_base_url());

    tracing::info!("Using organization: {}, project: {}", organization, project);
    Ok(AdoClient::new(Arc::new(http), &organization, &project).with_base_url(&base_url))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn new_session(client: AdoClient, plan: bool) -> Session {
    let session = Session::new(client);
    if plan {
        session.with_plan_mode()
    } else {
        session
    }
}

fn planned_changes(session: &Session) -> Value {
    session
        .plan()
        .map(|plan| json!(plan.changes()))
        .unwrap_or(Value::Null)
}

fn print_kinds() -> Result<()> {
    let kinds: Vec<Value> = get_all_resource_keys()
        .into_iter()
        .filter_map(|key| {
            get_resource(key).map(|def| {
                json!({
                    "kind": key,
                    "name": def.display_name,
                    "create": def.create_path.is_some(),
                    "delete": def.delete.is_some(),
                    "job": def.job.is_some(),
                })
            })
        })
        .collect();
    print_json(&Value::Array(kinds))
}

fn configure(action: &ConfigAction) -> Result<()> {
    let mut config = Config::load();

    if let ConfigAction::Set {
        organization,
        project,
        email,
        base_url,
        poll_interval_ms,
        state_file,
    } = action
    {
        if let Some(organization) = organization {
            config.set_organization(organization)?;
        }
        if let Some(project) = project {
            config.set_project(project)?;
        }
        if let Some(email) = email {
            config.email = Some(email.clone());
        }
        if let Some(base_url) = base_url {
            config.base_url = Some(base_url.clone());
        }
        if let Some(interval) = poll_interval_ms {
            config.poll_interval_ms = Some(*interval);
        }
        if let Some(state_file) = state_file {
            config.state_file = Some(state_file.clone());
        }
        config.save()?;
        tracing::info!("Saved configuration to {:?}", Config::config_path());
    }

    print_json(&serde_json::to_value(&config)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level);

    match &args.command {
        Command::Kinds => return print_kinds(),
        Command::Config { action } => return configure(action),
        _ => {},
    }

    let config = Config::load();
    let client = connect(&args, &config)?;

    match &args.command {
        Command::Kinds | Command::Config { .. } => Ok(()),
        Command::List { kind, scope } => {
            let session = Arc::new(Session::new(client));
            let manager = session
                .manager(kind)?
                .with_scope(scope.iter().cloned().collect());
            let records: Vec<Value> = manager
                .get_all()
                .await?
                .iter()
                .map(|r| r.to_json())
                .collect();
            print_json(&Value::Array(records))
        },
        Command::Get { kind, id, scope } => {
            let session = Arc::new(Session::new(client));
            let manager = session
                .manager(kind)?
                .with_scope(scope.iter().cloned().collect());
            let identity = Identity::parse(id, manager.def().id_type)?;
            print_json(&manager.get_by_id(&identity).await?.to_json())
        },
        Command::Run {
            kind,
            definitions,
            branch,
            timeout,
            parallel,
        } => {
            let ledger = StateLedger::with_state_file(config.effective_state_file())?;
            let session = Arc::new(
                new_session(client, args.plan)
                    .with_ledger(ledger)
                    .with_poll_interval(config.effective_poll_interval()),
            );

            let specs: Vec<JobSpec> = definitions
                .iter()
                .map(|raw| {
                    let definition = raw
                        .parse::<i64>()
                        .map(Identity::Int)
                        .unwrap_or_else(|_| Identity::from(raw.as_str()));
                    let spec = JobSpec::new(definition, Duration::from_secs(*timeout));
                    match branch {
                        Some(branch) => spec.with_branch(branch),
                        None => spec,
                    }
                })
                .collect();

            let mode = if *parallel {
                BatchMode::Simultaneous
            } else {
                BatchMode::Sequential
            };
            let outcomes = session.batch_runner(kind)?.run(&specs, mode).await;

            if args.plan {
                return print_json(&planned_changes(&session));
            }
            let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
            print_json(&Value::Array(outcomes.iter().map(|o| o.to_json()).collect()))?;
            anyhow::ensure!(failed == 0, "{} of {} jobs did not succeed", failed, outcomes.len());
            Ok(())
        },
        Command::Teardown { state_file } => {
            let path = state_file
                .clone()
                .unwrap_or_else(|| config.effective_state_file());
            let ledger = StateLedger::with_state_file(&path)
                .with_context(|| format!("loading state file {:?}", path))?;
            let session = Arc::new(new_session(client, args.plan).with_ledger(ledger));

            let report = session.revert_all().await;
            if args.plan {
                return print_json(&planned_changes(&session));
            }
            let failures: Vec<Value> = report
                .failures
                .iter()
                .map(|(entry, e)| json!({"entry": entry, "error": e.to_string()}))
                .collect();
            print_json(&json!({
                "deleted": &report.deleted,
                "skipped": &report.skipped,
                "failures": failures,
            }))?;

            anyhow::ensure!(
                report.is_clean(),
                "{} resources could not be deleted",
                report.failures.len()
            );
            Ok(())
        },
    }
}
