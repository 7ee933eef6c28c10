//! Trapgate CLI - Command-line interface for the verification engine
//!
//! Commands:
//! - replay: Replay a recorded interaction script offline (virtual time)
//! - run: Drive a recorded interaction script against a live risk service
//! - validate: Validate an interaction script against the event schema
//! - schema: Print schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use trapgate::event::{parse_ndjson, validate_events, InputEvent, EVENT_SCHEMA_VERSION};
use trapgate::runtime::{PortalDriver, ScriptReplay, TransitionRecord};
use trapgate::service::{HttpRiskClient, SimulatedRiskClient};
use trapgate::types::{LogEntry, Status};
use trapgate::{SessionConfig, TRAPGATE_VERSION};

/// Trapgate - Passive behavioral verification engine
#[derive(Parser)]
#[command(name = "trapgate")]
#[command(version = TRAPGATE_VERSION)]
#[command(about = "Replay and drive behavioral verification sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded interaction script offline (virtual time)
    Replay {
        /// Input script path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Flow policy
        #[arg(long, default_value = "credential-gated")]
        flow: FlowArg,

        /// Use the extended capture profile (larger raw buffer)
        #[arg(long)]
        extended_capture: bool,

        /// Username the simulated service accepts
        #[arg(long, default_value = "resident")]
        username: String,

        /// Password the simulated service accepts
        #[arg(long, default_value = "secret")]
        password: String,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Drive a recorded interaction script against a live risk service
    Run {
        /// Input script path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Base URL of the risk service, e.g. http://127.0.0.1:5000
        #[arg(long)]
        base_url: String,

        /// Flow policy
        #[arg(long, default_value = "credential-gated")]
        flow: FlowArg,

        /// Use the extended capture profile (larger raw buffer)
        #[arg(long)]
        extended_capture: bool,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Validate an interaction script against the event schema
    Validate {
        /// Input script path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema,
}

#[derive(Clone, Copy, ValueEnum)]
enum FlowArg {
    /// Auto-triggered single deep scan
    AutoScan,
    /// Passive check, login, post-login deep scan
    CredentialGated,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Compact JSON report
    Json,
    /// Pretty-printed JSON report
    JsonPretty,
    /// One transition per line, then the report
    Ndjson,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), TrapgateCliError> {
    match cli.command {
        Commands::Replay {
            input,
            flow,
            extended_capture,
            username,
            password,
            output_format,
        } => cmd_replay(&input, flow, extended_capture, &username, &password, output_format),

        Commands::Run {
            input,
            base_url,
            flow,
            extended_capture,
            output_format,
        } => cmd_run(&input, &base_url, flow, extended_capture, output_format),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Schema => cmd_schema(),
    }
}

fn session_config(flow: FlowArg, extended_capture: bool) -> SessionConfig {
    let config = match flow {
        FlowArg::AutoScan => SessionConfig::auto_scan(),
        FlowArg::CredentialGated => SessionConfig::credential_gated(),
    };
    if extended_capture {
        config.with_extended_capture()
    } else {
        config
    }
}

fn read_script(input: &PathBuf) -> Result<Vec<InputEvent>, TrapgateCliError> {
    let data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("reading events from a TTY; pipe a script or pass --input <file>");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let events = parse_ndjson(&data)?;
    if events.is_empty() {
        return Err(TrapgateCliError::NoEvents);
    }
    Ok(events)
}

fn cmd_replay(
    input: &PathBuf,
    flow: FlowArg,
    extended_capture: bool,
    username: &str,
    password: &str,
    output_format: OutputFormat,
) -> Result<(), TrapgateCliError> {
    let events = read_script(input)?;
    let config = session_config(flow, extended_capture);
    config.validate()?;

    let client = Arc::new(SimulatedRiskClient::new(username, password));
    let mut replay = ScriptReplay::new(config, client);

    let runtime = tokio::runtime::Runtime::new()?;
    let status = runtime.block_on(replay.run(events));

    let report = SessionReport::new(status, replay.transitions(), replay.verifier().feed().iter());
    print_report(&report, output_format)?;
    Ok(())
}

fn cmd_run(
    input: &PathBuf,
    base_url: &str,
    flow: FlowArg,
    extended_capture: bool,
    output_format: OutputFormat,
) -> Result<(), TrapgateCliError> {
    let events = read_script(input)?;
    let config = session_config(flow, extended_capture);
    config.validate()?;

    let client = Arc::new(HttpRiskClient::new(base_url));
    let mut driver = PortalDriver::new(config, client);

    let runtime = tokio::runtime::Runtime::new()?;
    let status = runtime.block_on(driver.run_script(events));

    let report = SessionReport::new(status, &[], driver.verifier().feed().iter());
    print_report(&report, output_format)?;
    Ok(())
}

fn cmd_validate(input: &PathBuf, json: bool) -> Result<(), TrapgateCliError> {
    let events = read_script(input)?;
    let issues = validate_events(&events);

    let report = ValidationReport {
        total_events: events.len(),
        valid_events: events.len() - issues.len(),
        invalid_events: issues.len(),
        errors: issues
            .iter()
            .map(|issue| ValidationErrorDetail {
                index: issue.index,
                error: issue.error.clone(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Event {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_events > 0 {
        Err(TrapgateCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_schema() -> Result<(), TrapgateCliError> {
    println!("Input Schema: {}", EVENT_SCHEMA_VERSION);
    println!();
    println!("One JSON event per line, tagged by \"event\":");
    println!();
    println!("  pointer_move   x, y, time         raw pointer position");
    println!("  key_down       time               keydown for typing intervals");
    println!("  focus          time               focus change");
    println!("  paste          time               clipboard paste");
    println!("  honeypot_fill  value, time        fill the concealed trap field");
    println!("  submit         username, password, time");
    println!("  teardown       time               end of session");
    println!();
    println!("Timestamps are epoch milliseconds.");
    println!();
    println!("Service endpoints driven by a session:");
    println!("  POST /validate  passive counts check");
    println!("  POST /login     credential submission");
    println!("  POST /predict   deep scan over raw samples");
    Ok(())
}

// Report types

#[derive(serde::Serialize)]
struct SessionReport {
    status: Status,
    transitions: Vec<TransitionRecord>,
    feed: Vec<LogEntry>,
}

impl SessionReport {
    fn new<'a>(
        status: Status,
        transitions: &[TransitionRecord],
        feed: impl Iterator<Item = &'a LogEntry>,
    ) -> Self {
        Self {
            status,
            transitions: transitions.to_vec(),
            feed: feed.cloned().collect(),
        }
    }
}

fn print_report(report: &SessionReport, format: OutputFormat) -> Result<(), TrapgateCliError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(report)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Ndjson => {
            for transition in &report.transitions {
                println!("{}", serde_json::to_string(transition)?);
            }
            println!("{}", serde_json::to_string(report)?);
        }
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}

// Error types

#[derive(Debug)]
enum TrapgateCliError {
    Io(io::Error),
    Engine(trapgate::VerifyError),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(usize),
}

impl From<io::Error> for TrapgateCliError {
    fn from(e: io::Error) -> Self {
        TrapgateCliError::Io(e)
    }
}

impl From<trapgate::VerifyError> for TrapgateCliError {
    fn from(e: trapgate::VerifyError) -> Self {
        TrapgateCliError::Engine(e)
    }
}

impl From<serde_json::Error> for TrapgateCliError {
    fn from(e: serde_json::Error) -> Self {
        TrapgateCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<TrapgateCliError> for CliError {
    fn from(e: TrapgateCliError) -> Self {
        match e {
            TrapgateCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            TrapgateCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches {EVENT_SCHEMA_VERSION}")),
            },
            TrapgateCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            TrapgateCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            TrapgateCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}
