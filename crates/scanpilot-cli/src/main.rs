//! ScanPilot - run SAST/SCA scans from the command line
//!
//! Subcommands:
//! - `scan`: create a scan, wait for it and print the filtered report
//! - `wait`: wait for an existing scan
//! - `results`: print the filtered report of a finished scan
//! - `team`: resolve or create teams

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scanpilot_common::{Config, LogConfig, LogFormat};
use scanpilot_core::{
    Engine, EngineFilters, FilterConfiguration, ScanRequest, Severity, SourceOrigin,
};
use scanpilot_filter::FilterSet;
use scanpilot_gateway::{RestGateway, RestGatewayConfig};
use scanpilot_orchestrator::{OrchestratorConfig, ScanOrchestrator, ScanReport};
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "scanpilot.toml";

/// ScanPilot scan client
#[derive(Parser, Debug)]
#[command(name = "scanpilot")]
#[command(version)]
#[command(about = "Run SAST/SCA scans and report de-duplicated findings", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, json, compact)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a scan, wait for it and print the report
    Scan {
        /// Project name; created when missing
        #[arg(long)]
        project: String,

        /// Owning team id, or a team path such as \CxServer\Unit\Team
        #[arg(long)]
        team: String,

        /// Zipped source to upload
        #[arg(long)]
        source: PathBuf,

        /// Engines to run (overrides config)
        #[arg(long = "engine")]
        engines: Vec<String>,

        /// Preset name (overrides config)
        #[arg(long)]
        preset: Option<String>,

        /// Polling budget in minutes (overrides config)
        #[arg(long)]
        timeout_minutes: Option<u32>,

        /// Return once the scan is triggered
        #[arg(long)]
        no_wait: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Wait for an existing scan to finish
    Wait {
        #[arg(long)]
        scan_id: String,

        #[arg(long)]
        timeout_minutes: Option<u32>,
    },

    /// Print the filtered report of a finished scan
    Results {
        /// Scan to report on; defaults to the last finished scan of --project-id
        #[arg(long, required_unless_present = "project_id")]
        scan_id: Option<String>,

        #[arg(long)]
        project_id: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Resolve or create teams
    Team {
        #[command(subcommand)]
        action: TeamAction,
    },
}

#[derive(Subcommand, Debug)]
enum TeamAction {
    /// Print the id of a team path
    Resolve {
        #[arg(long)]
        path: String,
    },
    /// Create a team under a business unit
    Create {
        #[arg(long)]
        parent_id: String,

        #[arg(long)]
        name: String,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// SAST filter expression, e.g. "finding.state == 'URGENT'" (overrides config)
    #[arg(long)]
    filter_script: Option<String>,

    /// SCA filter expression, e.g. "finding.severity == 'HIGH'" (overrides config)
    #[arg(long)]
    sca_filter_script: Option<String>,

    /// Only print issues at or above this severity
    #[arg(long)]
    min_severity: Option<Severity>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_ref())?;

    // Initialize logging; flags win over config
    let mut log_config = LogConfig::from_settings(&config.logging);
    if let Some(level) = &args.log_level {
        log_config = log_config.level(level);
    }
    if let Some(format) = &args.log_format {
        let format: LogFormat = format.parse().map_err(|e: String| anyhow!(e))?;
        log_config = log_config.format(format);
    }
    scanpilot_common::init_logging_with_config(log_config)?;

    debug!("ScanPilot v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;
    let orchestrator = build_orchestrator(&config)?;

    match args.command {
        Command::Scan {
            project,
            team,
            source,
            engines,
            preset,
            timeout_minutes,
            no_wait,
            output,
        } => {
            let mut request = ScanRequest::new(project, team, SourceOrigin::File(source))
                .engines(parse_engines(&engines, &config)?);
            if let Some(preset) = preset {
                request = request.preset(preset);
            }
            let timeout = timeout_minutes.unwrap_or(config.scan.timeout_minutes);
            run_scan(&orchestrator, &config, request, timeout, no_wait, &output).await
        }
        Command::Wait {
            scan_id,
            timeout_minutes,
        } => {
            let handle = orchestrator.handle_for(&scan_id).await?;
            let timeout = timeout_minutes.unwrap_or(config.scan.timeout_minutes);
            orchestrator.wait_for_completion(&handle, timeout).await?;
            println!("Scan {} finished", scan_id);
            Ok(())
        }
        Command::Results {
            scan_id,
            project_id,
            output,
        } => {
            let scan_id = match (scan_id, project_id) {
                (Some(id), _) => id,
                (None, Some(project_id)) => orchestrator
                    .last_finished_scan(&project_id)
                    .await?
                    .ok_or_else(|| anyhow!("project {} has no finished scan", project_id))?,
                (None, None) => anyhow::bail!("--scan-id or --project-id is required"),
            };
            let handle = orchestrator.handle_for(&scan_id).await?;
            let filters = filters_for(&config, &output);
            let report = orchestrator.get_filtered_results(&handle, &filters).await?;
            print_report(&report, &output)
        }
        Command::Team { action } => run_team(&orchestrator, action).await,
    }
}

/// Load the config file (explicit path must exist) and overlay the environment
fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::from_file(DEFAULT_CONFIG_PATH)?
        }
        None => Config::default(),
    };
    Ok(config.merge_env())
}

fn build_orchestrator(config: &Config) -> Result<ScanOrchestrator<RestGateway>> {
    let api_token = config
        .gateway
        .api_token
        .clone()
        .ok_or_else(|| anyhow!("gateway.api_token is required (or set SCANPILOT_API_TOKEN)"))?;

    let gateway = RestGateway::new(RestGatewayConfig {
        base_url: config.gateway.url.clone(),
        api_token,
        request_timeout: config.gateway.request_timeout(),
        ..RestGatewayConfig::default()
    })?;

    Ok(ScanOrchestrator::new(
        gateway,
        OrchestratorConfig::from_config(config)?,
    ))
}

fn parse_engines(names: &[String], config: &Config) -> Result<Vec<Engine>> {
    if names.is_empty() {
        return Ok(config.scan.engines()?);
    }
    names
        .iter()
        .map(|name| name.parse::<Engine>().map_err(|e| anyhow!(e)))
        .collect()
}

/// Configured filters, with each engine's script flag replacing that engine's section
fn filters_for(config: &Config, output: &OutputArgs) -> FilterConfiguration {
    let mut filters = config.filters.clone();
    if let Some(script) = &output.filter_script {
        filters.sast = EngineFilters::scripted(script.clone());
    }
    if let Some(script) = &output.sca_filter_script {
        filters.sca = EngineFilters::scripted(script.clone());
    }
    filters
}

async fn run_scan(
    orchestrator: &ScanOrchestrator<RestGateway>,
    config: &Config,
    mut request: ScanRequest,
    timeout_minutes: u32,
    no_wait: bool,
    output: &OutputArgs,
) -> Result<()> {
    let filters = filters_for(config, output);
    if !no_wait {
        // Filters are checked before the service is contacted
        FilterSet::compile(&filters)?;
    }

    if request.owner_team_id.starts_with('\\') {
        let team_id = orchestrator
            .resolve_team_id(&request.owner_team_id)
            .await?
            .ok_or_else(|| anyhow!("team {} not found", request.owner_team_id))?;
        info!("Team {} resolved to {}", request.owner_team_id, team_id);
        request.owner_team_id = team_id;
    }

    if no_wait {
        let handle = orchestrator.create_scan(&request).await?;
        println!("{}", handle.scan_id);
        return Ok(());
    }

    let report = orchestrator
        .scan_and_report(&request, timeout_minutes, &filters)
        .await?;
    print_report(&report, output)
}

async fn run_team(orchestrator: &ScanOrchestrator<RestGateway>, action: TeamAction) -> Result<()> {
    match action {
        TeamAction::Resolve { path } => match orchestrator.resolve_team_id(&path).await? {
            Some(id) => println!("{}", id),
            None => anyhow::bail!("team {} not found", path),
        },
        TeamAction::Create { parent_id, name } => {
            let id = orchestrator.create_team(&parent_id, &name).await?;
            println!("{}", id);
        }
    }
    Ok(())
}

// ── Output ──

fn print_report(report: &ScanReport, output: &OutputArgs) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => print_report_text(report, output.min_severity),
    }
    Ok(())
}

fn print_report_text(report: &ScanReport, min_severity: Option<Severity>) {
    println!("\n=== Scan {} ===\n", report.scan_id);

    for issue in report.issues_at_least(min_severity.unwrap_or(Severity::Info)) {
        println!(
            "[{}] {} ({})",
            issue.severity.wire_name(),
            issue.vulnerability_type,
            issue.engine
        );
        if let Some(cwe) = &issue.cwe_id {
            println!("    CWE:       {}", cwe);
        }
        println!("    Reference: {}", issue.reference);
        for (location, details) in &issue.details_by_location {
            for detail in details {
                let marker = if detail.is_false_positive { " (not exploitable)" } else { "" };
                println!("    - {}{}", location, marker);
                if let Some(snippet) = &detail.code_snippet {
                    println!("        {}", snippet.trim());
                }
            }
        }
        if let Some(fix) = &issue.recommendation {
            println!("    Fix:       upgrade to {}", fix);
        }
        println!();
    }

    println!("Summary:");
    for severity in Severity::ALL.iter().rev() {
        println!("  {:<9} {}", format!("{}:", severity), report.histogram.count(*severity));
    }
    println!(
        "  Records: {} processed, {} merged, {} filtered, {} ignored",
        report.stats.records_processed,
        report.stats.records_merged,
        report.stats.records_filtered,
        report.stats.records_ignored
    );
    for engine in &report.engines {
        println!(
            "  {} (service): {} high, {} medium, {} low",
            engine.engine, engine.high, engine.medium, engine.low
        );
    }
    println!("\n{}", report.deep_link);
}
