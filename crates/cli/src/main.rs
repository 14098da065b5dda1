use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use events::EventBus;
use orchestrator::config::{CONFIG_DIR, CONFIG_FILE};
use orchestrator::{
    run_scenario, BackendConfig, OrchestratorConfig, ScenarioCase, ScenarioReport, SessionManager,
};
use procflow_core::{AssessmentReport, Backend, BlockKind};
use serde::{Deserialize, Serialize};
use server::state::AppState;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_HOST: &str = "0.0.0.0";

#[derive(Parser)]
#[command(name = "procflow")]
#[command(about = "Step-by-step process flowsheet construction", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file to use instead of .procflow/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and the projects directory
    Init,
    /// Start the HTTP server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Build, solve and assess the 301-E amine treater
    Demo {
        #[arg(long, default_value = "base")]
        scenario: ScenarioCase,

        /// Build the amine treater through GUI automation
        #[arg(long)]
        fallback: bool,

        /// Re-run once with the suggested amine flow when a target fails
        #[arg(long)]
        adjust: bool,
    },
    /// Print the effective configuration
    Status,
}

/// `[server]` table of the config file. The rest of the file is the
/// orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ServerConfig {
    host: String,
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ServerSection {
    #[serde(default)]
    server: ServerConfig,
}

struct Settings {
    path: PathBuf,
    orchestrator: OrchestratorConfig,
    server: ServerConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Init) => init_project().await,
        Some(Commands::Serve { port }) => serve(cli.config.as_deref(), port).await,
        Some(Commands::Demo {
            scenario,
            fallback,
            adjust,
        }) => demo(cli.config.as_deref(), scenario, fallback, adjust).await,
        Some(Commands::Status) => status(cli.config.as_deref()).await,
        None => serve(cli.config.as_deref(), None).await,
    }
}

async fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let cwd = std::env::current_dir()?;

    let (path, orchestrator) = match explicit {
        Some(path) => {
            let config = OrchestratorConfig::load_from(path)
                .await
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            (path.to_path_buf(), config)
        }
        None => (
            OrchestratorConfig::path_in(&cwd),
            OrchestratorConfig::read(&cwd).await,
        ),
    };

    let server = match tokio::fs::read_to_string(&path).await {
        Ok(content) => toml::from_str::<ServerSection>(&content)
            .map(|s| s.server)
            .unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Invalid [server] table, using defaults");
                ServerConfig::default()
            }),
        Err(_) => ServerConfig::default(),
    };

    Ok(Settings {
        path,
        orchestrator,
        server,
    })
}

async fn init_project() -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config_path = OrchestratorConfig::path_in(&cwd);

    if config_path.exists() {
        println!("Project already initialized at {}", config_path.display());
        return Ok(());
    }

    println!("Initializing procflow in {}", cwd.display());

    let config = OrchestratorConfig::default();
    let config_path = config
        .write(&cwd)
        .await
        .context("Failed to write configuration")?;

    let server = toml::to_string_pretty(&ServerSection::default())?;
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .open(&config_path)
        .await?;
    file.write_all(format!("\n{}", server).as_bytes()).await?;
    file.flush().await?;

    let working_dir = cwd.join(&config.working_dir);
    tokio::fs::create_dir_all(&working_dir)
        .await
        .with_context(|| format!("Failed to create {}", working_dir.display()))?;

    println!();
    println!("Created:");
    println!("  {}/", CONFIG_DIR);
    println!("  └── {}", CONFIG_FILE);
    println!("  {}/", config.working_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Run 'procflow demo' to build the 301-E amine treater");
    println!("  2. Run 'procflow serve' to start the HTTP API");

    Ok(())
}

async fn serve(config: Option<&Path>, port: Option<u16>) -> Result<()> {
    let settings = load_settings(config).await?;
    let port = port.unwrap_or(settings.server.port);
    let addr: SocketAddr = format!("{}:{}", settings.server.host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", settings.server.host, port))?;

    tracing::info!(
        backend = settings.orchestrator.backend.name(),
        working_dir = %settings.orchestrator.working_dir.display(),
        "Starting procflow server"
    );

    let manager = SessionManager::from_config(settings.orchestrator, EventBus::new())
        .context("Failed to build session manager")?;

    println!();
    println!("procflow");
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", port);
    println!("  Swagger UI:  http://localhost:{}/swagger-ui", port);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    server::serve(AppState::new(manager), addr).await
}

async fn demo(config: Option<&Path>, case: ScenarioCase, fallback: bool, adjust: bool) -> Result<()> {
    let settings = load_settings(config).await?;
    let mut config = settings.orchestrator;

    if fallback {
        match &mut config.backend {
            BackendConfig::Simulated {
                unsupported_blocks, ..
            } => {
                if !unsupported_blocks.contains(&BlockKind::AmineTreater) {
                    unsupported_blocks.push(BlockKind::AmineTreater);
                }
            }
            BackendConfig::Bridge { .. } => {
                bail!("--fallback only applies to the simulated backend");
            }
        }
    }

    let manager = SessionManager::from_config(config, EventBus::new())
        .context("Failed to build session manager")?;
    let report = run_scenario(&manager, case, adjust)
        .await
        .with_context(|| format!("Scenario {} failed", case))?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    println!();
    println!(
        "{} {} (session {})",
        "301-E amine treater".bold(),
        report.case,
        report.session_id
    );
    println!();

    for step in &report.steps {
        let backend = match step.backend {
            Backend::Primary => step.backend.as_str().normal(),
            Backend::Fallback => step.backend.as_str().yellow(),
        };
        println!(
            "  {:<24} {:<9} x{}  {:<22} {}",
            step.operation, backend, step.attempts, step.phase, step.message
        );
    }

    if let Some(outcome) = &report.outcome {
        println!();
        let status = if outcome.converged {
            "converged".green()
        } else {
            "did not converge".red()
        };
        println!("  Simulation {} (status {})", status, outcome.status_code);
        for diagnostic in &outcome.diagnostics {
            println!("    {}", diagnostic);
        }
    }

    print_assessment(&report.assessment);

    if let Some(rerun) = &report.rerun {
        println!();
        println!("{}", "Adjusted re-run".bold());
        println!(
            "  {} on {}: {} -> {} {}",
            rerun.adjustment.parameter,
            rerun.adjustment.stream.as_deref().unwrap_or("-"),
            format_value(rerun.adjustment.current_value),
            format_value(rerun.adjustment.suggested_value),
            rerun.adjustment.unit
        );
        print_assessment(&rerun.assessment);
    }

    if let Some(path) = &report.project_path {
        println!();
        println!("  Project saved to {}", path.display());
    }
    println!();
}

fn print_assessment(report: &AssessmentReport) {
    println!();
    println!("  {:<24} {:>12} {:>4} {:>10}  {}", "Target", "Observed", "", "Limit", "Result");
    for assessment in &report.assessments {
        let target = &assessment.target;
        let result = if assessment.pass {
            "PASS".green()
        } else {
            "FAIL".red()
        };
        println!(
            "  {:<24} {:>12} {:>4} {:>10}  {} {}",
            target.name,
            format_value(assessment.observed),
            target.comparison.as_str(),
            format_value(Some(target.value)),
            result,
            target.unit
        );
    }
    println!("  {}", report.summary);

    for suggestion in &report.suggestions {
        println!(
            "  {} {} {}",
            "->".yellow(),
            suggestion.rationale,
            suggestion.expected_impact.dimmed()
        );
    }
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.abs() >= 1000.0 => format!("{:.1}", v),
        Some(v) => format!("{:.4}", v),
        None => "-".to_string(),
    }
}

async fn status(config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config).await?;
    let config = &settings.orchestrator;

    println!();
    if settings.path.exists() {
        println!("Config:       {}", settings.path.display());
    } else {
        println!("Config:       defaults (run 'procflow init' to write one)");
    }
    println!("Working dir:  {}", config.working_dir.display());
    match &config.backend {
        BackendConfig::Simulated {
            unsupported_blocks, ..
        } => {
            println!("Backend:      simulated");
            if !unsupported_blocks.is_empty() {
                let kinds: Vec<&str> = unsupported_blocks.iter().map(|k| k.as_str()).collect();
                println!("  unsupported: {}", kinds.join(", "));
            }
        }
        BackendConfig::Bridge { base_url, .. } => {
            println!("Backend:      bridge at {}", base_url);
        }
    }
    println!(
        "Timeouts:     engine {} ms, lock {} ms",
        config.engine_call_timeout_ms, config.lock_timeout_ms
    );
    println!(
        "Retries:      {} (backoff base {} ms)",
        config.max_retries, config.backoff_base_ms
    );
    println!(
        "Fallback:     {} attempts, verify wait {} ms, step timeout {} ms",
        config.fallback.max_attempts, config.fallback.verify_wait_ms, config.fallback.step_timeout_ms
    );
    let playbooks: Vec<&str> = config.playbooks.keys().map(String::as_str).collect();
    println!("Playbooks:    {}", playbooks.join(", "));
    println!(
        "Server:       {}:{}",
        settings.server.host, settings.server.port
    );
    println!();

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "procflow=info,orchestrator=info,server=info,tower_http=info".into()
            }),
        )
        .init();
}
