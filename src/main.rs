//! CLI entry point: loads a workflow, its tool registry, run inputs, and
//! tool configs from disk, then drives one run to completion.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use workflow_runner::executor::RunExecutor;
use workflow_runner::protocol::RunStatus;
use workflow_runner::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use workflow_runner::{config, loader, protocol};

#[derive(Parser)]
#[command(name = "workflow-runner")]
#[command(about = "Deterministic DAG runner for API-call workflows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validates, schedules, and runs a workflow to completion.
    Execute {
        /// Path to the workflow DAG (JSON).
        #[arg(long)]
        workflow: PathBuf,

        /// Path to the tool registry (JSON).
        #[arg(long)]
        registry: PathBuf,

        /// Path to the run's `$input.*` values (JSON).
        #[arg(long)]
        inputs: PathBuf,

        /// Path to per-tool secrets (JSON). Defaults to an empty map.
        #[arg(long)]
        configs: Option<PathBuf>,

        /// Where to write the resulting run report. Prints to stdout if
        /// omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Send trace spans to an OTLP collector.
        #[arg(long, default_value = "false")]
        otel: bool,

        /// OTLP collector endpoint. Defaults to `OTEL_EXPORTER_OTLP_ENDPOINT`
        /// or `http://localhost:4317` when `--otel` is set without one.
        #[arg(long)]
        otel_endpoint: Option<String>,

        /// Suppress informational logs; only errors reach stderr.
        #[arg(long, short = 's', default_value = "false")]
        silent: bool,

        /// Debug-level logging.
        #[arg(long, short = 'v', default_value = "false")]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Execute {
            workflow,
            registry,
            inputs,
            configs,
            output,
            otel,
            otel_endpoint,
            silent,
            verbose,
        } => {
            let mut telemetry_config = TelemetryConfig::from_env();
            telemetry_config.log_level = if *silent {
                Level::ERROR
            } else if *verbose {
                Level::DEBUG
            } else {
                Level::INFO
            };

            if *otel {
                if let Some(endpoint) = otel_endpoint {
                    telemetry_config.otlp_endpoint = Some(endpoint.clone());
                } else if telemetry_config.otlp_endpoint.is_none() {
                    telemetry_config.otlp_endpoint = Some("http://localhost:4317".to_string());
                }
            }

            if let Err(e) = init_telemetry(telemetry_config) {
                if !*silent {
                    eprintln!("Warning: failed to initialize telemetry: {e}");
                }
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                    .try_init();
            }

            let config = config::Config::from_env();
            let exit_code =
                run_execute(workflow, registry, inputs, configs.as_ref(), output, &config, *silent).await;

            shutdown_telemetry();
            std::process::exit(exit_code);
        }
    }
}

async fn run_execute(
    workflow_path: &PathBuf,
    registry_path: &PathBuf,
    inputs_path: &PathBuf,
    configs_path: Option<&PathBuf>,
    output_path: &Option<PathBuf>,
    config: &config::Config,
    silent: bool,
) -> i32 {
    let workflow = match loader::load_workflow_from_file(workflow_path) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, "failed to load workflow");
            return 1;
        }
    };
    let tool_registry = match loader::load_tool_registry_from_file(registry_path) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to load tool registry");
            return 1;
        }
    };
    let run_request = match loader::load_run_request_from_file(inputs_path) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to load run inputs");
            return 1;
        }
    };
    let tool_configs = match configs_path {
        Some(path) => match loader::load_tool_configs_from_file(path) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to load tool configs");
                return 1;
            }
        },
        None => protocol::ToolConfigs::new(),
    };

    if !silent {
        info!(workflow_id = %workflow.id, step_count = workflow.steps.len(), "workflow loaded");
    }

    let client = reqwest::Client::new();
    let run_executor = RunExecutor::with_reqwest_client(client).with_timeout(config.default_timeout());

    let run = run_executor
        .execute(&workflow, &tool_registry, run_request.user_inputs, &tool_configs, None)
        .await;

    if !silent {
        info!(run_id = %run.id, status = ?run.status, "run finished");
    }

    let json = serde_json::to_string_pretty(&run).expect("Run always serializes");
    match output_path {
        Some(path) => {
            if let Err(e) = std::fs::write(path, json) {
                eprintln!("failed to write run report: {e}");
                return 1;
            } else if !silent {
                println!("run report written to {}", path.display());
            }
        }
        None => println!("{json}"),
    }

    if run.status == RunStatus::Success {
        0
    } else {
        1
    }
}
