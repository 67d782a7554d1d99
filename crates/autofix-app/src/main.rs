//! autofix - iterative repair for small Python programs
//!
//! Runs a program in a sandbox, classifies what went wrong, and applies
//! structural or model-generated fixes until it runs cleanly.

mod runtime;
mod server;

use anyhow::{Context, Result};
use autofix_adapters::Config;
use autofix_core::{MaxIterations, RepairRequest, RepairResponse, RepairStatus};
use clap::{Parser, Subcommand};
use runtime::Runtime;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "autofix",
    about = "Iterative repair engine for buggy Python programs",
    version
)]
struct Args {
    /// Config file (defaults to ~/.config/autofix/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a program once and classify the outcome
    Run {
        file: PathBuf,
        /// Print the classification as JSON
        #[arg(long)]
        json: bool,
    },
    /// Repair a program until it runs cleanly or the budget is spent
    Repair {
        file: PathBuf,
        /// Extra instructions passed to the model
        #[arg(long, default_value = "")]
        prompt: String,
        /// Iteration budget (derived from program size when omitted)
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
        /// Write the repaired program here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Serve the Execute and Repair endpoints over HTTP
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let args = Args::parse();
    let config = Config::load(args.config.as_deref());
    let runtime = Runtime::from_config(&config)?;

    match args.command {
        Command::Run { file, json } => run_once(&runtime, &file, json).await,
        Command::Repair {
            file,
            prompt,
            max_iterations,
            json,
            output,
        } => {
            let request = RepairRequest {
                code: read_program(&file)?,
                prompt,
                max_iterations: max_iterations.map(|n| MaxIterations::Count(i64::from(n))),
            };
            repair(&runtime, &request, json, output.as_deref()).await
        }
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let addr = format!("{host}:{port}");
            server::serve(Arc::new(runtime), &addr, config.server.body_limit_bytes).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr; `LOG_FORMAT=json` switches to structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let result = match format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    if let Err(err) = result {
        eprintln!("  Warning: tracing init failed: {err}");
    }
}

fn read_program(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

async fn run_once(runtime: &Runtime, file: &Path, json: bool) -> Result<ExitCode> {
    let code = read_program(file)?;
    let response = runtime.execute(&code).await?;
    let clean = response.error_type == "NONE";

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", response.stdout);
        eprint!("{}", response.stderr);
        if !clean {
            eprintln!();
            eprintln!("  {}: {}", response.error_type, response.full_error);
        }
    }
    Ok(if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn repair(
    runtime: &Runtime,
    request: &RepairRequest,
    json: bool,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let response = runtime.repair(request).await?;

    if let Some(path) = output {
        std::fs::write(path, &response.final_code)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_summary(&response);
        if output.is_none() {
            print!("{}", response.final_code);
        }
    }

    Ok(if response.parsed_error.status == RepairStatus::Success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(response: &RepairResponse) {
    let parsed = &response.parsed_error;
    eprintln!(
        "  {:?} after {} iteration(s), {} change(s)",
        parsed.status,
        parsed.total_iterations,
        response.changes.len()
    );
    for change in &response.changes {
        let line = change.line_new.or(change.line_old).unwrap_or(0);
        let text = if change.new_text.is_empty() {
            &change.old_text
        } else {
            &change.new_text
        };
        eprintln!(
            "    [{}] {:>4} {:?} {} | {}",
            change.iteration, line, change.change_type, change.fix_method, text
        );
    }
    if let Some(path) = &response.report_path {
        eprintln!("  Report saved to {path}");
    }
}
