//! Job command handlers
//!
//! Builds job requests from local files and submits them to the agent.

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::{Args, Subcommand};
use colored::*;
use kiln_client::AgentClient;
use kiln_core::domain::job::{JobRequest, JobResult};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::types::EnvVar;

/// Slack added to the job timeout before the HTTP request gives up
const RESPONSE_GRACE: Duration = Duration::from_secs(120);

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Run a pipeline on the agent
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Pipeline file to execute
    #[arg(short, long)]
    pipeline: PathBuf,

    /// Correlation id reported back in the result
    #[arg(long, default_value_t = 1)]
    job_id: i64,

    /// Repository to clone into the workspace
    #[arg(long)]
    git_url: Option<String>,

    /// Branch to clone
    #[arg(long)]
    branch: Option<String>,

    /// Encrypted repository credential (see `kiln credential encrypt`)
    #[arg(long)]
    credential: Option<String>,

    /// Container image, defaults to the agent's runner image
    #[arg(long)]
    image: Option<String>,

    /// Environment variable for the container (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<EnvVar>,

    /// CPU limit (e.g. 1.5)
    #[arg(long)]
    cpu: Option<String>,

    /// Memory limit (e.g. 512m)
    #[arg(long)]
    memory: Option<String>,

    /// Deadline in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Return immediately and have the agent POST the result here
    #[arg(long)]
    callback_url: Option<String>,

    /// Print the raw JSON result
    #[arg(long)]
    json: bool,
}

/// Handle job commands
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    match command {
        JobCommands::Run(args) => run_job(args, config).await,
    }
}

async fn run_job(args: RunArgs, config: &Config) -> Result<()> {
    let Some(api_key) = config.api_key.clone() else {
        bail!("No API key given. Pass --api-key or set KILN_API_KEY");
    };

    let request = build_request(&args)?;

    let mut http = reqwest::Client::builder();
    if let Some(secs) = args.timeout {
        http = http.timeout(Duration::from_secs(secs) + RESPONSE_GRACE);
    }
    let client = AgentClient::with_client(&config.agent_url, api_key, http.build()?);

    if request.callback_url.is_some() {
        let accepted = client.submit_job(&request).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&accepted)?);
        } else {
            println!(
                "{} Job {} accepted, result will be delivered to the callback",
                "✓".green(),
                accepted.job_id
            );
        }
        return Ok(());
    }

    if !args.json {
        println!(
            "{}",
            format!("Running {} on {}...", args.pipeline.display(), config.agent_url).dimmed()
        );
    }

    let result = client.execute_job(&request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if !result.success {
        std::process::exit(result.exit_code.filter(|c| *c != 0).unwrap_or(1));
    }
    Ok(())
}

/// Reads and encodes the pipeline, then fills in the request from flags
fn build_request(args: &RunArgs) -> Result<JobRequest> {
    let pipeline = std::fs::read(&args.pipeline)
        .with_context(|| format!("Failed to read pipeline file {}", args.pipeline.display()))?;

    let mut request = JobRequest::new(args.job_id, STANDARD.encode(pipeline));
    request.git_url = args.git_url.clone();
    request.git_branch = args.branch.clone();
    request.encrypted_credential = args.credential.clone();
    request.image = args.image.clone();
    request.cpu_limit = args.cpu.clone();
    request.memory_limit = args.memory.clone();
    request.timeout_seconds = args.timeout;
    request.callback_url = args.callback_url.clone();
    for var in &args.env {
        request.env_vars.insert(var.key.clone(), var.value.clone());
    }

    if request.encrypted_credential.is_some() && request.git_url.is_none() {
        eprintln!(
            "{}",
            "⚠ --credential has no effect without --git-url".yellow()
        );
    }

    Ok(request)
}

fn print_result(result: &JobResult) {
    let status = if result.success {
        "SUCCESS".green().bold()
    } else {
        "FAILED".red().bold()
    };

    println!("{}", "─".repeat(80).dimmed());
    println!("Job:       {}", result.job_id.to_string().cyan());
    println!("Status:    {}", status);
    match result.exit_code {
        Some(code) => println!("Exit code: {}", code),
        None => println!("Exit code: {}", "none".dimmed()),
    }
    if let Some(kind) = result.error_kind {
        println!("Error:     {}", kind.to_string().red());
    }
    println!("Duration:  {:.2}s", result.duration_seconds);
    if result.output_truncated {
        println!("{}", "⚠ Output was truncated by the agent".yellow());
    }
    println!("{}", "─".repeat(80).dimmed());

    if !result.stdout.is_empty() {
        println!("{}", "stdout:".bold());
        print!("{}", result.stdout);
        if !result.stdout.ends_with('\n') {
            println!();
        }
    }
    if !result.stderr.is_empty() {
        println!("{}", "stderr:".bold());
        eprint!("{}", result.stderr);
        if !result.stderr.ends_with('\n') {
            eprintln!();
        }
    }
}
