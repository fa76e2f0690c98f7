use crate::config::{AgentConfig, ExecutionMode};
use crate::engine::SimulatorConfig;
use crate::export::{self, ExportFormat};
use crate::model::{OutputFormat, RunRequest, RunStatus, Tone};
use crate::orchestrator::{process_run_completion, PostRunOptions, RunController};
use crate::storage::{FormatFilter, HistoryStore};
use crate::text_summary;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "agent-run",
    version,
    about = "Submit goals to an agent backend (or a local simulator) and manage run history"
)]
pub struct Cli {
    /// Base URL of the Backend Agent Service
    #[arg(long, env = "AGENT_BACKEND_URL", global = true)]
    pub backend_url: Option<Url>,

    /// Execution mode: auto picks the backend when a URL is configured
    #[arg(long, env = "AGENT_MODE", value_enum, default_value_t = ExecutionMode::Auto, global = true)]
    pub mode: ExecutionMode,

    /// Ceiling for a single run
    #[arg(long, env = "AGENT_TIMEOUT", default_value = "30s", global = true)]
    pub timeout: humantime::Duration,

    /// Simulator: probability of an injected AGENT_ERROR
    #[arg(long, env = "AGENT_FAULT_RATE", default_value_t = 0.1, global = true)]
    pub fault_rate: f64,

    /// Simulator: minimum pause between steps
    #[arg(long, env = "AGENT_MIN_DELAY", default_value = "800ms", global = true)]
    pub min_delay: humantime::Duration,

    /// Simulator: maximum pause between steps
    #[arg(long, env = "AGENT_MAX_DELAY", default_value = "1200ms", global = true)]
    pub max_delay: humantime::Duration,

    /// Simulator: seed for reproducible runs
    #[arg(long, env = "AGENT_SEED", global = true)]
    pub seed: Option<u64>,

    /// History document location
    #[arg(long, env = "AGENT_HISTORY_FILE", global = true)]
    pub history_file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the agent once and print the result
    Run(RunArgs),
    /// Inspect and manage past runs
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Debug, clap::Args, Clone)]
pub struct RunArgs {
    /// What the agent should accomplish
    #[arg(long, required_unless_present = "request_file")]
    pub goal: Option<String>,

    /// Optional background information
    #[arg(long, conflicts_with = "request_file")]
    pub context: Option<String>,

    /// plan, checklist, email or summary_actions
    #[arg(long, default_value = "plan", conflicts_with = "request_file")]
    pub format: OutputFormat,

    /// professional, friendly or strict
    #[arg(long, default_value = "professional", conflicts_with = "request_file")]
    pub tone: Tone,

    /// Constraint label (repeatable)
    #[arg(long = "constraint", conflicts_with = "request_file")]
    pub constraints: Vec<String>,

    /// Read the request as JSON from a file, or `-` for stdin
    #[arg(long, conflicts_with = "goal")]
    pub request_file: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Use --save true or --save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub save: bool,

    /// Write the result as Markdown
    #[arg(long)]
    pub export_markdown: Option<PathBuf>,

    /// Write the result as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Copy the Markdown rendering to the clipboard
    #[cfg(feature = "clipboard")]
    #[arg(long)]
    pub copy: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum HistoryCommand {
    /// List saved runs, newest first
    List {
        /// Case-insensitive match on goal or title
        #[arg(long)]
        search: Option<String>,
        /// all, plan, checklist, email or summary_actions
        #[arg(long, default_value = "all")]
        format: FormatFilter,
        #[arg(long)]
        json: bool,
    },
    /// Show one saved run
    Show {
        run_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Render one saved run as Markdown or JSON
    Export {
        run_id: String,
        #[arg(long = "as", default_value = "markdown")]
        format: ExportFormat,
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write into the current directory under a generated file name
        #[arg(long, conflicts_with = "output")]
        here: bool,
    },
    /// Remove one saved run
    Remove { run_id: String },
    /// Remove all saved runs
    Clear,
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    match args.command {
        Command::Run(run_args) => run_agent(&cfg, run_args).await,
        Command::History { command } => run_history(&cfg, command),
    }
}

/// Build an `AgentConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<AgentConfig> {
    let defaults = AgentConfig::default();
    let cfg = AgentConfig {
        backend_url: args.backend_url.clone(),
        mode: args.mode,
        timeout: Duration::from(args.timeout),
        simulator: SimulatorConfig {
            fault_rate: args.fault_rate,
            min_delay: Duration::from(args.min_delay),
            max_delay: Duration::from(args.max_delay),
            seed: args.seed,
        },
        history_path: args.history_file.clone().unwrap_or(defaults.history_path),
        user_agent: defaults.user_agent,
    };
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn load_request(args: &RunArgs) -> Result<RunRequest> {
    if let Some(path) = args.request_file.as_deref() {
        let body = if path.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read request from stdin")?;
            buf
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("read request file {}", path.display()))?
        };
        return Ok(RunRequest::from_json_str(&body)?);
    }

    let Some(goal) = args.goal.clone() else {
        bail!("either --goal or --request-file is required");
    };
    let mut request = RunRequest::new(goal, args.format, args.tone);
    request.context = args.context.clone();
    if !args.constraints.is_empty() {
        request.constraints = Some(args.constraints.clone());
    }
    Ok(request.normalized())
}

async fn run_agent(cfg: &AgentConfig, args: RunArgs) -> Result<()> {
    let request = load_request(&args)?;
    let controller = RunController::new(cfg.executor()?, cfg.timeout);
    let (out_tx, out_handle) = spawn_output_writer();

    let handle = controller.start(request.clone());
    let canceller = handle.canceller();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let progress_tx = out_tx.clone();
    let outcome = handle
        .finish(|status| {
            if let Some(line) = stderr_progress(status) {
                let _ = progress_tx.send(OutputLine::Stderr(line));
            }
        })
        .await;
    signal_task.abort();

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            drop(progress_tx);
            drop(out_tx);
            let _ = out_handle.await;
            return Err(err.into());
        }
    };

    if args.json {
        let _ = out_tx.send(OutputLine::Stdout(export::to_json(&result)?));
    } else {
        for line in text_summary::build_text_summary(&result).lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    let store = HistoryStore::open(&cfg.history_path);
    let options = PostRunOptions {
        save: args.save,
        export_markdown: args.export_markdown.clone(),
        export_json: args.export_json.clone(),
    };
    let processed = process_run_completion(&options, &store, &request, &result);
    for msg in processed.messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }

    #[cfg(feature = "clipboard")]
    {
        if args.copy {
            match export::copy_to_clipboard(export::to_markdown(&result)).await {
                Ok(()) => {
                    let _ = out_tx.send(OutputLine::Stderr("Copied Markdown to clipboard".into()));
                }
                Err(e) => {
                    let _ = out_tx.send(OutputLine::Stderr(format!("Copy failed: {e:#}")));
                }
            }
        }
    }

    drop(progress_tx);
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Progress line for stderr. The terminal error is reported once, by `main`.
fn stderr_progress(status: &RunStatus) -> Option<String> {
    status.error.is_none().then(|| text_summary::progress_line(status))
}

fn run_history(cfg: &AgentConfig, command: HistoryCommand) -> Result<()> {
    let store = HistoryStore::open(&cfg.history_path);
    match command {
        HistoryCommand::List {
            search,
            format,
            json,
        } => {
            let entries = store.query(search.as_deref().unwrap_or(""), format)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for line in text_summary::history_lines(&entries) {
                    println!("{line}");
                }
            }
        }
        HistoryCommand::Show { run_id, json } => {
            let Some(entry) = store.get(&run_id)? else {
                bail!("no run with id {run_id} in history");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                println!(
                    "Goal: {} ({}, {})",
                    entry.request.goal, entry.request.output_format, entry.request.tone
                );
                println!();
                for line in text_summary::build_text_summary(&entry.result).lines {
                    println!("{line}");
                }
            }
        }
        HistoryCommand::Export {
            run_id,
            format,
            output,
            here,
        } => {
            if here {
                let Some(entry) = store.get(&run_id)? else {
                    bail!("no run with id {run_id} in history");
                };
                let path = export::export_to_current_dir(&entry.result, format)?;
                eprintln!("Exported {format}: {}", path.display());
                return Ok(());
            }
            match output {
                Some(path) => {
                    let Some(entry) = store.get(&run_id)? else {
                        bail!("no run with id {run_id} in history");
                    };
                    export::export_to_file(&path, &entry.result, format)?;
                    eprintln!("Exported {format}: {}", path.display());
                }
                None => {
                    let Some(text) = store.export(&run_id, format)? else {
                        bail!("no run with id {run_id} in history");
                    };
                    print!("{text}");
                }
            }
        }
        HistoryCommand::Remove { run_id } => {
            if store.remove(&run_id)? {
                eprintln!("Removed {run_id}");
            } else {
                eprintln!("No run with id {run_id} in history");
            }
        }
        HistoryCommand::Clear => {
            store.clear()?;
            eprintln!("History cleared");
        }
    }
    Ok(())
}
