use agent_run::cli;
use agent_run::error::AgentError;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env before parsing so env-backed flags see it.
    let _ = dotenvy::dotenv();
    let args = cli::Cli::parse();
    init_tracing(args.verbose);

    if let Err(e) = cli::run(args).await {
        match e.downcast_ref::<AgentError>() {
            Some(agent) => eprintln!("{agent}"),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
