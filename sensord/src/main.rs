//! sensord エントリーポイント

use clap::Parser;
use sensord::cli::{Cli, Commands};
use sensord::shutdown::ShutdownController;
use sensord::{logging, Agent, SensordResult};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Probe(args)) => {
            if let Err(e) = sensord::cli::probe::execute(&args).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run(args)) => run(args).await,
        None => {
            // サブコマンドなしは run として扱う
            run(cli.run).await
        }
    }
}

async fn run(args: sensord::cli::run::RunArgs) {
    let guard = logging::init().expect("failed to initialize logging");

    if let Err(e) = run_agent(args).await {
        tracing::error!(error = %e, "Agent terminated");
        // exitはデストラクタを走らせないため、先にログを書き出す
        drop(guard);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_agent(args: sensord::cli::run::RunArgs) -> SensordResult<()> {
    let config = args.into_config()?;
    let agent = Agent::start(config, ShutdownController::default()).await?;
    agent.run_until_shutdown().await
}
