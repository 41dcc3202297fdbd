use clap::Parser;
use kiln::cli::{Args, BuildOptions, Commands, GraphOptions};
use kiln::env;
use kiln::executor::{Interrupt, LoggingObserver};
use kiln::integration::BuildSession;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("kiln=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env::DEFAULT_LOG_FILTER))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Commands::Run { build, graph } => run(build, graph).await,
        Commands::Ls { build, graph } => ls(build, graph).await,
    };

    if let Err(err) = result {
        eprintln!("\nerror: {err:#}");
        std::process::exit(1);
    }
}

async fn run(build: BuildOptions, graph: GraphOptions) -> anyhow::Result<()> {
    let interrupt = Interrupt::new();
    interrupt.trigger_on_ctrl_c();

    let session = BuildSession::open(build)?.with_interrupt(interrupt);
    info!("Build state name: {}", session.state_name());
    session.run(&graph, Arc::new(LoggingObserver::new())).await?;
    Ok(())
}

async fn ls(build: BuildOptions, graph: GraphOptions) -> anyhow::Result<()> {
    let session = BuildSession::open(build)?;
    print!("{}", session.list(&graph).await?);
    Ok(())
}
