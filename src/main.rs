use anyhow::Result;
use clap::Parser;
use drndump::cli::{write_command, Cli, ProgressBarObserver};
use drndump::dump::{DumpClient, DumpSession};
use drndump::transport::FrameTransport;
use std::io::{self, BufWriter, Write};
use std::process;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(&cli).await {
        tracing::debug!(error = ?e, "dump did not complete");
        eprintln!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = cli.resolve_config()?;
    tracing::debug!(?config, "resolved configuration");

    let transport = FrameTransport::connect(&config.host, config.port).await?;

    let mut session = DumpSession::new(&config.dataset, config.effective_messages_per_second());
    if cli.progress {
        session = session.with_observer(ProgressBarObserver::new(&config.dataset));
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut client = DumpClient::new(transport, session);
    let summary = client
        .run(|command| write_command(&mut out, &command))
        .await?;
    out.flush()?;

    tracing::info!(
        received = summary.received,
        forecasted = summary.forecasted,
        "dump complete"
    );
    Ok(())
}
