//! `skiffd`: the backend daemon binary.

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use skiff_core::{compat, Config};
use skiff_daemon::state::DaemonState;
use skiff_daemon::{logging, server};
use skiff_proto::Outbound;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "skiffd")]
#[command(author, version, about = "The skiff IDE backend daemon", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit JSON formatted logs on stderr
    #[arg(long)]
    json: bool,

    /// Override the data directory
    #[arg(long, value_name = "PATH")]
    datadir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    let mut config = Config::from_env()
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);
    if let Some(datadir) = cli.datadir {
        config = config.with_datadir(datadir);
    }

    std::fs::create_dir_all(config.projects_dir()).into_diagnostic()?;
    info!(datadir = %config.datadir.display(), "starting");

    let (frames_tx, frames_rx) = tokio::sync::mpsc::unbounded_channel();
    let state = Arc::new(DaemonState::new(config, frames_tx));

    let writer = tokio::spawn(server::write_frames(frames_rx, tokio::io::stdout()));

    state.send(Outbound::Ready {
        node_version: compat::NODE_VERSION.to_string(),
    });

    server::run_loop(tokio::io::stdin(), state).await;

    // The loop returned on EOF; give queued frames a moment to drain
    // before the process exits.
    let _ = tokio::time::timeout(std::time::Duration::from_millis(200), writer).await;
    Ok(())
}
