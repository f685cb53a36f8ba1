//! Command router and task supervisor.
//!
//! Every inbound `exec` becomes a task: a record in the daemon's task
//! table holding its cancellation token, and an output sink that turns
//! each write into a `stdout`/`stderr` frame carrying the task id.
//! Dispatch fans out to the shell builtins, the script runtime, or the
//! npm layer; whatever happens, exactly one terminal frame ends the
//! sequence.

use crate::npm;
use crate::state::DaemonState;
use skiff_core::compat;
use skiff_core::shell;
use skiff_core::sink::{Sink, StreamKind};
use skiff_proto::Outbound;
use skiff_runtime::{resolve_bin, RunRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Exit code for unknown commands.
const EXIT_NOT_FOUND: i32 = 127;

/// Handle one `exec` frame to completion. Runs inside its own spawned
/// task; the message loop never blocks on it.
pub async fn handle_exec(
    state: Arc<DaemonState>,
    id: u64,
    command: String,
    args: Vec<String>,
    cwd: String,
) {
    let cwd = PathBuf::from(cwd);
    if let Err(e) = std::fs::create_dir_all(&cwd) {
        state.send(Outbound::Error {
            id,
            message: format!("invalid working directory {}: {e}", cwd.display()),
        });
        return;
    }

    let cancel = state.register_task(id);
    let sink = frame_sink(&state, id);

    info!(id, %command, "exec");
    let code = dispatch(&state, &command, &args, &cwd, &sink, &cancel).await;
    debug!(id, code, "exec finished");

    let signal = if code == skiff_runtime::EXIT_CANCELED {
        Some("SIGTERM".to_string())
    } else {
        None
    };
    state.send(Outbound::Exit { id, code, signal });
    state.remove_task(id);

    // The command may have touched project files.
    state.changes.mark();
}

/// The per-task emit pair: every chunk becomes a frame with this id.
fn frame_sink(state: &Arc<DaemonState>, id: u64) -> Sink {
    let state = state.clone();
    Sink::new(move |kind, data| {
        let frame = match kind {
            StreamKind::Stdout => Outbound::Stdout {
                id,
                data: data.to_string(),
            },
            StreamKind::Stderr => Outbound::Stderr {
                id,
                data: data.to_string(),
            },
        };
        state.send(frame);
    })
}

/// Route a command line to the owning subsystem.
pub async fn dispatch(
    state: &Arc<DaemonState>,
    command: &str,
    args: &[String],
    cwd: &Path,
    sink: &Sink,
    cancel: &CancellationToken,
) -> i32 {
    match command {
        "node" => node_command(args, cwd, sink, cancel).await,
        "npx" => npx_command(args, cwd, sink, cancel).await,
        "npm" | "yarn" | "pnpm" | "bun" => {
            npm::run_npm(state, args, cwd, sink, cancel).await
        }
        name if shell::is_builtin(name) => {
            shell::run_builtin(name, args, cwd, sink).unwrap_or(EXIT_NOT_FOUND)
        }
        name => {
            sink.err_line(&format!("{name}: command not found"));
            EXIT_NOT_FOUND
        }
    }
}

async fn node_command(args: &[String], cwd: &Path, sink: &Sink, cancel: &CancellationToken) -> i32 {
    match args.first().map(String::as_str) {
        Some("-v" | "--version") => {
            sink.out_line(compat::NODE_VERSION);
            0
        }
        Some("-e" | "--eval") => eval_command(args, false, cwd, sink, cancel).await,
        Some("-p" | "--print") => eval_command(args, true, cwd, sink, cancel).await,
        Some(entry) => {
            let request = RunRequest::File {
                entry: entry.to_string(),
                args: args[1..].to_vec(),
            };
            skiff_runtime::run(request, cwd.to_path_buf(), sink.clone(), cancel.clone()).await
        }
        None => {
            sink.err_line("usage: node [-e|-p <code>] <file> [args...]");
            1
        }
    }
}

async fn eval_command(
    args: &[String],
    print: bool,
    cwd: &Path,
    sink: &Sink,
    cancel: &CancellationToken,
) -> i32 {
    let Some(source) = args.get(1) else {
        sink.err_line("node: missing script for -e/-p");
        return 1;
    };
    let request = RunRequest::Eval {
        source: source.clone(),
        print,
    };
    skiff_runtime::run(request, cwd.to_path_buf(), sink.clone(), cancel.clone()).await
}

async fn npx_command(args: &[String], cwd: &Path, sink: &Sink, cancel: &CancellationToken) -> i32 {
    let Some(name) = args.first() else {
        sink.err_line("usage: npx <command> [args...]");
        return 1;
    };

    let Some(target) = resolve_bin(cwd, name) else {
        sink.err_line(&format!("npx: command not found: {name}"));
        return EXIT_NOT_FOUND;
    };

    let request = RunRequest::File {
        entry: target.display().to_string(),
        args: args[1..].to_vec(),
    };
    skiff_runtime::run(request, cwd.to_path_buf(), sink.clone(), cancel.clone()).await
}
