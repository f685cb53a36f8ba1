//! The message loop.
//!
//! Frames arrive one JSON object per line. Filesystem bridge ops are
//! answered inline; `exec` spawns a supervised task so the loop can
//! keep reading (and a later `kill` can reach it).

use crate::router;
use crate::state::DaemonState;
use skiff_core::{compat, fsops};
use skiff_proto::{decode_line, encode_frame, DirEntry, Inbound, Outbound};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

/// Drain outbound frames onto the channel writer, one per line.
pub async fn write_frames<W: AsyncWrite + Unpin>(
    mut frames: UnboundedReceiver<Outbound>,
    mut writer: W,
) {
    while let Some(frame) = frames.recv().await {
        match encode_frame(&frame) {
            Ok(line) => {
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                let _ = writer.flush().await;
            }
            Err(e) => warn!(error = %e, "failed to encode frame"),
        }
    }
}

/// Read frames until EOF. On EOF all live tasks are canceled.
pub async fn run_loop<R>(reader: R, state: Arc<DaemonState>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(&line) {
            Ok(frame) => handle_frame(&state, frame),
            Err(e) => {
                debug!(error = %e, "unrecognized frame");
                state.send(Outbound::Error {
                    id: salvage_id(&line),
                    message: format!("invalid frame: {e}"),
                });
            }
        }
    }

    state.cancel_all();
}

/// Best-effort id recovery from a frame that failed to decode.
fn salvage_id(line: &str) -> u64 {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("id")?.as_u64())
        .unwrap_or(0)
}

/// Handle one decoded frame. Filesystem ops reply synchronously;
/// `exec` is spawned.
pub fn handle_frame(state: &Arc<DaemonState>, frame: Inbound) {
    match frame {
        Inbound::Ping { id } => {
            state.send(Outbound::Pong {
                id,
                node_version: compat::NODE_VERSION.to_string(),
                platform: compat::platform().to_string(),
            });
        }

        Inbound::GetInfo { id } => {
            let exec_path = std::env::current_exe()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            state.send(Outbound::Info {
                id,
                node_version: compat::NODE_VERSION.to_string(),
                platform: compat::platform().to_string(),
                arch: compat::arch().to_string(),
                datadir: state.config.datadir.display().to_string(),
                projects_dir: state.config.projects_dir().display().to_string(),
                exec_path,
            });
        }

        Inbound::Exec {
            id,
            command,
            args,
            cwd,
        } => {
            let state = state.clone();
            tokio::spawn(router::handle_exec(state, id, command, args, cwd));
        }

        Inbound::Kill { id, process_id } => {
            if state.cancel_task(process_id) {
                state.send(Outbound::Killed { id });
            } else {
                state.send(Outbound::Error {
                    id,
                    message: format!("no such process: {process_id}"),
                });
            }
        }

        Inbound::WriteFile { id, path, content } => {
            match fsops::write_file(Path::new(&path), &content) {
                Ok(()) => {
                    state.changes.mark();
                    state.send(Outbound::Done { id });
                }
                Err(e) => state.send(Outbound::Error {
                    id,
                    message: e.to_string(),
                }),
            }
        }

        Inbound::ReadFile { id, path } => match fsops::read_file(Path::new(&path)) {
            Ok(content) => state.send(Outbound::Result {
                id,
                content: Some(content),
                entries: None,
            }),
            Err(e) => state.send(Outbound::Error {
                id,
                message: e.to_string(),
            }),
        },

        Inbound::Mkdir { id, path } => match fsops::make_dir(Path::new(&path)) {
            Ok(()) => state.send(Outbound::Done { id }),
            Err(e) => state.send(Outbound::Error {
                id,
                message: e.to_string(),
            }),
        },

        Inbound::ReadDir { id, path } => match fsops::read_dir(Path::new(&path)) {
            Ok(entries) => state.send(Outbound::Result {
                id,
                content: None,
                entries: Some(
                    entries
                        .into_iter()
                        .map(|e| DirEntry {
                            name: e.name,
                            is_directory: e.is_directory,
                        })
                        .collect(),
                ),
            }),
            Err(e) => state.send(Outbound::Error {
                id,
                message: e.to_string(),
            }),
        },
    }
}
