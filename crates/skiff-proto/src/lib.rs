#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Frame types for the skiff message channel.
//!
//! The host app and the backend exchange line-delimited JSON frames:
//! one frame per line, UTF-8, no framing beyond the newline. Inbound
//! frames carry a request `id`; every reply echoes that id except
//! `ready` (sent once at startup).

use serde::{Deserialize, Serialize};

/// Channel protocol schema version. Bump when changing frame shapes.
pub const PROTO_SCHEMA_VERSION: u32 = 1;

/// A directory listing entry, as returned by `readDir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
}

/// A frame received from the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    /// Liveness probe; replied to with `pong`.
    Ping { id: u64 },

    /// Execute a developer command in `cwd`.
    Exec {
        id: u64,
        command: String,
        #[serde(default)]
        args: Vec<String>,
        cwd: String,
    },

    /// Cancel the task identified by `process_id`.
    #[serde(rename_all = "camelCase")]
    Kill { id: u64, process_id: u64 },

    /// Write `content` to `path`, creating parent directories.
    WriteFile {
        id: u64,
        path: String,
        content: String,
    },

    /// Read `path` as UTF-8 text.
    ReadFile { id: u64, path: String },

    /// Create a directory (and parents) at `path`.
    Mkdir { id: u64, path: String },

    /// List the entries of the directory at `path`.
    ReadDir { id: u64, path: String },

    /// Query runtime/platform information.
    GetInfo { id: u64 },
}

impl Inbound {
    /// The request id carried by this frame.
    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            Self::Ping { id }
            | Self::Exec { id, .. }
            | Self::Kill { id, .. }
            | Self::WriteFile { id, .. }
            | Self::ReadFile { id, .. }
            | Self::Mkdir { id, .. }
            | Self::ReadDir { id, .. }
            | Self::GetInfo { id } => *id,
        }
    }
}

/// A frame sent to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    /// Emitted exactly once at startup.
    #[serde(rename_all = "camelCase")]
    Ready { node_version: String },

    /// Reply to `ping`.
    #[serde(rename_all = "camelCase")]
    Pong {
        id: u64,
        node_version: String,
        platform: String,
    },

    /// A chunk of standard output from a running task.
    Stdout { id: u64, data: String },

    /// A chunk of standard error from a running task.
    Stderr { id: u64, data: String },

    /// Terminal frame: the task finished with an exit code.
    Exit {
        id: u64,
        code: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        signal: Option<String>,
    },

    /// Terminal frame: the handler failed before producing an exit code.
    Error { id: u64, message: String },

    /// Terminal frame for fire-and-forget filesystem operations.
    Done { id: u64 },

    /// Terminal frame: the task was canceled via `kill`.
    Killed { id: u64 },

    /// Reply carrying data for `readFile` / `readDir`.
    Result {
        id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        entries: Option<Vec<DirEntry>>,
    },

    /// Reply to `getInfo`.
    #[serde(rename_all = "camelCase")]
    Info {
        id: u64,
        node_version: String,
        platform: String,
        arch: String,
        datadir: String,
        projects_dir: String,
        exec_path: String,
    },
}

impl Outbound {
    /// True for frames that end a task's frame sequence.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Exit { .. } | Self::Error { .. } | Self::Done { .. } | Self::Killed { .. }
        )
    }
}

/// Encode a frame as a single JSON line (newline included).
///
/// # Errors
/// Returns an error if the frame cannot be serialized.
pub fn encode_frame(frame: &Outbound) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line from the channel into an inbound frame.
///
/// # Errors
/// Returns an error if the line is not a recognized frame.
pub fn decode_line(line: &str) -> Result<Inbound, serde_json::Error> {
    serde_json::from_str(line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_exec() {
        let frame = decode_line(
            r#"{"type":"exec","id":1,"command":"node","args":["-e","console.log(2+2)"],"cwd":"/p"}"#,
        )
        .unwrap();
        match frame {
            Inbound::Exec {
                id, command, args, ..
            } => {
                assert_eq!(id, 1);
                assert_eq!(command, "node");
                assert_eq!(args, vec!["-e", "console.log(2+2)"]);
            }
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[test]
    fn test_decode_exec_default_args() {
        let frame = decode_line(r#"{"type":"exec","id":7,"command":"pwd","cwd":"/p"}"#).unwrap();
        match frame {
            Inbound::Exec { args, .. } => assert!(args.is_empty()),
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[test]
    fn test_decode_kill_field_name() {
        let frame = decode_line(r#"{"type":"kill","id":9,"processId":1}"#).unwrap();
        match frame {
            Inbound::Kill { id, process_id } => {
                assert_eq!(id, 9);
                assert_eq!(process_id, 1);
            }
            other => panic!("wrong frame: {other:?}"),
        }
    }

    #[test]
    fn test_encode_stdout_line() {
        let line = encode_frame(&Outbound::Stdout {
            id: 1,
            data: "4\n".to_string(),
        })
        .unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains(r#""type":"stdout""#));
    }

    #[test]
    fn test_exit_signal_omitted_when_none() {
        let line = encode_frame(&Outbound::Exit {
            id: 3,
            code: 0,
            signal: None,
        })
        .unwrap();
        assert!(!line.contains("signal"));
    }

    #[test]
    fn test_camel_case_type_tags() {
        let line = encode_frame(&Outbound::Ready {
            node_version: "v20.11.1".to_string(),
        })
        .unwrap();
        assert!(line.contains(r#""type":"ready""#));
        assert!(line.contains(r#""nodeVersion":"v20.11.1""#));

        let frame = decode_line(r#"{"type":"readDir","id":2,"path":"/p"}"#).unwrap();
        assert!(matches!(frame, Inbound::ReadDir { .. }));
        let frame = decode_line(r#"{"type":"getInfo","id":3}"#).unwrap();
        assert!(matches!(frame, Inbound::GetInfo { .. }));
    }

    #[test]
    fn test_terminal_frames() {
        assert!(Outbound::Done { id: 1 }.is_terminal());
        assert!(Outbound::Killed { id: 1 }.is_terminal());
        assert!(!Outbound::Stdout {
            id: 1,
            data: String::new()
        }
        .is_terminal());
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(decode_line(r#"{"type":"launchMissiles","id":1}"#).is_err());
        assert!(decode_line("not json").is_err());
    }
}
