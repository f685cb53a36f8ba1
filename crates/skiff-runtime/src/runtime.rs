//! Script execution on `deno_core`.
//!
//! Each run gets a fresh isolate on a dedicated thread (a `JsRuntime`
//! is not `Send`) with a current-thread tokio runtime driving the
//! event loop. A [`ScriptHost`] in the op state carries the redirected
//! argv, working directory, and output sink; user code never touches
//! the daemon's real stdio or process state.

use crate::loader::{self, Resolution};
use deno_core::error::AnyError;
use deno_core::{extension, op2, JsRuntime, OpState, RuntimeOptions};
use serde::Serialize;
use skiff_core::compat;
use skiff_core::sink::Sink;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bootstrap JavaScript setting up console, process, timers, require.
const BOOTSTRAP_JS: &str = include_str!("bootstrap.js");

/// What to execute.
#[derive(Debug, Clone)]
pub enum RunRequest {
    /// Run a project file with arguments (`node file.js ...`).
    File { entry: String, args: Vec<String> },
    /// Evaluate an expression (`node -e` / `node -p`).
    Eval { source: String, print: bool },
}

/// Per-run host state exposed to ops.
struct ScriptHost {
    argv: Vec<String>,
    cwd: PathBuf,
    sink: Sink,
    exit_code: Cell<Option<i32>>,
}

impl ScriptHost {
    fn from_state(state: &OpState) -> Rc<Self> {
        state.borrow::<Rc<ScriptHost>>().clone()
    }
}

/// Resolution result crossing the op boundary.
#[derive(Serialize)]
struct ResolvedModule {
    #[serde(skip_serializing_if = "Option::is_none")]
    builtin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
}

extension!(
    skiff_host,
    ops = [
        op_skiff_stdout,
        op_skiff_stderr,
        op_skiff_set_exit_code,
        op_skiff_argv,
        op_skiff_cwd,
        op_skiff_env,
        op_skiff_platform,
        op_skiff_arch,
        op_skiff_node_version,
        op_skiff_resolve,
        op_skiff_read_file,
        op_skiff_write_file,
        op_skiff_exists,
        op_skiff_is_dir,
        op_skiff_read_dir,
        op_skiff_mkdir,
        op_skiff_remove_file,
        op_skiff_sleep,
    ],
    options = { host: Rc<ScriptHost> },
    state = |state, options| {
        state.put(options.host);
    },
);

#[op2(fast)]
fn op_skiff_stdout(state: &mut OpState, #[string] msg: &str) {
    ScriptHost::from_state(state).sink.out(msg);
}

#[op2(fast)]
fn op_skiff_stderr(state: &mut OpState, #[string] msg: &str) {
    ScriptHost::from_state(state).sink.err(msg);
}

#[op2(fast)]
fn op_skiff_set_exit_code(state: &mut OpState, code: i32) {
    ScriptHost::from_state(state).exit_code.set(Some(code));
}

#[op2]
#[serde]
fn op_skiff_argv(state: &mut OpState) -> Vec<String> {
    ScriptHost::from_state(state).argv.clone()
}

#[op2]
#[string]
fn op_skiff_cwd(state: &mut OpState) -> String {
    ScriptHost::from_state(state).cwd.display().to_string()
}

#[op2]
#[string]
fn op_skiff_env(#[string] key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[op2]
#[string]
fn op_skiff_platform() -> String {
    compat::platform().to_string()
}

#[op2]
#[string]
fn op_skiff_arch() -> String {
    compat::arch().to_string()
}

#[op2]
#[string]
fn op_skiff_node_version() -> String {
    compat::NODE_VERSION.to_string()
}

#[op2]
#[serde]
fn op_skiff_resolve(
    #[string] base_dir: &str,
    #[string] specifier: &str,
) -> Result<ResolvedModule, AnyError> {
    match loader::resolve_require(Path::new(base_dir), specifier) {
        Ok(Resolution::Builtin(name)) => Ok(ResolvedModule {
            builtin: Some(name),
            file: None,
        }),
        Ok(Resolution::File(path)) => Ok(ResolvedModule {
            builtin: None,
            file: Some(path.display().to_string()),
        }),
        Err(message) => Err(AnyError::msg(message)),
    }
}

#[op2]
#[string]
fn op_skiff_read_file(#[string] path: &str) -> Result<String, AnyError> {
    std::fs::read_to_string(path).map_err(AnyError::from)
}

#[op2(fast)]
fn op_skiff_write_file(#[string] path: &str, #[string] contents: &str) -> Result<(), AnyError> {
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).map_err(AnyError::from)
}

#[op2(fast)]
fn op_skiff_exists(#[string] path: &str) -> bool {
    Path::new(path).exists()
}

#[op2(fast)]
fn op_skiff_is_dir(#[string] path: &str) -> bool {
    Path::new(path).is_dir()
}

#[op2]
#[serde]
fn op_skiff_read_dir(#[string] path: &str) -> Result<Vec<String>, AnyError> {
    let mut names: Vec<String> = std::fs::read_dir(path)?
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}

#[op2(fast)]
fn op_skiff_mkdir(#[string] path: &str) -> Result<(), AnyError> {
    std::fs::create_dir_all(path).map_err(AnyError::from)
}

#[op2(fast)]
fn op_skiff_remove_file(#[string] path: &str) -> Result<(), AnyError> {
    std::fs::remove_file(path).map_err(AnyError::from)
}

#[op2(async)]
async fn op_skiff_sleep(ms: u32) {
    tokio::time::sleep(std::time::Duration::from_millis(u64::from(ms))).await;
}

/// Execute a script request to completion (or cancellation).
///
/// Spawns a dedicated thread for the isolate and returns its exit
/// code; errors never propagate past this function.
pub async fn run(
    request: RunRequest,
    cwd: PathBuf,
    sink: Sink,
    cancel: CancellationToken,
) -> i32 {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let thread_sink = sink.clone();

    std::thread::spawn(move || {
        let code = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => {
                runtime.block_on(execute(request, cwd, thread_sink.clone(), cancel))
            }
            Err(e) => {
                thread_sink.err_line(&format!("failed to start script runtime: {e}"));
                1
            }
        };
        let _ = tx.send(code);
    });

    rx.await.unwrap_or(1)
}

async fn execute(request: RunRequest, cwd: PathBuf, sink: Sink, cancel: CancellationToken) -> i32 {
    let (script, argv) = match prepare(&request, &cwd, &sink) {
        Ok(prepared) => prepared,
        Err(code) => return code,
    };

    let host = Rc::new(ScriptHost {
        argv,
        cwd,
        sink: sink.clone(),
        exit_code: Cell::new(None),
    });

    let mut js_runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![skiff_host::init_ops(host.clone())],
        ..Default::default()
    });

    if let Err(e) = js_runtime.execute_script("skiff:bootstrap", BOOTSTRAP_JS) {
        sink.err_line(&format!("runtime bootstrap failed: {e}"));
        return 1;
    }

    debug!(?request, "running script");

    // The bootstrap entry points catch user errors themselves; an
    // error here means the embedding is broken.
    if let Err(e) = js_runtime.execute_script("skiff:main", script) {
        sink.err_line(&format!("{e}"));
        return host.exit_code.get().unwrap_or(1);
    }

    // Drive pending timers and promises; a long-running program stays
    // here until its work drains or the task is killed.
    tokio::select! {
        biased;

        () = cancel.cancelled() => crate::EXIT_CANCELED,

        result = js_runtime.run_event_loop(Default::default()) => {
            if let Err(e) = result {
                sink.err_line(&format!("{e}"));
                return host.exit_code.get().unwrap_or(1);
            }
            host.exit_code.get().unwrap_or(0)
        }
    }
}

/// Turn a request into the JS dispatch call and the script's argv.
fn prepare(request: &RunRequest, cwd: &Path, sink: &Sink) -> Result<(String, Vec<String>), i32> {
    match request {
        RunRequest::File { entry, args } => {
            let specifier = if Path::new(entry).is_absolute() {
                entry.clone()
            } else {
                format!("./{}", entry.trim_start_matches("./"))
            };
            let resolved = loader::resolve_require(cwd, &specifier).map_err(|message| {
                sink.err_line(&message);
                1
            })?;
            let Resolution::File(path) = resolved else {
                sink.err_line(&format!("Cannot find module '{entry}'"));
                return Err(1);
            };

            let path_text = path.display().to_string();
            let mut argv = vec!["node".to_string(), path_text.clone()];
            argv.extend(args.iter().cloned());

            Ok((format!("__skiffRun.main({})", js_string(&path_text)), argv))
        }
        RunRequest::Eval { source, print } => Ok((
            format!("__skiffRun.eval({}, {print})", js_string(source)),
            vec!["node".to_string()],
        )),
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_core::sink::StreamKind;
    use std::sync::{Arc, Mutex};

    fn capture() -> (Sink, Arc<Mutex<Vec<(StreamKind, String)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let inner = log.clone();
        let sink = Sink::new(move |kind, data| {
            inner.lock().unwrap().push((kind, data.to_string()));
        });
        (sink, log)
    }

    fn stdout_of(log: &Arc<Mutex<Vec<(StreamKind, String)>>>) -> String {
        log.lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == StreamKind::Stdout)
            .map(|(_, d)| d.clone())
            .collect()
    }

    fn stderr_of(log: &Arc<Mutex<Vec<(StreamKind, String)>>>) -> String {
        log.lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == StreamKind::Stderr)
            .map(|(_, d)| d.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_eval_console_log() {
        let (sink, log) = capture();
        let code = run(
            RunRequest::Eval {
                source: "console.log(2+2)".to_string(),
                print: false,
            },
            std::env::temp_dir(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(code, 0);
        assert_eq!(stdout_of(&log), "4\n");
    }

    #[tokio::test]
    async fn test_eval_print_expression() {
        let (sink, log) = capture();
        let code = run(
            RunRequest::Eval {
                source: "1 + 2".to_string(),
                print: true,
            },
            std::env::temp_dir(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(code, 0);
        assert_eq!(stdout_of(&log), "3\n");
    }

    #[tokio::test]
    async fn test_console_error_goes_to_stderr() {
        let (sink, log) = capture();
        run(
            RunRequest::Eval {
                source: "console.error('bad')".to_string(),
                print: false,
            },
            std::env::temp_dir(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(stderr_of(&log), "bad\n");
        assert!(stdout_of(&log).is_empty());
    }

    #[tokio::test]
    async fn test_process_exit_code() {
        let (sink, _log) = capture();
        let code = run(
            RunRequest::Eval {
                source: "process.exit(3)".to_string(),
                print: false,
            },
            std::env::temp_dir(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(code, 3);
    }

    #[tokio::test]
    async fn test_runtime_error_exit_one() {
        let (sink, log) = capture();
        let code = run(
            RunRequest::Eval {
                source: "undefinedFunction()".to_string(),
                print: false,
            },
            std::env::temp_dir(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(code, 1);
        assert!(stderr_of(&log).contains("undefinedFunction"));
    }

    #[tokio::test]
    async fn test_object_inspection() {
        let (sink, log) = capture();
        run(
            RunRequest::Eval {
                source: "console.log({a: 1, b: [true, 'x']})".to_string(),
                print: false,
            },
            std::env::temp_dir(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(stdout_of(&log), "{ a: 1, b: [ true, \"x\" ] }\n");
    }

    #[tokio::test]
    async fn test_run_file_with_require() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("util.js"),
            "module.exports.double = (n) => n * 2;",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("main.js"),
            "#!/usr/bin/env node\nconst { double } = require('./util');\nconsole.log(double(21));",
        )
        .unwrap();

        let (sink, log) = capture();
        let code = run(
            RunRequest::File {
                entry: "main.js".to_string(),
                args: vec![],
            },
            dir.path().to_path_buf(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(code, 0);
        assert_eq!(stdout_of(&log), "42\n");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, log) = capture();
        let code = run(
            RunRequest::File {
                entry: "ghost.js".to_string(),
                args: vec![],
            },
            dir.path().to_path_buf(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(code, 1);
        assert!(stderr_of(&log).contains("Cannot find module"));
    }

    #[tokio::test]
    async fn test_argv_visible() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("args.js"),
            "console.log(process.argv.slice(2).join(','));",
        )
        .unwrap();

        let (sink, log) = capture();
        run(
            RunRequest::File {
                entry: "args.js".to_string(),
                args: vec!["a".to_string(), "b".to_string()],
            },
            dir.path().to_path_buf(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(stdout_of(&log), "a,b\n");
    }

    #[tokio::test]
    async fn test_cancellation_exits_130() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("server.js"),
            "setInterval(() => console.log('tick'), 50);",
        )
        .unwrap();

        let (sink, log) = capture();
        let cancel = CancellationToken::new();
        let canceler = cancel.clone();

        let task = tokio::spawn(run(
            RunRequest::File {
                entry: "server.js".to_string(),
                args: vec![],
            },
            dir.path().to_path_buf(),
            sink,
            cancel,
        ));

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        canceler.cancel();

        let code = task.await.unwrap();
        assert_eq!(code, crate::EXIT_CANCELED);
        assert!(stdout_of(&log).contains("tick"));
    }

    #[tokio::test]
    async fn test_timer_runs() {
        let (sink, log) = capture();
        let code = run(
            RunRequest::Eval {
                source: "setTimeout(() => console.log('later'), 10);".to_string(),
                print: false,
            },
            std::env::temp_dir(),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(code, 0);
        assert_eq!(stdout_of(&log), "later\n");
    }
}
