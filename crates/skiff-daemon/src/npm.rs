//! The npm command layer.
//!
//! Parses `npm <subcommand>` invocations coming through `exec` and
//! drives the resolver/installer pipeline in `skiff-core`. `yarn`,
//! `pnpm`, and `bun` alias here unchanged.

use crate::preview;
use crate::state::DaemonState;
use serde_json::{json, Value};
use skiff_core::compat;
use skiff_core::pkg::{
    install_resolved, package_dir, Lockfile, PackageSpec, RegistryClient, Resolver,
};
use skiff_core::sink::Sink;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Entry point for `npm`/`yarn`/`pnpm`/`bun`.
pub async fn run_npm(
    state: &Arc<DaemonState>,
    args: &[String],
    cwd: &Path,
    sink: &Sink,
    cancel: &CancellationToken,
) -> i32 {
    let Some(subcommand) = args.first().map(String::as_str) else {
        print_help(sink);
        return 0;
    };
    let rest = &args[1..];

    match subcommand {
        "-v" | "--version" => {
            sink.out_line(compat::NPM_VERSION);
            0
        }
        "help" | "--help" => {
            print_help(sink);
            0
        }
        "install" | "i" | "add" => install(state, rest, cwd, sink, cancel, false).await,
        "ci" => install(state, rest, cwd, sink, cancel, true).await,
        "run" | "run-script" => run_script_command(state, rest, cwd, sink, cancel).await,
        "start" => start(state, rest, cwd, sink, cancel).await,
        "test" => test(state, cwd, sink, cancel).await,
        "init" => init(cwd, sink),
        "ls" | "list" => list(cwd, sink),
        "uninstall" | "remove" | "rm" | "un" => uninstall(rest, cwd, sink),
        other => {
            sink.err_line(&format!("npm error Unknown command: \"{other}\""));
            1
        }
    }
}

fn print_help(sink: &Sink) {
    sink.out_line("Usage: npm <command>");
    sink.out_line("");
    sink.out_line("Commands:");
    sink.out_line("  install [pkg...]   install dependencies (aliases: i, add, ci)");
    sink.out_line("  run <script>       run a package.json script");
    sink.out_line("  start              run the start script or the preview server");
    sink.out_line("  test               run the test script");
    sink.out_line("  init               create a package.json");
    sink.out_line("  ls                 list installed packages");
    sink.out_line("  uninstall <pkg...> remove packages");
}

// ---------------------------------------------------------------------------
// install
// ---------------------------------------------------------------------------

struct InstallArgs {
    specs: Vec<String>,
    save_dev: bool,
    production: bool,
}

fn parse_install_args(args: &[String]) -> InstallArgs {
    let mut parsed = InstallArgs {
        specs: Vec::new(),
        save_dev: false,
        production: false,
    };
    for arg in args {
        match arg.as_str() {
            "--save-dev" | "-D" => parsed.save_dev = true,
            "--production" | "--omit=dev" => parsed.production = true,
            "--save" | "-S" => {}
            flag if flag.starts_with('-') => {}
            spec => parsed.specs.push(spec.to_string()),
        }
    }
    parsed
}

async fn install(
    state: &Arc<DaemonState>,
    args: &[String],
    cwd: &Path,
    sink: &Sink,
    cancel: &CancellationToken,
    clean: bool,
) -> i32 {
    let parsed = parse_install_args(args);

    let client = match RegistryClient::new(&state.config.registry_url) {
        Ok(client) => client,
        Err(e) => {
            sink.err_line(&format!("npm error {e}"));
            return 1;
        }
    };

    if clean {
        let _ = std::fs::remove_dir_all(cwd.join("node_modules"));
    }

    // Explicit specs first update package.json, then the whole project
    // resolves so the lockfile stays complete and deterministic.
    if !parsed.specs.is_empty() {
        let mut specs = Vec::new();
        for raw in &parsed.specs {
            match PackageSpec::parse(raw) {
                Ok(spec) => specs.push(spec),
                Err(e) => {
                    sink.err_line(&format!("npm error {e}"));
                    return 1;
                }
            }
        }

        let mut resolver = Resolver::new(client.clone());
        let result = match resolver.resolve_specs(&specs, cancel).await {
            Ok(result) => result,
            Err(e) if e.is_canceled() => return skiff_runtime::EXIT_CANCELED,
            Err(e) => {
                sink.err_line(&format!("npm error {}", e.message()));
                return 1;
            }
        };
        for warning in resolver.warnings() {
            sink.err_line(&format!("npm warn {warning}"));
        }

        if let Err(e) = save_new_deps(cwd, &result.new_deps, parsed.save_dev) {
            sink.err_line(&format!("npm error {e}"));
            return 1;
        }
    }

    let package_json = read_package_json(cwd).unwrap_or_else(|| json!({}));

    let mut resolver = Resolver::new(client.clone());
    let resolved = match resolver
        .resolve_project(&package_json, parsed.production, cancel)
        .await
    {
        Ok(resolved) => resolved,
        Err(e) if e.is_canceled() => return skiff_runtime::EXIT_CANCELED,
        Err(e) => {
            sink.err_line(&format!("npm error {}", e.message()));
            return 1;
        }
    };
    for warning in resolver.warnings() {
        sink.err_line(&format!("npm warn {warning}"));
    }

    let report = match install_resolved(&resolved, cwd, &client, cancel, sink).await {
        Ok(report) => report,
        Err(e) if e.is_canceled() => return skiff_runtime::EXIT_CANCELED,
        Err(e) => {
            sink.err_line(&format!("npm error {}", e.message()));
            return 1;
        }
    };

    let project_name = package_json
        .get("name")
        .and_then(Value::as_str)
        .map(String::from);
    let lockfile = Lockfile::from_resolved(project_name, &resolved);
    if let Err(e) = lockfile.write_to(cwd) {
        sink.err_line(&format!("npm error failed to write lockfile: {e}"));
        return 1;
    }

    info!(
        installed = report.installed,
        skipped = report.skipped,
        failed = report.failed,
        "install finished"
    );
    sink.out_line(&format!(
        "added {} packages ({} up to date)",
        report.installed, report.skipped
    ));
    if report.failed > 0 {
        sink.err_line(&format!("npm warn {} packages failed to install", report.failed));
    }
    0
}

fn save_new_deps(
    cwd: &Path,
    new_deps: &BTreeMap<String, String>,
    save_dev: bool,
) -> Result<(), String> {
    let mut package_json = read_package_json(cwd).unwrap_or_else(default_package_json);
    let field = if save_dev {
        "devDependencies"
    } else {
        "dependencies"
    };

    if package_json.get(field).and_then(Value::as_object).is_none() {
        package_json[field] = json!({});
    }
    let table = package_json[field]
        .as_object_mut()
        .expect("just ensured object");
    for (name, range) in new_deps {
        table.insert(name.clone(), Value::String(range.clone()));
    }

    write_package_json(cwd, &package_json)
}

// ---------------------------------------------------------------------------
// run / start / test
// ---------------------------------------------------------------------------

async fn run_script_command(
    state: &Arc<DaemonState>,
    args: &[String],
    cwd: &Path,
    sink: &Sink,
    cancel: &CancellationToken,
) -> i32 {
    let Some(name) = args.first() else {
        sink.err_line("npm error Missing script name");
        return 1;
    };

    match script_of(cwd, name) {
        Some(script) => run_script_line(state, &script, &args[1..], cwd, sink, cancel).await,
        None => {
            sink.err_line(&format!("npm error Missing script: \"{name}\""));
            1
        }
    }
}

async fn start(
    state: &Arc<DaemonState>,
    args: &[String],
    cwd: &Path,
    sink: &Sink,
    cancel: &CancellationToken,
) -> i32 {
    if let Some(script) = script_of(cwd, "start") {
        return run_script_line(state, &script, args, cwd, sink, cancel).await;
    }

    // No start script: conventional entry files, then the built-in
    // preview server as the explicit fallback.
    for entry in ["server.js", "index.js"] {
        if cwd.join(entry).is_file() {
            return run_script_line(state, &format!("node {entry}"), args, cwd, sink, cancel)
                .await;
        }
    }

    preview::serve_preview(cwd.to_path_buf(), state.changes.clone(), sink.clone(), cancel.clone())
        .await
}

async fn test(state: &Arc<DaemonState>, cwd: &Path, sink: &Sink, cancel: &CancellationToken) -> i32 {
    match script_of(cwd, "test") {
        Some(script) => run_script_line(state, &script, &[], cwd, sink, cancel).await,
        None => {
            sink.err_line("npm error Missing script: \"test\"");
            sink.err_line("npm error no test specified");
            1
        }
    }
}

/// Execute a package.json script line by tokenizing it and feeding it
/// back through the command router.
async fn run_script_line(
    state: &Arc<DaemonState>,
    script: &str,
    extra_args: &[String],
    cwd: &Path,
    sink: &Sink,
    cancel: &CancellationToken,
) -> i32 {
    let mut tokens = tokenize(script);
    if tokens.is_empty() {
        return 0;
    }
    let command = tokens.remove(0);
    tokens.extend(extra_args.iter().cloned());

    sink.out_line(&format!("> {script}"));
    Box::pin(crate::router::dispatch(
        state, &command, &tokens, cwd, sink, cancel,
    ))
    .await
}

/// Split a script line on whitespace, honoring single and double
/// quotes. No variable expansion, no operators.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '\'' | '"' => quote = Some(c),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

// ---------------------------------------------------------------------------
// init / ls / uninstall
// ---------------------------------------------------------------------------

fn init(cwd: &Path, sink: &Sink) -> i32 {
    if cwd.join("package.json").exists() {
        sink.out_line("package.json already exists");
        return 0;
    }

    let package_json = default_package_json_named(
        cwd.file_name()
            .map_or("app", |n| n.to_str().unwrap_or("app")),
    );
    match write_package_json(cwd, &package_json) {
        Ok(()) => {
            sink.out_line("Wrote package.json");
            0
        }
        Err(e) => {
            sink.err_line(&format!("npm error {e}"));
            1
        }
    }
}

fn list(cwd: &Path, sink: &Sink) -> i32 {
    let node_modules = cwd.join("node_modules");
    let Ok(entries) = std::fs::read_dir(&node_modules) else {
        sink.out_line("(empty)");
        return 0;
    };

    let mut names: Vec<String> = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        if name.starts_with('@') {
            if let Ok(scoped) = std::fs::read_dir(entry.path()) {
                for sub in scoped.filter_map(Result::ok) {
                    names.push(format!("{name}/{}", sub.file_name().to_string_lossy()));
                }
            }
        } else {
            names.push(name);
        }
    }
    names.sort();

    if names.is_empty() {
        sink.out_line("(empty)");
        return 0;
    }
    for name in names {
        let version = installed_version(cwd, &name).unwrap_or_else(|| "?".to_string());
        sink.out_line(&format!("├── {name}@{version}"));
    }
    0
}

fn uninstall(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    if args.is_empty() {
        sink.err_line("npm error Missing package name");
        return 1;
    }

    let mut package_json = read_package_json(cwd);
    let mut lockfile = Lockfile::read_from(cwd);
    let mut removed = 0usize;

    for name in args.iter().filter(|a| !a.starts_with('-')) {
        let dir = package_dir(cwd, name);
        if dir.exists() {
            let _ = std::fs::remove_dir_all(&dir);
            removed += 1;
        }
        if let Some(pkg) = package_json.as_mut() {
            for field in ["dependencies", "devDependencies"] {
                if let Some(table) = pkg.get_mut(field).and_then(Value::as_object_mut) {
                    table.remove(name.as_str());
                }
            }
        }
        if let Some(lock) = lockfile.as_mut() {
            lock.dependencies.remove(name.as_str());
        }
    }

    if let Some(pkg) = &package_json {
        if let Err(e) = write_package_json(cwd, pkg) {
            sink.err_line(&format!("npm error {e}"));
            return 1;
        }
    }
    if let Some(lock) = &lockfile {
        if let Err(e) = lock.write_to(cwd) {
            sink.err_line(&format!("npm error failed to write lockfile: {e}"));
            return 1;
        }
    }

    sink.out_line(&format!("removed {removed} packages"));
    0
}

// ---------------------------------------------------------------------------
// package.json helpers
// ---------------------------------------------------------------------------

fn read_package_json(cwd: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(cwd.join("package.json")).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_package_json(cwd: &Path, value: &Value) -> Result<(), String> {
    let mut body = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    body.push('\n');
    std::fs::write(cwd.join("package.json"), body).map_err(|e| e.to_string())
}

fn default_package_json() -> Value {
    default_package_json_named("app")
}

fn default_package_json_named(name: &str) -> Value {
    json!({
        "name": name,
        "version": "1.0.0",
        "main": "index.js",
        "scripts": {
            "test": "echo \"Error: no test specified\" && exit 1"
        },
        "dependencies": {}
    })
}

fn script_of(cwd: &Path, name: &str) -> Option<String> {
    read_package_json(cwd)?
        .get("scripts")?
        .get(name)?
        .as_str()
        .map(String::from)
}

fn installed_version(cwd: &Path, name: &str) -> Option<String> {
    let content = std::fs::read_to_string(package_dir(cwd, name).join("package.json")).ok()?;
    let json: Value = serde_json::from_str(&content).ok()?;
    json.get("version")?.as_str().map(String::from)
}
