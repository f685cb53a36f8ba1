//! Environment and path-inspection builtins.

use super::{resolve, split_flags};
use crate::compat;
use crate::sink::Sink;
use chrono::Local;
use std::path::{Component, Path, PathBuf};

pub(super) fn pwd(cwd: &Path, sink: &Sink) -> i32 {
    sink.out_line(&cwd.display().to_string());
    0
}

pub(super) fn which(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (_, operands) = split_flags(args);
    let Some(name) = operands.first() else {
        sink.err_line("which: missing operand");
        return 1;
    };

    if super::is_builtin(name) || matches!(name.as_str(), "node" | "npm" | "npx") {
        sink.out_line(&format!("/usr/bin/{name}"));
        return 0;
    }

    let stub = cwd.join("node_modules").join(".bin").join(name);
    if stub.is_file() {
        sink.out_line(&stub.display().to_string());
        return 0;
    }

    sink.err_line(&format!("which: {name} not found"));
    1
}

pub(super) fn env(sink: &Sink) -> i32 {
    let mut vars: Vec<(String, String)> = std::env::vars().collect();
    vars.sort();
    for (key, value) in vars {
        sink.out_line(&format!("{key}={value}"));
    }
    0
}

pub(super) fn whoami(sink: &Sink) -> i32 {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "mobile".to_string());
    sink.out_line(&user);
    0
}

pub(super) fn uname(args: &[String], sink: &Sink) -> i32 {
    let (flags, _) = split_flags(args);
    let kernel = match compat::platform() {
        "darwin" => "Darwin",
        "win32" => "Windows",
        _ => "Linux",
    };

    if flags.contains(&'a') {
        sink.out_line(&format!("{kernel} skiff {}", compat::arch()));
    } else if flags.contains(&'m') {
        sink.out_line(compat::arch());
    } else {
        sink.out_line(kernel);
    }
    0
}

pub(super) fn date(sink: &Sink) -> i32 {
    sink.out_line(&Local::now().format("%a %b %e %H:%M:%S %Y").to_string());
    0
}

pub(super) fn dirname(args: &[String], sink: &Sink) -> i32 {
    let (_, operands) = split_flags(args);
    let Some(operand) = operands.first() else {
        sink.err_line("dirname: missing operand");
        return 1;
    };

    let parent = Path::new(operand)
        .parent()
        .map(Path::to_string_lossy)
        .filter(|p| !p.is_empty())
        .map_or_else(|| ".".to_string(), |p| p.into_owned());
    sink.out_line(&parent);
    0
}

pub(super) fn basename(args: &[String], sink: &Sink) -> i32 {
    let (_, operands) = split_flags(args);
    let Some(operand) = operands.first() else {
        sink.err_line("basename: missing operand");
        return 1;
    };

    let name = Path::new(operand)
        .file_name()
        .map_or_else(|| operand.clone(), |n| n.to_string_lossy().into_owned());

    // Optional suffix stripping: basename file.txt .txt
    let name = match operands.get(1) {
        Some(suffix) if name.ends_with(suffix.as_str()) && name.len() > suffix.len() => {
            name[..name.len() - suffix.len()].to_string()
        }
        _ => name,
    };
    sink.out_line(&name);
    0
}

pub(super) fn realpath(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (_, operands) = split_flags(args);
    let Some(operand) = operands.first() else {
        sink.err_line("realpath: missing operand");
        return 1;
    };

    let path = resolve(cwd, operand);
    let resolved = path
        .canonicalize()
        .unwrap_or_else(|_| normalize_logical(&path));
    sink.out_line(&resolved.display().to_string());
    0
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize_logical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
