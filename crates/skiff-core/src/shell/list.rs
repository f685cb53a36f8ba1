//! Directory listing and tree search builtins.

use super::{flag_value, resolve, split_flags};
use crate::sink::Sink;
use chrono::{DateTime, Local};
use regex::Regex;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

pub(super) fn ls(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (flags, operands) = split_flags(args);
    let all = flags.contains(&'a');
    let long = flags.contains(&'l');
    let one_per_line = flags.contains(&'1') || long;

    let target = match operands.first() {
        Some(operand) => resolve(cwd, operand),
        None => cwd.to_path_buf(),
    };

    if target.is_file() {
        if long {
            sink.out_line(&long_line(&target));
        } else {
            sink.out_line(&file_name_of(&target));
        }
        return 0;
    }

    let entries = match fs::read_dir(&target) {
        Ok(iter) => iter,
        Err(e) => {
            sink.err_line(&format!("ls: {}: {e}", target.display()));
            return 1;
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| all || !name.starts_with('.'))
        .collect();
    names.sort();

    if long {
        for name in &names {
            sink.out_line(&long_line(&target.join(name)));
        }
    } else if one_per_line {
        for name in &names {
            sink.out_line(name);
        }
    } else if !names.is_empty() {
        sink.out_line(&names.join("  "));
    }
    0
}

/// One `ls -l` row: a synthetic permission string, byte size, mtime,
/// and name. The permission string is synthetic because the mobile
/// host's real modes are meaningless to the UI.
fn long_line(path: &Path) -> String {
    let meta = fs::symlink_metadata(path).ok();
    let is_dir = meta.as_ref().is_some_and(fs::Metadata::is_dir);
    let perms = if is_dir { "drwxr-xr-x" } else { "-rw-r--r--" };
    let size = meta.as_ref().map_or(0, fs::Metadata::len);
    let mtime = meta
        .as_ref()
        .and_then(|m| m.modified().ok())
        .map_or_else(String::new, |t| {
            DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string()
        });

    format!("{perms} {size:>10} {mtime} {}", file_name_of(path))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

pub(super) fn find(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let name_pattern = flag_value(args, "-name");
    let type_filter = flag_value(args, "-type");

    // The start path is the first operand that is not a flag or a
    // flag's value.
    let mut start = ".".to_string();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-name" | "-type" => {
                let _ = iter.next();
            }
            other if !other.starts_with('-') => {
                start = other.to_string();
                break;
            }
            _ => {}
        }
    }

    let matcher = name_pattern.as_deref().map(glob_to_regex);
    let root = resolve(cwd, &start);
    if !root.exists() {
        sink.err_line(&format!("find: {start}: No such file or directory"));
        return 1;
    }

    for entry in WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            name != "node_modules" && name != ".git"
        })
        .filter_map(Result::ok)
    {
        let is_dir = entry.file_type().is_dir();
        match type_filter.as_deref() {
            Some("f") if is_dir => continue,
            Some("d") if !is_dir => continue,
            _ => {}
        }

        let name = entry.file_name().to_string_lossy();
        if let Some(re) = &matcher {
            if !re.is_match(&name) {
                continue;
            }
        }

        // Print paths the way find does: rooted at the start operand.
        let display = entry
            .path()
            .strip_prefix(&root)
            .map_or_else(
                |_| entry.path().display().to_string(),
                |rel| {
                    if rel.as_os_str().is_empty() {
                        start.clone()
                    } else {
                        format!("{start}/{}", rel.display())
                    }
                },
            );
        sink.out_line(&display);
    }
    0
}

/// Translate a shell glob to an anchored regex: `*` matches anything,
/// `?` a single character, everything else literally.
fn glob_to_regex(glob: &str) -> Regex {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    // An unparseable pattern matches nothing.
    Regex::new(&pattern).unwrap_or_else(|_| Regex::new("$never^").expect("static regex"))
}
