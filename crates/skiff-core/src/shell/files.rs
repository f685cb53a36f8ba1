//! Builtins that create, remove, copy, and move files.

use super::{resolve, split_flags};
use crate::sink::Sink;
use std::fs;
use std::path::Path;

pub(super) fn mkdir(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (flags, operands) = split_flags(args);
    if operands.is_empty() {
        sink.err_line("mkdir: missing operand");
        return 1;
    }
    let parents = flags.contains(&'p');

    let mut code = 0;
    for operand in &operands {
        let path = resolve(cwd, operand);
        let result = if parents {
            fs::create_dir_all(&path)
        } else {
            fs::create_dir(&path)
        };
        if let Err(e) = result {
            sink.err_line(&format!("mkdir: {operand}: {e}"));
            code = 1;
        }
    }
    code
}

pub(super) fn rm(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (flags, operands) = split_flags(args);
    let recursive = flags.contains(&'r') || flags.contains(&'R');
    let force = flags.contains(&'f');

    if operands.is_empty() {
        if force {
            return 0;
        }
        sink.err_line("rm: missing operand");
        return 1;
    }

    let mut code = 0;
    for operand in &operands {
        let path = resolve(cwd, operand);
        if !path.exists() {
            if !force {
                sink.err_line(&format!("rm: {operand}: No such file or directory"));
                code = 1;
            }
            continue;
        }

        let result = if path.is_dir() {
            if recursive {
                fs::remove_dir_all(&path)
            } else {
                sink.err_line(&format!("rm: {operand}: is a directory"));
                code = 1;
                continue;
            }
        } else {
            fs::remove_file(&path)
        };

        if let Err(e) = result {
            if !force {
                sink.err_line(&format!("rm: {operand}: {e}"));
                code = 1;
            }
        }
    }
    code
}

pub(super) fn rmdir(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (_, operands) = split_flags(args);
    if operands.is_empty() {
        sink.err_line("rmdir: missing operand");
        return 1;
    }

    let mut code = 0;
    for operand in &operands {
        if let Err(e) = fs::remove_dir(resolve(cwd, operand)) {
            sink.err_line(&format!("rmdir: {operand}: {e}"));
            code = 1;
        }
    }
    code
}

pub(super) fn touch(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (_, operands) = split_flags(args);
    if operands.is_empty() {
        sink.err_line("touch: missing operand");
        return 1;
    }

    let mut code = 0;
    for operand in &operands {
        let path = resolve(cwd, operand);
        let result = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|file| file.set_modified(std::time::SystemTime::now()));
        if let Err(e) = result {
            sink.err_line(&format!("touch: {operand}: {e}"));
            code = 1;
        }
    }
    code
}

pub(super) fn cp(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (flags, operands) = split_flags(args);
    let recursive = flags.contains(&'r') || flags.contains(&'R');

    if operands.len() < 2 {
        sink.err_line("cp: missing operand");
        return 1;
    }

    let dest = resolve(cwd, operands.last().expect("checked len"));
    let sources = &operands[..operands.len() - 1];
    let dest_is_dir = dest.is_dir();

    if sources.len() > 1 && !dest_is_dir {
        sink.err_line(&format!(
            "cp: target '{}' is not a directory",
            operands.last().expect("checked len")
        ));
        return 1;
    }

    let mut code = 0;
    for source in sources {
        let from = resolve(cwd, source);
        let file_name = from.file_name().map(std::ffi::OsStr::to_os_string);
        let to = if dest_is_dir {
            match file_name {
                Some(name) => dest.join(name),
                None => {
                    sink.err_line(&format!("cp: invalid source '{source}'"));
                    code = 1;
                    continue;
                }
            }
        } else {
            dest.clone()
        };

        let result = if from.is_dir() {
            if recursive {
                copy_tree(&from, &to)
            } else {
                sink.err_line(&format!("cp: {source}: is a directory (not copied)"));
                code = 1;
                continue;
            }
        } else {
            fs::copy(&from, &to).map(|_| ())
        };

        if let Err(e) = result {
            sink.err_line(&format!("cp: {source}: {e}"));
            code = 1;
        }
    }
    code
}

pub(super) fn mv(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (_, operands) = split_flags(args);
    if operands.len() != 2 {
        sink.err_line("mv: usage: mv <source> <dest>");
        return 1;
    }

    let from = resolve(cwd, &operands[0]);
    let mut to = resolve(cwd, &operands[1]);
    if to.is_dir() {
        if let Some(name) = from.file_name() {
            to = to.join(name);
        }
    }

    if fs::rename(&from, &to).is_ok() {
        return 0;
    }

    // Cross-device fallback: copy then remove.
    let result = if from.is_dir() {
        copy_tree(&from, &to).and_then(|()| fs::remove_dir_all(&from))
    } else {
        fs::copy(&from, &to).and_then(|_| fs::remove_file(&from))
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            sink.err_line(&format!("mv: {}: {e}", operands[0]));
            1
        }
    }
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if ty.is_dir() {
            copy_tree(&src, &dst)?;
        } else if ty.is_file() {
            fs::copy(&src, &dst)?;
        }
        // Symlinks are skipped; mobile hosts rarely allow them anyway.
    }
    Ok(())
}
