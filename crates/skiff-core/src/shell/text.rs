//! Builtins that produce or transform text.

use super::{flag_value, resolve, split_flags};
use crate::sink::Sink;
use std::fs;
use std::path::Path;

pub(super) fn echo(args: &[String], sink: &Sink) -> i32 {
    let (no_newline, words) = match args.first().map(String::as_str) {
        Some("-n") => (true, &args[1..]),
        _ => (false, args),
    };

    let text = words.join(" ");
    if no_newline {
        sink.out(&text);
    } else {
        sink.out_line(&text);
    }
    0
}

pub(super) fn cat(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (flags, operands) = split_flags(args);
    let numbered = flags.contains(&'n');

    if operands.is_empty() {
        sink.err_line("cat: missing operand");
        return 1;
    }

    let mut code = 0;
    let mut line_no = 1usize;
    for operand in &operands {
        match fs::read_to_string(resolve(cwd, operand)) {
            Ok(content) => {
                if numbered {
                    for line in content.lines() {
                        sink.out_line(&format!("{line_no:>6}\t{line}"));
                        line_no += 1;
                    }
                } else {
                    sink.out(&content);
                }
            }
            Err(e) => {
                sink.err_line(&format!("cat: {operand}: {e}"));
                code = 1;
            }
        }
    }
    code
}

pub(super) fn head(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    take_lines(args, cwd, sink, "head", false)
}

pub(super) fn tail(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    take_lines(args, cwd, sink, "tail", true)
}

fn take_lines(args: &[String], cwd: &Path, sink: &Sink, name: &str, from_end: bool) -> i32 {
    let count: usize = flag_value(args, "-n")
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    let operands: Vec<&String> = {
        // Drop the -n flag and its value from the operand list.
        let mut skip_next = false;
        args.iter()
            .filter(|arg| {
                if skip_next {
                    skip_next = false;
                    return false;
                }
                if *arg == "-n" {
                    skip_next = true;
                    return false;
                }
                !(arg.starts_with("-n") && arg.len() > 2)
            })
            .collect()
    };

    if operands.is_empty() {
        sink.err_line(&format!("{name}: missing operand"));
        return 1;
    }

    let mut code = 0;
    for operand in operands {
        match fs::read_to_string(resolve(cwd, operand)) {
            Ok(content) => {
                let lines: Vec<&str> = content.lines().collect();
                let slice: &[&str] = if from_end {
                    &lines[lines.len().saturating_sub(count)..]
                } else {
                    &lines[..count.min(lines.len())]
                };
                for line in slice {
                    sink.out_line(line);
                }
            }
            Err(e) => {
                sink.err_line(&format!("{name}: {operand}: {e}"));
                code = 1;
            }
        }
    }
    code
}

pub(super) fn wc(args: &[String], cwd: &Path, sink: &Sink) -> i32 {
    let (_, operands) = split_flags(args);
    if operands.is_empty() {
        sink.err_line("wc: missing operand");
        return 1;
    }

    let mut code = 0;
    let mut totals = (0usize, 0usize, 0usize);
    for operand in &operands {
        match fs::read_to_string(resolve(cwd, operand)) {
            Ok(content) => {
                let lines = content.lines().count();
                let words = content.split_whitespace().count();
                let bytes = content.len();
                totals.0 += lines;
                totals.1 += words;
                totals.2 += bytes;
                sink.out_line(&format!("{lines:>8}{words:>8}{bytes:>8} {operand}"));
            }
            Err(e) => {
                sink.err_line(&format!("wc: {operand}: {e}"));
                code = 1;
            }
        }
    }

    if operands.len() > 1 {
        sink.out_line(&format!(
            "{:>8}{:>8}{:>8} total",
            totals.0, totals.1, totals.2
        ));
    }
    code
}
