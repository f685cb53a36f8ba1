//! ES-module to common-module rewriting for the preview bundle.
//!
//! The client-side loader evaluates modules as
//! `(module, exports, require, ...)` factories, so import/export
//! directives are rewritten line by line into require calls and
//! export-table writes. Default imports go through the loader's
//! `__interop` helper, which prefers a `default` export and falls back
//! to the module object itself.
//!
//! The scan is single-line only; multi-line import statements pass
//! through untouched, which the loader surfaces as a syntax error in
//! the preview frame. That trade-off keeps the rewriter deterministic
//! and source-level.

/// Rewrite all module directives in `source`.
#[must_use]
pub fn rewrite_modules(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut appended: Vec<String> = Vec::new();

    for line in source.lines() {
        match rewrite_line(line) {
            Rewrite::Replace(replacement) => out.push_str(&replacement),
            Rewrite::ReplaceAndAppend(replacement, tail) => {
                out.push_str(&replacement);
                appended.push(tail);
            }
            Rewrite::Keep => out.push_str(line),
        }
        out.push('\n');
    }

    // Declaration exports are recorded at the end of the module, where
    // every exported binding is in scope.
    let had_appends = !appended.is_empty();
    for tail in appended {
        out.push_str(&tail);
        out.push('\n');
    }

    if !source.ends_with('\n') && !had_appends && out.ends_with('\n') {
        out.pop();
    }

    out
}

enum Rewrite {
    Keep,
    Replace(String),
    ReplaceAndAppend(String, String),
}

fn rewrite_line(line: &str) -> Rewrite {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];

    if trimmed.starts_with("import ") || trimmed.starts_with("import\"")
        || trimmed.starts_with("import'")
    {
        if let Some(replacement) = rewrite_import(trimmed) {
            return Rewrite::Replace(format!("{indent}{replacement}"));
        }
        return Rewrite::Keep;
    }

    if let Some(rest) = trimmed.strip_prefix("export default ") {
        return rewrite_export_default(indent, rest);
    }

    if trimmed.starts_with("export ") {
        if let Some(rewrite) = rewrite_export(indent, trimmed) {
            return rewrite;
        }
    }

    Rewrite::Keep
}

/// Rewrite one `import ...` line. Returns `None` when the line is not
/// a recognized single-line import.
fn rewrite_import(trimmed: &str) -> Option<String> {
    let rest = trimmed.strip_prefix("import")?.trim_start();

    // Side-effect import: import 'mod';
    if rest.starts_with('\'') || rest.starts_with('"') {
        let (specifier, _) = read_string(rest)?;
        return Some(format!("require('{specifier}');"));
    }

    let from_idx = rest.find(" from ")?;
    let clause = rest[..from_idx].trim();
    let (specifier, _) = read_string(rest[from_idx + " from ".len()..].trim_start())?;

    // import * as X from 'mod'
    if let Some(alias) = clause.strip_prefix("* as ") {
        return Some(format!("const {} = require('{specifier}');", alias.trim()));
    }

    // import { A, B as C } from 'mod'
    if clause.starts_with('{') {
        let names = destructure_names(clause)?;
        return Some(format!("const {{{names}}} = require('{specifier}');"));
    }

    // import Default, { A } from 'mod'
    if let Some((default_name, braces)) = clause.split_once(',') {
        let default_name = default_name.trim();
        let braces = braces.trim();
        if braces.starts_with('{') {
            let names = destructure_names(braces)?;
            return Some(format!(
                "const {default_name} = __interop(require('{specifier}')); const {{{names}}} = require('{specifier}');"
            ));
        }
        return None;
    }

    // import Default from 'mod'
    if is_identifier(clause) {
        return Some(format!(
            "const {clause} = __interop(require('{specifier}'));"
        ));
    }

    None
}

fn rewrite_export_default(indent: &str, rest: &str) -> Rewrite {
    // export default function F() {...} / export default class C {...}
    for keyword in ["function", "class"] {
        if let Some(after) = rest.strip_prefix(keyword) {
            // Guard against identifiers like `functional`.
            if after.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
                continue;
            }
            let decl = after.trim_start();
            // Named declaration: keep it and export the binding.
            if let Some(name) = leading_identifier(decl) {
                return Rewrite::ReplaceAndAppend(
                    format!("{indent}{keyword} {decl}"),
                    format!("module.exports.default = {name};"),
                );
            }
            // Anonymous declaration: it is an expression assignment.
            return Rewrite::Replace(format!(
                "{indent}module.exports.default = {keyword} {decl}"
            ));
        }
    }

    // export default EXPR
    Rewrite::Replace(format!("{indent}module.exports.default = {rest}"))
}

fn rewrite_export(indent: &str, trimmed: &str) -> Option<Rewrite> {
    let rest = trimmed.strip_prefix("export ")?.trim_start();

    // export { A, B as C } from 'mod'  /  export { A, B }
    if rest.starts_with('{') {
        let close = rest.find('}')?;
        let names = &rest[1..close];
        let after = rest[close + 1..].trim();

        if let Some(from_rest) = after.strip_prefix("from ") {
            let (specifier, _) = read_string(from_rest.trim_start())?;
            let mut body = String::new();
            for (exported, local) in export_pairs(names) {
                body.push_str(&format!(
                    "exports.{exported} = require('{specifier}').{local}; "
                ));
            }
            return Some(Rewrite::Replace(format!("{indent}{}", body.trim_end())));
        }

        let mut body = String::new();
        for (exported, local) in export_pairs(names) {
            body.push_str(&format!("exports.{exported} = {local}; "));
        }
        return Some(Rewrite::Replace(format!("{indent}{}", body.trim_end())));
    }

    // export * from 'mod'
    if let Some(star_rest) = rest.strip_prefix("* from ") {
        let (specifier, _) = read_string(star_rest.trim_start())?;
        return Some(Rewrite::Replace(format!(
            "{indent}Object.assign(exports, require('{specifier}'));"
        )));
    }

    // export const/let/var X = ...
    for keyword in ["const ", "let ", "var "] {
        if let Some(decl) = rest.strip_prefix(keyword) {
            let name = leading_identifier(decl)?;
            return Some(Rewrite::ReplaceAndAppend(
                format!("{indent}{keyword}{decl}"),
                format!("exports.{name} = {name};"),
            ));
        }
    }

    // export function F / export class C
    for keyword in ["function ", "class ", "async function "] {
        if let Some(decl) = rest.strip_prefix(keyword) {
            let name = leading_identifier(decl)?;
            return Some(Rewrite::ReplaceAndAppend(
                format!("{indent}{keyword}{decl}"),
                format!("exports.{name} = {name};"),
            ));
        }
    }

    None
}

/// `{ A, B as C }` clause into destructuring form `A, B: C`.
fn destructure_names(clause: &str) -> Option<String> {
    let inner = clause.strip_prefix('{')?.strip_suffix('}')?;
    let parts: Vec<String> = inner
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|part| match part.split_once(" as ") {
            Some((imported, local)) => format!("{}: {}", imported.trim(), local.trim()),
            None => part.to_string(),
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// `(exported, local)` pairs of an export list: `A, B as C` yields
/// `[(A, A), (C, B)]`.
fn export_pairs(names: &str) -> Vec<(String, String)> {
    names
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|part| match part.split_once(" as ") {
            Some((local, exported)) => (exported.trim().to_string(), local.trim().to_string()),
            None => (part.to_string(), part.to_string()),
        })
        .collect()
}

/// Read a leading quoted string; returns `(content, consumed)`.
fn read_string(input: &str) -> Option<(String, usize)> {
    let mut chars = input.chars();
    let quote = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let mut content = String::new();
    let mut consumed = 1;
    for c in chars {
        consumed += c.len_utf8();
        if c == quote {
            return Some((content, consumed));
        }
        content.push(c);
    }
    None
}

fn is_identifier(input: &str) -> bool {
    !input.is_empty()
        && input
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// The identifier at the start of a declaration body.
fn leading_identifier(decl: &str) -> Option<String> {
    let name: String = decl
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    if name.is_empty() || name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(name)
    }
}
