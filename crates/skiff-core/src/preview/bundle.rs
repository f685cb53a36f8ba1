//! Preview bundle construction.
//!
//! The preview server rebuilds a single self-contained HTML document
//! from the project tree on every request. Code files are rewritten
//! (module directives, then JSX) and registered in a client-side module
//! table; CSS is concatenated into one `<style>` block; the embedded
//! loader resolves paths, caches evaluations, and posts structured
//! errors to the parent frame. Given the same input file set the
//! output is byte-identical.

use super::jsx::rewrite_jsx;
use super::modules::rewrite_modules;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// The embedded client-side loader.
const RUNTIME_JS: &str = include_str!("assets/runtime.js");

/// React UMD bundles the generated page loads before the loader runs.
const REACT_SCRIPTS: &str = concat!(
    r#"<script crossorigin src="https://unpkg.com/react@18/umd/react.production.min.js"></script>"#,
    "\n",
    r#"<script crossorigin src="https://unpkg.com/react-dom@18/umd/react-dom.production.min.js"></script>"#,
);

/// File extensions included in the bundle.
const CODE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx"];

/// Entry candidates, in priority order.
const ENTRY_CANDIDATES: &[&str] = &[
    "/index.js",
    "/index.jsx",
    "/index.ts",
    "/index.tsx",
    "/App.js",
    "/App.jsx",
    "/App.tsx",
    "/App.ts",
];

/// One file included in a bundle.
#[derive(Debug, Clone)]
struct SourceFile {
    /// Normalized `/`-prefixed path relative to the project root.
    path: String,
    content: String,
}

/// Build the preview HTML for a project directory.
///
/// # Errors
/// Returns an error when the project tree cannot be read.
pub fn build_bundle(project_dir: &Path) -> io::Result<String> {
    let mut code: Vec<SourceFile> = Vec::new();
    let mut css: Vec<SourceFile> = Vec::new();
    let mut json: Vec<SourceFile> = Vec::new();

    for entry in WalkDir::new(project_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.depth() == 0 || (!name.starts_with('.') && name != "node_modules")
        })
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let Ok(rel) = entry.path().strip_prefix(project_dir) else {
            continue;
        };
        let path = format!("/{}", rel.to_string_lossy().replace('\\', "/"));
        let bucket = match ext {
            e if CODE_EXTENSIONS.contains(&e) => &mut code,
            "css" => &mut css,
            "json" => &mut json,
            _ => continue,
        };
        let content = fs::read_to_string(entry.path())?;
        bucket.push(SourceFile { path, content });
    }

    let entry = select_entry(&code);
    Ok(render_html(&code, &css, &json, entry.as_deref()))
}

/// Pick the entry module: `/index.*` first, then `/App.*`, then the
/// first code file in scan order.
fn select_entry(code: &[SourceFile]) -> Option<String> {
    for candidate in ENTRY_CANDIDATES {
        if code.iter().any(|f| f.path == *candidate) {
            return Some((*candidate).to_string());
        }
    }
    code.first().map(|f| f.path.clone())
}

/// Whether the entry needs a synthesized root-render call.
///
/// `/index.*` entries render themselves; an `App.*` entry only exports
/// a component.
fn needs_render(entry: &str) -> bool {
    entry
        .rsplit('/')
        .next()
        .is_some_and(|name| name.starts_with("App."))
}

fn render_html(
    code: &[SourceFile],
    css: &[SourceFile],
    json: &[SourceFile],
    entry: Option<&str>,
) -> String {
    let mut style = String::new();
    for file in css {
        let _ = writeln!(style, "/* {} */", file.path);
        style.push_str(&file.content);
        if !file.content.ends_with('\n') {
            style.push('\n');
        }
    }

    let mut registrations = String::new();
    for file in code {
        let transformed = rewrite_jsx(&rewrite_modules(&file.content));
        let _ = writeln!(
            registrations,
            "__skiff.register({path}, function (module, exports, require, createElement, Fragment, __interop) {{\n{body}\n}});",
            path = js_string(&file.path),
            body = escape_script(&transformed),
        );
    }
    for file in json {
        let _ = writeln!(
            registrations,
            "__skiff.register({path}, function (module) {{\nmodule.exports = {body};\n}});",
            path = js_string(&file.path),
            body = escape_script(file.content.trim()),
        );
    }

    let start = entry.map_or_else(String::new, |entry| {
        format!(
            "__skiff.start({}, {{ render: {} }});",
            js_string(entry),
            needs_render(entry)
        )
    });

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>Preview</title>\n<style>\n{style}</style>\n</head>\n<body>\n\
         <div id=\"root\"></div>\n{REACT_SCRIPTS}\n<script>\n{RUNTIME_JS}</script>\n\
         <script>\n{registrations}{start}\n</script>\n</body>\n</html>\n"
    )
}

/// Keep inline code from terminating the surrounding `<script>` block.
fn escape_script(code: &str) -> String {
    code.replace("</script", "<\\/script")
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scenario_app_tsx() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("App.tsx"),
            "export default function App(){ return <h1 className=\"t\">hi</h1> }",
        )
        .unwrap();

        let html = build_bundle(dir.path()).unwrap();
        assert!(html.contains("__skiff.register(\"/App.tsx\""));
        assert!(!html.contains("<h1"));
        assert!(html.contains(r#"createElement("h1", {className: "t"}, "hi")"#));
        assert!(html.contains("__skiff.start(\"/App.tsx\", { render: true });"));
    }

    #[test]
    fn test_entry_priority() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("App.jsx"), "export default 1;").unwrap();
        fs::write(dir.path().join("index.js"), "console.log('boot');").unwrap();

        let html = build_bundle(dir.path()).unwrap();
        assert!(html.contains("__skiff.start(\"/index.js\", { render: false });"));
    }

    #[test]
    fn test_css_concatenated() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.css"), "body { margin: 0 }").unwrap();
        fs::write(dir.path().join("b.css"), "h1 { color: red }").unwrap();
        fs::write(dir.path().join("index.js"), "1;").unwrap();

        let html = build_bundle(dir.path()).unwrap();
        let style_start = html.find("<style>").unwrap();
        let style_end = html.find("</style>").unwrap();
        let style = &html[style_start..style_end];
        assert!(style.contains("margin: 0"));
        assert!(style.contains("color: red"));
    }

    #[test]
    fn test_json_registered_as_module() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("data.json"), r#"{"answer": 42}"#).unwrap();
        fs::write(dir.path().join("index.js"), "1;").unwrap();

        let html = build_bundle(dir.path()).unwrap();
        assert!(html.contains("__skiff.register(\"/data.json\""));
        assert!(html.contains(r#"module.exports = {"answer": 42};"#));
    }

    #[test]
    fn test_skips_node_modules_and_dotfiles() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/dep")).unwrap();
        fs::create_dir_all(dir.path().join(".cache")).unwrap();
        fs::write(dir.path().join("node_modules/dep/index.js"), "dep();").unwrap();
        fs::write(dir.path().join(".cache/tmp.js"), "tmp();").unwrap();
        fs::write(dir.path().join("index.js"), "app();").unwrap();

        let html = build_bundle(dir.path()).unwrap();
        assert!(html.contains("app();"));
        assert!(!html.contains("dep();"));
        assert!(!html.contains("tmp();"));
    }

    #[test]
    fn test_deterministic() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("App.jsx"), "export default () => <p>x</p>;").unwrap();
        fs::write(dir.path().join("util.js"), "export const u = 1;").unwrap();
        fs::write(dir.path().join("style.css"), "p { color: blue }").unwrap();

        let first = build_bundle(dir.path()).unwrap();
        let second = build_bundle(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_script_terminator_escaped() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("index.js"),
            r#"const html = "</script>";"#,
        )
        .unwrap();

        let html = build_bundle(dir.path()).unwrap();
        assert!(html.contains(r#"<\/script>"#));
    }

    #[test]
    fn test_empty_project() {
        let dir = tempdir().unwrap();
        let html = build_bundle(dir.path()).unwrap();
        assert!(html.contains("<div id=\"root\"></div>"));
        assert!(!html.contains("__skiff.start("));
    }
}
