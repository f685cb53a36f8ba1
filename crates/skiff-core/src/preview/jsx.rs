//! Source-level JSX rewriting.
//!
//! A hand-written character scanner turns JSX tags into
//! `createElement(...)` calls without parsing the surrounding
//! JavaScript. The scanner tracks string, template, and comment
//! contexts, and disambiguates `<` as JSX only in expression position:
//! when the preceding non-space character could end an operand
//! (identifier, digit, `)`, `]`) the `<` is a comparison, unless the
//! preceding word is a keyword that legally starts an expression.
//!
//! The rewrite is deliberately conservative: a tag the scanner cannot
//! parse is passed through untouched, and the output of a successful
//! rewrite contains no JSX, so the transform is idempotent.

/// Keywords after which `<` starts an expression, not a comparison.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "delete", "do", "else", "in", "instanceof", "new", "throw",
    "void", "yield", "await", "default",
];

/// Rewrite every JSX tag in `source` to `createElement` calls.
#[must_use]
pub fn rewrite_jsx(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            '/' if chars.get(pos + 1) == Some(&'/') => {
                pos = copy_line_comment(&chars, pos, &mut out);
            }
            '/' if chars.get(pos + 1) == Some(&'*') => {
                pos = copy_block_comment(&chars, pos, &mut out);
            }
            '\'' | '"' => {
                pos = copy_string(&chars, pos, &mut out);
            }
            '`' => {
                pos = copy_template(&chars, pos, &mut out);
            }
            '<' if is_jsx_position(&out, chars.get(pos + 1).copied()) => {
                match parse_element(&chars, pos) {
                    Some((emitted, next)) => {
                        out.push_str(&emitted);
                        pos = next;
                    }
                    None => {
                        out.push(c);
                        pos += 1;
                    }
                }
            }
            _ => {
                out.push(c);
                pos += 1;
            }
        }
    }

    out
}

/// Whether a `<` at the current point opens JSX.
fn is_jsx_position(out: &str, next: Option<char>) -> bool {
    // JSX starts with a tag letter or an empty fragment.
    let next_ok = matches!(next, Some(c) if c.is_ascii_alphabetic() || c == '>');
    if !next_ok {
        return false;
    }

    let before = out.trim_end();
    let Some(prev) = before.chars().last() else {
        return true;
    };

    if prev.is_alphanumeric() || matches!(prev, '_' | '$' | ')' | ']') {
        // Looks like the end of an operand; only a keyword saves it.
        let word: String = before
            .chars()
            .rev()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return EXPRESSION_KEYWORDS.contains(&word.as_str());
    }

    true
}

fn copy_line_comment(chars: &[char], mut pos: usize, out: &mut String) -> usize {
    while pos < chars.len() && chars[pos] != '\n' {
        out.push(chars[pos]);
        pos += 1;
    }
    pos
}

fn copy_block_comment(chars: &[char], mut pos: usize, out: &mut String) -> usize {
    out.push(chars[pos]);
    out.push(chars[pos + 1]);
    pos += 2;
    let mut prev = '\0';
    while pos < chars.len() {
        let c = chars[pos];
        out.push(c);
        pos += 1;
        if prev == '*' && c == '/' {
            return pos;
        }
        prev = c;
    }
    pos
}

fn copy_string(chars: &[char], mut pos: usize, out: &mut String) -> usize {
    let quote = chars[pos];
    out.push(quote);
    pos += 1;
    while pos < chars.len() {
        let c = chars[pos];
        out.push(c);
        pos += 1;
        if c == '\\' {
            if pos < chars.len() {
                out.push(chars[pos]);
                pos += 1;
            }
        } else if c == quote {
            break;
        }
    }
    pos
}

fn copy_template(chars: &[char], mut pos: usize, out: &mut String) -> usize {
    out.push(chars[pos]);
    pos += 1;
    while pos < chars.len() {
        let c = chars[pos];
        out.push(c);
        pos += 1;
        if c == '\\' {
            if pos < chars.len() {
                out.push(chars[pos]);
                pos += 1;
            }
        } else if c == '`' {
            break;
        }
    }
    pos
}

// ---------------------------------------------------------------------------
// Tag parsing
// ---------------------------------------------------------------------------

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Tag or attribute identifier: letters, digits, `_ $ . : -`.
    fn ident(&mut self) -> Option<String> {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | ':' | '-')
        ) {
            self.pos += 1;
        }
        if self.pos == start {
            None
        } else {
            Some(self.chars[start..self.pos].iter().collect())
        }
    }

    /// Capture a balanced `{...}` body, honoring strings and comments.
    /// The opening brace must already be consumed; consumes the closer.
    fn balanced_braces(&mut self) -> Option<String> {
        let mut depth = 1usize;
        let mut body = String::new();
        while let Some(c) = self.bump() {
            match c {
                '{' => {
                    depth += 1;
                    body.push(c);
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(body);
                    }
                    body.push(c);
                }
                '\'' | '"' | '`' => {
                    body.push(c);
                    while let Some(inner) = self.bump() {
                        body.push(inner);
                        if inner == '\\' {
                            if let Some(escaped) = self.bump() {
                                body.push(escaped);
                            }
                        } else if inner == c {
                            break;
                        }
                    }
                }
                '/' if self.peek() == Some('/') => {
                    body.push(c);
                    while let Some(inner) = self.bump() {
                        body.push(inner);
                        if inner == '\n' {
                            break;
                        }
                    }
                }
                '/' if self.peek() == Some('*') => {
                    body.push(c);
                    let mut prev = '\0';
                    while let Some(inner) = self.bump() {
                        body.push(inner);
                        if prev == '*' && inner == '/' {
                            break;
                        }
                        prev = inner;
                    }
                }
                _ => body.push(c),
            }
        }
        None
    }
}

#[derive(Debug)]
enum Prop {
    /// `name="literal"`, kept raw with its quotes.
    Literal(String, String),
    /// `name={expr}`.
    Expr(String, String),
    /// Bare `name` boolean shorthand.
    Shorthand(String),
    /// `{...expr}`.
    Spread(String),
}

/// Parse one JSX element or fragment starting at `<`.
///
/// Returns the emitted JavaScript and the position just past the
/// element, or `None` to bail out.
fn parse_element(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut parser = Parser { chars, pos: start };
    let emitted = parse_element_inner(&mut parser)?;
    Some((emitted, parser.pos))
}

fn parse_element_inner(parser: &mut Parser<'_>) -> Option<String> {
    if !parser.eat('<') {
        return None;
    }

    // Fragment: <>children</>
    if parser.eat('>') {
        let children = parse_children(parser, None)?;
        return Some(emit_call("Fragment", &[], &children));
    }

    let tag = parser.ident()?;
    let mut props: Vec<Prop> = Vec::new();

    loop {
        parser.skip_ws();
        match parser.peek()? {
            '/' => {
                parser.bump();
                if !parser.eat('>') {
                    return None;
                }
                return Some(emit_call(&tag, &props, &[]));
            }
            '>' => {
                parser.bump();
                let children = parse_children(parser, Some(&tag))?;
                return Some(emit_call(&tag, &props, &children));
            }
            '{' => {
                parser.bump();
                let body = parser.balanced_braces()?;
                let trimmed = body.trim();
                let expr = trimmed.strip_prefix("...")?;
                props.push(Prop::Spread(rewrite_jsx(expr)));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let name = parser.ident()?;
                parser.skip_ws();
                if parser.eat('=') {
                    parser.skip_ws();
                    match parser.peek()? {
                        '"' | '\'' => {
                            let mut literal = String::new();
                            copy_string(parser.chars, parser.pos, &mut literal);
                            parser.pos += literal.chars().count();
                            props.push(Prop::Literal(name, literal));
                        }
                        '{' => {
                            parser.bump();
                            let body = parser.balanced_braces()?;
                            props.push(Prop::Expr(name, rewrite_jsx(body.trim())));
                        }
                        '<' => {
                            // Element-valued prop without braces is not JSX.
                            return None;
                        }
                        _ => return None,
                    }
                } else {
                    props.push(Prop::Shorthand(name));
                }
            }
            _ => return None,
        }
    }
}

/// Parse children until the matching close tag (`None` = fragment).
fn parse_children(parser: &mut Parser<'_>, tag: Option<&str>) -> Option<Vec<String>> {
    let mut children: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        match parser.peek()? {
            '<' => {
                flush_text(&mut text, &mut children);
                // Closing tag?
                if parser.chars.get(parser.pos + 1) == Some(&'/') {
                    parser.bump();
                    parser.bump();
                    parser.skip_ws();
                    let close = parser.ident().unwrap_or_default();
                    parser.skip_ws();
                    if !parser.eat('>') {
                        return None;
                    }
                    match tag {
                        Some(open) if close != open => return None,
                        None if !close.is_empty() => return None,
                        _ => return Some(children),
                    }
                }
                let child = parse_element_inner(parser)?;
                children.push(child);
            }
            '{' => {
                flush_text(&mut text, &mut children);
                parser.bump();
                let body = parser.balanced_braces()?;
                let trimmed = body.trim();
                // `{/* comment */}` and empty expressions vanish.
                let is_comment =
                    trimmed.starts_with("/*") && trimmed.ends_with("*/") || trimmed.is_empty();
                if !is_comment {
                    children.push(rewrite_jsx(trimmed));
                }
            }
            _ => {
                text.push(parser.bump()?);
            }
        }
    }
}

fn flush_text(text: &mut String, children: &mut Vec<String>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        children.push(json_string(trimmed));
    }
    text.clear();
}

/// Emit `createElement(tag, props, ...children)`.
fn emit_call(tag: &str, props: &[Prop], children: &[String]) -> String {
    let tag_expr = if tag == "Fragment" {
        "Fragment".to_string()
    } else if tag.chars().next().is_some_and(char::is_uppercase) {
        // Component reference (possibly dotted).
        tag.to_string()
    } else {
        json_string(tag)
    };

    let props_expr = emit_props(props);

    let mut call = format!("createElement({tag_expr}, {props_expr}");
    for child in children {
        call.push_str(", ");
        call.push_str(child);
    }
    call.push(')');
    call
}

fn emit_props(props: &[Prop]) -> String {
    if props.is_empty() {
        return "null".to_string();
    }

    let mut spreads: Vec<&str> = Vec::new();
    let mut pairs: Vec<String> = Vec::new();

    for prop in props {
        match prop {
            Prop::Spread(expr) => spreads.push(expr),
            Prop::Literal(name, literal) => pairs.push(format!("{}: {literal}", prop_key(name))),
            Prop::Expr(name, expr) => pairs.push(format!("{}: {expr}", prop_key(name))),
            Prop::Shorthand(name) => pairs.push(format!("{}: true", prop_key(name))),
        }
    }

    let object = format!("{{{}}}", pairs.join(", "));

    if spreads.is_empty() {
        object
    } else {
        let mut call = String::from("Object.assign({}");
        for spread in spreads {
            call.push_str(", ");
            call.push_str(spread);
        }
        if !pairs.is_empty() {
            call.push_str(", ");
            call.push_str(&object);
        }
        call.push(')');
        call
    }
}

/// Hyphenated and namespaced names become string keys.
fn prop_key(name: &str) -> String {
    let plain = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    let starts_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$');
    if plain && starts_ok {
        name.to_string()
    } else {
        json_string(name)
    }
}

fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_element() {
        let out = rewrite_jsx(r#"const el = <h1 className="t">hi</h1>;"#);
        assert_eq!(
            out,
            r#"const el = createElement("h1", {className: "t"}, "hi");"#
        );
    }

    #[test]
    fn test_component_vs_intrinsic() {
        let out = rewrite_jsx("const a = <App />; const b = <div />;");
        assert!(out.contains("createElement(App, null)"));
        assert!(out.contains(r#"createElement("div", null)"#));
    }

    #[test]
    fn test_dotted_component() {
        let out = rewrite_jsx("<Menu.Item k={v} />");
        assert_eq!(out, "createElement(Menu.Item, {k: v})");
    }

    #[test]
    fn test_fragment() {
        let out = rewrite_jsx("<><a>1</a><b>2</b></>");
        assert_eq!(
            out,
            r#"createElement(Fragment, null, createElement("a", null, "1"), createElement("b", null, "2"))"#
        );
    }

    #[test]
    fn test_expression_props_and_children() {
        let out = rewrite_jsx("<div id={user.id}>{user.name}</div>");
        assert_eq!(out, r#"createElement("div", {id: user.id}, user.name)"#);
    }

    #[test]
    fn test_boolean_shorthand() {
        let out = rewrite_jsx("<input disabled />");
        assert_eq!(out, r#"createElement("input", {disabled: true})"#);
    }

    #[test]
    fn test_spread_props() {
        let out = rewrite_jsx(r#"<div {...rest} className="x" />"#);
        assert_eq!(
            out,
            r#"createElement("div", Object.assign({}, rest, {className: "x"}))"#
        );
    }

    #[test]
    fn test_spread_only() {
        let out = rewrite_jsx("<div {...props} />");
        assert_eq!(out, "createElement(\"div\", Object.assign({}, props))");
    }

    #[test]
    fn test_hyphenated_prop() {
        let out = rewrite_jsx(r#"<div data-test="a" aria-label={l} />"#);
        assert_eq!(
            out,
            r#"createElement("div", {"data-test": "a", "aria-label": l})"#
        );
    }

    #[test]
    fn test_nested_elements() {
        let out = rewrite_jsx("<ul><li>one</li><li>two</li></ul>");
        assert_eq!(
            out,
            r#"createElement("ul", null, createElement("li", null, "one"), createElement("li", null, "two"))"#
        );
    }

    #[test]
    fn test_comparison_not_rewritten() {
        for src in [
            "if (a < b) {}",
            "const ok = count<limit;",
            "while (i < n) i++;",
            "f(x) < y",
            "arr[0] < z",
        ] {
            assert_eq!(rewrite_jsx(src), src, "source: {src}");
        }
    }

    #[test]
    fn test_return_is_jsx() {
        let out = rewrite_jsx("function App(){ return <h1>hi</h1> }");
        assert_eq!(
            out,
            r#"function App(){ return createElement("h1", null, "hi") }"#
        );
    }

    #[test]
    fn test_strings_and_comments_untouched() {
        for src in [
            r#"const s = "<div>not jsx</div>";"#,
            "// <div>comment</div>",
            "/* <div>block</div> */",
            "const t = `<div>${x}</div>`;",
        ] {
            assert_eq!(rewrite_jsx(src), src, "source: {src}");
        }
    }

    #[test]
    fn test_jsx_comment_child_dropped() {
        let out = rewrite_jsx("<div>{/* note */}text</div>");
        assert_eq!(out, r#"createElement("div", null, "text")"#);
    }

    #[test]
    fn test_conditional_child() {
        let out = rewrite_jsx("<div>{ok ? <b>y</b> : null}</div>");
        assert_eq!(
            out,
            r#"createElement("div", null, ok ? createElement("b", null, "y") : null)"#
        );
    }

    #[test]
    fn test_arrow_body_jsx_in_expression_child() {
        let out = rewrite_jsx("<ul>{items.map(i => <li key={i}>{i}</li>)}</ul>");
        assert_eq!(
            out,
            r#"createElement("ul", null, items.map(i => createElement("li", {key: i}, i)))"#
        );
    }

    #[test]
    fn test_mismatched_close_bails() {
        let src = "const x = <div>oops</span>;";
        assert_eq!(rewrite_jsx(src), src);
    }

    #[test]
    fn test_unterminated_tag_bails() {
        let src = "const x = a <div && b;";
        assert_eq!(rewrite_jsx(src), src);
    }

    #[test]
    fn test_idempotent() {
        let src = r#"export default function App(){ return <h1 className="t">hi</h1> }"#;
        let once = rewrite_jsx(src);
        let twice = rewrite_jsx(&once);
        assert_eq!(once, twice);
        assert!(!once.contains("<h1"));
    }

    #[test]
    fn test_multiline_children_trimmed() {
        let out = rewrite_jsx("<p>\n  hello\n  <b>world</b>\n</p>");
        assert_eq!(
            out,
            r#"createElement("p", null, "hello", createElement("b", null, "world"))"#
        );
    }

    #[test]
    fn test_self_closing_with_newline_props() {
        let out = rewrite_jsx("<img\n  src={url}\n  alt=\"pic\"\n/>");
        assert_eq!(out, r#"createElement("img", {src: url, alt: "pic"})"#);
    }
}
