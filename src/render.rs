//! Serialization of retained server blocks.
//!
//! The block body is rebuilt from token line numbers: a token on a new source
//! line starts a new output line, and a brace depth counter decides how far
//! that line is indented.

use crate::lexer::Token;
use crate::parser::{Directive, ServerBlock};

/// One indentation level.
pub const INDENT: &str = "    ";

/// Name of the directive that is replaced by the configured bind statement.
pub const BIND_DIRECTIVE: &str = "bind";

/// Line-break and nesting state for one directive.
#[derive(Debug, Default)]
struct IndentState {
    depth: usize,
    prev_line: Option<usize>,
}

impl IndentState {
    /// Write `token` to `out`, starting a new indented line if needed.
    fn emit(&mut self, token: &Token, out: &mut String) {
        match self.prev_line {
            None => out.push_str(INDENT),
            Some(prev) if prev != token.line => {
                let mut level = self.depth;
                if token.is_close_brace() && level > 0 {
                    level -= 1;
                }
                out.push('\n');
                out.push_str(INDENT);
                for _ in 0..level {
                    out.push_str(INDENT);
                }
            }
            Some(_) => out.push(' '),
        }

        push_token_text(token, out);

        if token.is_open_brace() {
            self.depth += 1;
        } else if token.is_close_brace() && self.depth > 0 {
            self.depth -= 1;
        }
        self.prev_line = Some(token.line + token.line_breaks());
    }
}

fn push_token_text(token: &Token, out: &mut String) {
    if token.quoted {
        push_quoted(&token.text, out);
    } else {
        out.push_str(&token.text);
    }
}

fn push_quoted(text: &str, out: &mut String) {
    out.push('"');
    out.push_str(&text.replace('"', "\\\""));
    out.push('"');
}

/// Whether a key would not lex back as a single address token.
fn key_needs_quotes(key: &str) -> bool {
    key.is_empty()
        || key == "{"
        || key == "}"
        || key.starts_with('"')
        || key.chars().any(|c| c.is_whitespace() || c == '#')
}

fn push_keys(keys: &[String], out: &mut String) {
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if key_needs_quotes(key) {
            push_quoted(key, out);
        } else {
            out.push_str(key);
        }
    }
}

/// Whether `directive` is a bind directive that must be suppressed.
pub fn is_bind_directive(directive: &Directive) -> bool {
    directive.name().eq_ignore_ascii_case(BIND_DIRECTIVE)
}

/// Render the tokens of one directive as indented lines, each ending in a newline.
pub fn render_directive(directive: &Directive, out: &mut String) {
    if directive.tokens.is_empty() {
        return;
    }
    let mut state = IndentState::default();
    for token in &directive.tokens {
        state.emit(token, out);
    }
    out.push('\n');
}

/// Render `block` with `bind_statement` injected as its first body line.
pub fn render_block(block: &ServerBlock, bind_statement: &str, out: &mut String) {
    push_keys(&block.keys, out);
    out.push_str(" {\n");
    out.push_str(INDENT);
    out.push_str(bind_statement);
    out.push('\n');

    for directive in block.directives.iter().filter(|d| !is_bind_directive(d)) {
        render_directive(directive, out);
    }

    out.push_str("}\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use rstest::rstest;

    fn render_source(source: &str, bind: &str) -> String {
        let blocks = parse("fixture.server", source.as_bytes()).unwrap();
        let mut out = String::new();
        for block in &blocks {
            render_block(block, bind, &mut out);
        }
        out
    }

    #[test]
    fn empty_body_renders_only_bind_line() {
        let block = ServerBlock {
            keys: vec!["a:53".into()],
            directives: Vec::new(),
        };
        let mut out = String::new();
        render_block(&block, "bind 10.0.0.1", &mut out);
        assert_eq!(out, "a:53 {\n    bind 10.0.0.1\n}\n\n");
    }

    #[test]
    fn keys_are_space_joined() {
        assert_eq!(
            render_source("a:53, b:53 c:53 {\n    log\n}\n", "bind 1.2.3.4"),
            "a:53 b:53 c:53 {\n    bind 1.2.3.4\n    log\n}\n\n"
        );
    }

    #[rstest]
    #[case::bind("bind 127.0.0.1")]
    #[case::upper("BIND 127.0.0.1 ::1")]
    #[case::mixed("Bind lo")]
    fn original_bind_is_suppressed(#[case] original: &str) {
        let source = format!("a:53 {{\n    {original}\n    log\n}}\n");
        assert_eq!(
            render_source(&source, "bind 1.2.3.4"),
            "a:53 {\n    bind 1.2.3.4\n    log\n}\n\n"
        );
    }

    #[test]
    fn bind_as_argument_is_not_suppressed() {
        assert_eq!(
            render_source("a:53 {\n    template bind\n}\n", "bind 1.2.3.4"),
            "a:53 {\n    bind 1.2.3.4\n    template bind\n}\n\n"
        );
    }

    #[test]
    fn nested_blocks_are_reindented() {
        let source = "a:53 {\n  forward . 1.1.1.1 {\n        max_fails 3\n  expire 10s\n      }\n cache 30\n}\n";
        let expected = "a:53 {\n    bind 1.2.3.4\n    forward . 1.1.1.1 {\n        max_fails 3\n        expire 10s\n    }\n    cache 30\n}\n\n";
        assert_eq!(render_source(source, "bind 1.2.3.4"), expected);
    }

    #[test]
    fn doubly_nested_blocks_are_reindented() {
        let source = "a:53 {\nkubernetes cluster.local {\npods insecure\nfallthrough {\nin-addr.arpa\n}\n}\n}\n";
        let expected = concat!(
            "a:53 {\n",
            "    bind b\n",
            "    kubernetes cluster.local {\n",
            "        pods insecure\n",
            "        fallthrough {\n",
            "            in-addr.arpa\n",
            "        }\n",
            "    }\n",
            "}\n\n",
        );
        assert_eq!(render_source(source, "bind b"), expected);
    }

    #[test]
    fn same_line_tokens_keep_line_layout() {
        let source = "a:53 {\n    hosts { 10.0.0.1 db\n    fallthrough }\n}\n";
        let expected = "a:53 {\n    bind b\n    hosts { 10.0.0.1 db\n        fallthrough }\n}\n\n";
        assert_eq!(render_source(source, "bind b"), expected);
    }

    #[test]
    fn quoted_tokens_are_requoted() {
        let source = "a:53 {\n    template IN TXT {\n        answer \"{{ .Name }} 60 IN TXT \\\"hi\\\"\"\n    }\n}\n";
        let expected = "a:53 {\n    bind b\n    template IN TXT {\n        answer \"{{ .Name }} 60 IN TXT \\\"hi\\\"\"\n    }\n}\n\n";
        assert_eq!(render_source(source, "bind b"), expected);
    }

    #[test]
    fn keys_with_spaces_are_requoted() {
        let out = render_source("\"a b:53\" c:53 \"d#e:53\" {\n    log\n}\n", "bind b");
        assert_eq!(out, "\"a b:53\" c:53 \"d#e:53\" {\n    bind b\n    log\n}\n\n");

        let reparsed = parse("again.server", out.as_bytes()).unwrap();
        assert_eq!(reparsed[0].keys, vec!["a b:53", "c:53", "d#e:53"]);
    }

    #[test]
    fn comments_are_not_rendered() {
        let source = "a:53 { # zone\n    log # access log\n}\n";
        assert_eq!(render_source(source, "bind b"), "a:53 {\n    bind b\n    log\n}\n\n");
    }
}
