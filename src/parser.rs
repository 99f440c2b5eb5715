//! Server block parser for Corefile fragments.
//!
//! Consumes the token stream produced by [`crate::lexer`] and groups it into
//! server blocks: the listening keys of each block plus the tokens of every
//! directive in its body. Nested directive bodies are kept flat inside their
//! directive; only line numbers and braces survive, which is all the renderer
//! needs to rebuild the layout.

use std::{collections::HashMap, env};
use log::debug;

use crate::errors::ParseError;
use crate::lexer::{tokenize, Token};

/// Upper bound on snippet expansions per fragment, guards against import cycles.
pub const MAX_IMPORT_EXPANSIONS: usize = 1024;

/// One directive of a server block body, starting with the directive name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub tokens: Vec<Token>,
}

impl Directive {
    /// The directive name, i.e. the text of its first token.
    pub fn name(&self) -> &str {
        self.tokens.first().map(|t| t.text.as_str()).unwrap_or("")
    }
}

/// A parsed server block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerBlock {
    /// Listening addresses in declaration order.
    pub keys: Vec<String>,

    /// Body directives in source order.
    pub directives: Vec<Directive>,
}

impl ServerBlock {
    fn snippet_name(&self) -> Option<String> {
        match self.keys.as_slice() {
            [key] if key.len() > 2 && key.starts_with('(') && key.ends_with(')') => {
                Some(key[1..key.len() - 1].to_string())
            }
            _ => None,
        }
    }
}

/// Parse the content of the fragment `name` into its server blocks.
///
/// Snippet definitions are consumed and never returned as blocks.
pub fn parse(name: &str, content: &[u8]) -> Result<Vec<ServerBlock>, ParseError> {
    let text = std::str::from_utf8(content)
        .map_err(|e| ParseError::new(name, 0, format!("fragment is not valid UTF-8: {e}")))?;
    Parser::new(name, tokenize(text)).parse_all()
}

struct Parser<'a> {
    file: &'a str,
    tokens: Vec<Token>,
    /// Number of consumed tokens; the current token is `tokens[cursor - 1]`.
    cursor: usize,
    snippets: HashMap<String, Vec<Token>>,
    expansions: usize,
}

impl<'a> Parser<'a> {
    fn new(file: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            file,
            tokens,
            cursor: 0,
            snippets: HashMap::new(),
            expansions: 0,
        }
    }

    fn parse_all(mut self) -> Result<Vec<ServerBlock>, ParseError> {
        let mut blocks = Vec::new();
        while self.next() {
            if let Some(block) = self.parse_one()? {
                blocks.push(block);
            }
        }
        debug!("Parsed {} server block(s) from {}", blocks.len(), self.file);
        Ok(blocks)
    }

    /// Parse one block starting at the current token.
    fn parse_one(&mut self) -> Result<Option<ServerBlock>, ParseError> {
        let mut block = ServerBlock::default();
        let eof = self.addresses(&mut block.keys)?;

        if let Some(name) = block.snippet_name() {
            if self.snippets.contains_key(&name) {
                return Err(self.err(format!("redeclaration of previously declared snippet {name}")));
            }
            let tokens = self.snippet_tokens()?;
            debug!("Defined snippet {} ({} tokens)", name, tokens.len());
            self.snippets.insert(name, tokens);
            return Ok(None);
        }

        if !eof {
            self.block_contents(&mut block)?;
        }

        Ok((!block.keys.is_empty()).then_some(block))
    }

    /// Read the address keys; returns true when the input ended on the address line.
    fn addresses(&mut self, keys: &mut Vec<String>) -> Result<bool, ParseError> {
        let mut expecting_another = false;

        loop {
            let tkn = self.current().clone();

            if self.is_import() && self.is_new_line() {
                self.do_import()?;
                if !self.next() {
                    if expecting_another {
                        return Err(self.eof_err());
                    }
                    return Ok(true);
                }
                continue;
            }

            if tkn.is_open_brace() {
                if expecting_another {
                    return Err(self.err("Expected another address but had '{' - check for extra comma"));
                }
                return Ok(false);
            }

            if tkn.is_close_brace() {
                return Err(self.err("Unexpected '}' because no matching opening brace"));
            }

            if !tkn.text.is_empty() {
                let mut key = replace_env_vars(&tkn.text);
                // Trailing comma means another address follows, maybe on the next line
                expecting_another = key.ends_with(',');
                if expecting_another {
                    key.pop();
                }
                if !key.is_empty() {
                    keys.push(key);
                }
            }

            if !self.next() {
                if expecting_another {
                    return Err(self.eof_err());
                }
                return Ok(true);
            }

            if !expecting_another && self.is_new_line() {
                return Ok(false);
            }
        }
    }

    fn block_contents(&mut self, block: &mut ServerBlock) -> Result<(), ParseError> {
        let braced = self.current().is_open_brace();
        if !braced {
            // Braceless single-server form, the current token is the first directive
            self.back();
        }

        let closed = self.directives(&mut block.directives)?;

        if braced && !closed {
            return Err(self.syntax_err("}"));
        }
        if !braced && closed {
            return Err(self.err("Unexpected '}' because no matching opening brace"));
        }
        Ok(())
    }

    /// Read directives until the closing brace of the block (returns true) or EOF.
    fn directives(&mut self, out: &mut Vec<Directive>) -> Result<bool, ParseError> {
        while self.next() {
            if self.current().is_close_brace() {
                return Ok(true);
            }
            if self.is_import() {
                self.do_import()?;
                continue;
            }
            out.push(self.directive()?);
        }
        Ok(false)
    }

    fn directive(&mut self) -> Result<Directive, ParseError> {
        let mut tokens = vec![self.current().clone()];
        let mut nesting = 0usize;

        while self.next() {
            let tok = self.current();
            if tok.is_open_brace() {
                nesting += 1;
            } else if nesting == 0 && self.is_new_line() {
                self.back();
                break;
            } else if tok.is_close_brace() {
                if nesting == 0 {
                    // Closes the enclosing server block on the same line
                    self.back();
                    break;
                }
                nesting -= 1;
            }

            let mut tok = tok.clone();
            tok.text = replace_env_vars(&tok.text);
            tokens.push(tok);
        }

        if nesting > 0 {
            return Err(self.eof_err());
        }
        Ok(Directive { tokens })
    }

    /// Collect the body tokens of a snippet definition, braces excluded.
    fn snippet_tokens(&mut self) -> Result<Vec<Token>, ParseError> {
        if !self.current().is_open_brace() {
            return Err(self.syntax_err("{"));
        }

        let mut depth = 1usize;
        let mut tokens = Vec::new();
        while self.next() {
            let tok = self.current();
            if tok.is_close_brace() {
                depth -= 1;
                if depth == 0 {
                    return Ok(tokens);
                }
            } else if tok.is_open_brace() {
                depth += 1;
            }
            tokens.push(tok.clone());
        }

        Err(self.syntax_err("}"))
    }

    /// Replace `import <snippet>` at the cursor with the snippet's tokens.
    ///
    /// Afterwards the next call to [`Parser::next`] yields the first imported token.
    fn do_import(&mut self) -> Result<(), ParseError> {
        let import_idx = self.cursor - 1;
        let import_line = self.current().line;

        if !self.next_arg() {
            return Err(self.err(format!(
                "Wrong argument count or unexpected line ending after '{}'",
                self.current().text
            )));
        }
        let pattern = replace_env_vars(&self.current().text);
        if pattern.is_empty() {
            return Err(self.err("Import requires a non-empty filepath"));
        }
        if self.next_arg() {
            return Err(self.err("Import takes only one argument (glob pattern or file)"));
        }

        self.expansions += 1;
        if self.expansions > MAX_IMPORT_EXPANSIONS {
            return Err(self.err(format!("Too many imports while expanding {pattern}, possible import cycle")));
        }

        let Some(snippet) = self.snippets.get(&pattern) else {
            return Err(self.err(format!("File to import not found: {pattern}")));
        };

        let imported = rebase_lines(snippet, import_line);
        let extra_lines = imported
            .last()
            .map(|t| t.line + t.line_breaks() - import_line)
            .unwrap_or(0);

        let after = import_idx + 2;
        if extra_lines > 0 {
            // Keep later tokens below the spliced ones
            for tok in &mut self.tokens[after..] {
                tok.line += extra_lines;
            }
        }
        self.tokens.splice(import_idx..after, imported);
        self.cursor = import_idx;
        Ok(())
    }

    fn next(&mut self) -> bool {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Advance only if the next token is on the same line as the current one.
    fn next_arg(&mut self) -> bool {
        let (Some(cur), Some(next)) = (self.tokens.get(self.cursor - 1), self.tokens.get(self.cursor)) else {
            return false;
        };
        if cur.line + cur.line_breaks() == next.line && !next.is_close_brace() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn back(&mut self) {
        self.cursor -= 1;
    }

    fn current(&self) -> &Token {
        &self.tokens[self.cursor - 1]
    }

    fn is_import(&self) -> bool {
        let tok = self.current();
        !tok.quoted && tok.text == "import"
    }

    /// Whether the current token starts a new source line.
    fn is_new_line(&self) -> bool {
        if self.cursor <= 1 {
            return true;
        }
        let prev = &self.tokens[self.cursor - 2];
        prev.line + prev.line_breaks() != self.current().line
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.cursor.saturating_sub(1))
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(0)
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.file, self.line(), message)
    }

    fn eof_err(&self) -> ParseError {
        self.err("Unexpected EOF")
    }

    fn syntax_err(&self, expected: &str) -> ParseError {
        self.err(format!(
            "Syntax error: Unexpected token '{}', expecting '{}'",
            self.current().text,
            expected
        ))
    }
}

/// Move `tokens` so the first one sits on `line`, keeping relative offsets.
fn rebase_lines(tokens: &[Token], line: usize) -> Vec<Token> {
    let Some(base) = tokens.first().map(|t| t.line) else {
        return Vec::new();
    };
    tokens
        .iter()
        .map(|t| Token {
            line: t.line - base + line,
            ..t.clone()
        })
        .collect()
}

/// Substitute `{$NAME}` and `{%NAME%}` placeholders with environment values.
pub fn replace_env_vars(s: &str) -> String {
    let s = replace_placeholders(s, "{$", "}");
    replace_placeholders(&s, "{%", "%}")
}

fn replace_placeholders(s: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find(open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(close) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&env::var(&after[..end]).unwrap_or_default());
        rest = &after[end + close.len()..];
    }
    out.push_str(rest);
    out
}
