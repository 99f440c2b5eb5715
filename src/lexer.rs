//! Tokenizer for the Corefile grammar.
//!
//! Splits fragment text into whitespace separated tokens, honouring `#`
//! comments and double-quoted strings. Every token keeps the source line it
//! starts on; the renderer rebuilds line breaks from those numbers.

/// A single lexical token of a fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token text, without surrounding quotes.
    pub text: String,

    /// Line the token starts on (1-based).
    pub line: usize,

    /// Whether the token was written as a `"..."` literal.
    pub quoted: bool,
}

impl Token {
    pub fn new(text: impl Into<String>, line: usize) -> Self {
        Self {
            text: text.into(),
            line,
            quoted: false,
        }
    }

    pub fn quoted(text: impl Into<String>, line: usize) -> Self {
        Self {
            text: text.into(),
            line,
            quoted: true,
        }
    }

    /// True for an unquoted `{`.
    pub fn is_open_brace(&self) -> bool {
        !self.quoted && self.text == "{"
    }

    /// True for an unquoted `}`.
    pub fn is_close_brace(&self) -> bool {
        !self.quoted && self.text == "}"
    }

    /// Number of line breaks embedded in the token (only quoted tokens can span lines).
    pub fn line_breaks(&self) -> usize {
        self.text.matches('\n').count()
    }
}

/// Tokenize `input`, skipping a leading byte order mark.
///
/// Lexing never fails: an unterminated quoted string simply runs to the end
/// of the input and structural problems are reported by the parser.
pub fn tokenize(input: &str) -> Vec<Token> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut val = String::new();
    let mut start_line = line;
    let mut quoted = false;
    let mut escaped = false;
    let mut comment = false;

    for ch in input.chars() {
        if quoted {
            if !escaped {
                if ch == '\\' {
                    escaped = true;
                    continue;
                }
                if ch == '"' {
                    tokens.push(Token::quoted(std::mem::take(&mut val), start_line));
                    quoted = false;
                    continue;
                }
            }
            if ch == '\n' {
                line += 1;
            }
            // Only quotes can be escaped, other backslashes stay literal
            if escaped && ch != '"' {
                val.push('\\');
            }
            val.push(ch);
            escaped = false;
            continue;
        }

        if ch.is_whitespace() {
            if ch == '\r' {
                continue;
            }
            if ch == '\n' {
                line += 1;
                comment = false;
            }
            if !val.is_empty() {
                tokens.push(Token::new(std::mem::take(&mut val), start_line));
            }
            continue;
        }

        if ch == '#' {
            comment = true;
        }
        if comment {
            continue;
        }

        if val.is_empty() {
            start_line = line;
            if ch == '"' {
                quoted = true;
                continue;
            }
        }
        val.push(ch);
    }

    if quoted {
        if escaped {
            val.push('\\');
        }
        tokens.push(Token::quoted(val, start_line));
    } else if !val.is_empty() {
        tokens.push(Token::new(val, start_line));
    }

    tokens
}
