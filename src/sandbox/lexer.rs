use crate::error::EvalError;

const PUNCTUATORS: [&str; 48] = [
    "...", "===", "!==", "**=", "&&=", "||=", "??=", "=>", "==", "!=", "<=", ">=", "&&", "||",
    "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "**", "{", "}", "(", ")", "[", "]",
    ";", ",", "<", ">", "+", "-", "*", "/", "%", "!", "?", ":", "=", ".", "&", "|", "^", "~",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    Text(String),
    /// Raw source of a `${...}` interpolation and its starting position.
    Expr {
        source: String,
        line: usize,
        column: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Template(Vec<TemplateChunk>),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
    /// Whether a line break precedes the token.
    pub newline_before: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerState {
    pos: usize,
    line: usize,
    column: usize,
}

/// Character-level scanner for the supported JavaScript/JSX subset.
///
/// The parser drives it in two modes: ordinary tokens through
/// [`Lexer::next_token`] and raw JSX child text through [`Lexer::jsx_text`].
#[derive(Debug, Clone)]
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self::with_origin(source, 1, 1)
    }

    /// Lexer whose positions start at `line:column`, used for template
    /// interpolations so errors point into the enclosing source.
    #[must_use]
    pub fn with_origin(source: &str, line: usize, column: usize) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line,
            column,
        }
    }

    #[must_use]
    pub fn state(&self) -> LexerState {
        LexerState {
            pos: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    pub fn restore(&mut self, state: LexerState) {
        self.pos = state.pos;
        self.line = state.line;
        self.column = state.column;
    }

    #[must_use]
    pub fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    pub fn error(&self, message: impl Into<String>) -> EvalError {
        EvalError::Syntax {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(offset, ch)| self.peek_char_at(offset) == Some(ch))
    }

    /// Skips whitespace and comments, reporting whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, EvalError> {
        let mut newline = false;
        loop {
            match self.peek_char() {
                Some(ch) if ch.is_whitespace() => {
                    newline |= ch == '\n';
                    self.bump();
                }
                Some('/') if self.peek_char_at(1) == Some('/') => {
                    while let Some(ch) = self.peek_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_char_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        if self.starts_with("*/") {
                            self.bump();
                            self.bump();
                            break;
                        }
                        match self.bump() {
                            Some('\n') => newline = true,
                            Some(_) => {}
                            None => return Err(self.error("unterminated comment")),
                        }
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Spanned, EvalError> {
        let newline_before = self.skip_trivia()?;
        let (line, column) = self.position();
        let token = self.scan_token()?;
        Ok(Spanned {
            token,
            line,
            column,
            newline_before,
        })
    }

    fn scan_token(&mut self) -> Result<Token, EvalError> {
        let Some(ch) = self.peek_char() else {
            return Ok(Token::Eof);
        };

        if is_ident_start(ch) {
            let mut ident = String::new();
            while let Some(ch) = self.peek_char() {
                if !is_ident_part(ch) {
                    break;
                }
                ident.push(ch);
                self.bump();
            }
            return Ok(Token::Ident(ident));
        }

        if ch.is_ascii_digit() || (ch == '.' && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        match ch {
            '"' | '\'' => return self.scan_string(ch),
            '`' => return self.scan_template(),
            _ => {}
        }

        for punct in PUNCTUATORS {
            if self.starts_with(punct) {
                // `a?.5:b` is a conditional, not optional chaining.
                if punct == "?." && self.peek_char_at(2).is_some_and(|c| c.is_ascii_digit()) {
                    continue;
                }
                for _ in 0..punct.len() {
                    self.bump();
                }
                return Ok(Token::Punct(punct));
            }
        }

        Err(self.error(format!("unexpected character `{ch}`")))
    }

    fn scan_number(&mut self) -> Result<Token, EvalError> {
        if self.peek_char() == Some('0')
            && matches!(self.peek_char_at(1), Some('x' | 'X'))
        {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(ch) = self.peek_char() {
                if ch.is_ascii_hexdigit() {
                    digits.push(ch);
                    self.bump();
                } else if ch == '_' {
                    self.bump();
                } else {
                    break;
                }
            }
            return u64::from_str_radix(&digits, 16)
                .map(|value| Token::Number(value as f64))
                .map_err(|_| self.error("invalid hexadecimal literal"));
        }

        let mut text = String::new();
        let mut seen_exponent = false;
        while let Some(ch) = self.peek_char() {
            let accept = ch.is_ascii_digit()
                || ch == '.'
                || ((ch == 'e' || ch == 'E') && !seen_exponent)
                || ((ch == '+' || ch == '-') && matches!(text.chars().last(), Some('e' | 'E')));
            if ch == '_' {
                self.bump();
                continue;
            }
            if !accept {
                break;
            }
            seen_exponent |= ch == 'e' || ch == 'E';
            text.push(ch);
            self.bump();
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(format!("invalid number literal `{text}`")))
    }

    fn scan_string(&mut self, quote: char) -> Result<Token, EvalError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(ch) if ch == quote => return Ok(Token::Str(value)),
                Some('\\') => value.push(self.scan_escape()?),
                Some('\n') | None => return Err(self.error("unterminated string literal")),
                Some(ch) => value.push(ch),
            }
        }
    }

    fn scan_escape(&mut self) -> Result<char, EvalError> {
        let Some(ch) = self.bump() else {
            return Err(self.error("unterminated escape sequence"));
        };
        Ok(match ch {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'u' => {
                let mut hex = String::new();
                if self.peek_char() == Some('{') {
                    self.bump();
                    while let Some(ch) = self.bump() {
                        if ch == '}' {
                            break;
                        }
                        hex.push(ch);
                    }
                } else {
                    for _ in 0..4 {
                        if let Some(ch) = self.bump() {
                            hex.push(ch);
                        }
                    }
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error("invalid unicode escape"))?
            }
            other => other,
        })
    }

    fn scan_template(&mut self) -> Result<Token, EvalError> {
        self.bump();
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some('\\') => text.push(self.scan_escape()?),
                Some('$') if self.peek_char() == Some('{') => {
                    self.bump();
                    if !text.is_empty() {
                        chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    }
                    let (line, column) = self.position();
                    let source = self.scan_balanced_braces()?;
                    chunks.push(TemplateChunk::Expr {
                        source,
                        line,
                        column,
                    });
                }
                Some(ch) => text.push(ch),
                None => return Err(self.error("unterminated template literal")),
            }
        }
        if !text.is_empty() {
            chunks.push(TemplateChunk::Text(text));
        }
        Ok(Token::Template(chunks))
    }

    /// Reads up to the `}` closing an interpolation, skipping nested braces
    /// and string literals.
    fn scan_balanced_braces(&mut self) -> Result<String, EvalError> {
        let mut depth = 0usize;
        let mut source = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(self.error("unterminated template interpolation"));
            };
            match ch {
                '{' => depth += 1,
                '}' if depth == 0 => return Ok(source),
                '}' => depth -= 1,
                '"' | '\'' | '`' => {
                    source.push(ch);
                    while let Some(inner) = self.bump() {
                        source.push(inner);
                        if inner == '\\' {
                            if let Some(escaped) = self.bump() {
                                source.push(escaped);
                            }
                        } else if inner == ch {
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            source.push(ch);
        }
    }

    /// Raw JSX child text up to the next `{` or `<`.
    pub fn jsx_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.peek_char() {
            if ch == '{' || ch == '<' {
                break;
            }
            text.push(ch);
            self.bump();
        }
        text
    }

    /// JSX attribute string: quotes delimit, backslashes are literal.
    pub fn jsx_attribute_string(&mut self) -> Result<Option<String>, EvalError> {
        self.skip_trivia()?;
        let Some(quote) = self.peek_char().filter(|ch| *ch == '"' || *ch == '\'') else {
            return Ok(None);
        };
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(ch) if ch == quote => return Ok(Some(value)),
                Some(ch) => value.push(ch),
                None => return Err(self.error("unterminated JSX attribute string")),
            }
        }
    }

    /// Consumes `expected` after skipping trivia, if it is next.
    pub fn eat_char(&mut self, expected: char) -> Result<bool, EvalError> {
        self.skip_trivia()?;
        Ok(self.eat_raw_char(expected))
    }

    /// Consumes `expected` without skipping anything; JSX child text is
    /// significant up to the delimiter.
    pub fn eat_raw_char(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.bump();
            return true;
        }
        false
    }

    /// JSX names may contain `-` (`data-key`, `stroke-width`).
    pub fn jsx_name(&mut self) -> Result<Option<String>, EvalError> {
        self.skip_trivia()?;
        match self.peek_char() {
            Some(ch) if is_ident_start(ch) => {}
            _ => return Ok(None),
        }
        let mut name = String::new();
        while let Some(ch) = self.peek_char() {
            if !(is_ident_part(ch) || ch == '-') {
                break;
            }
            name.push(ch);
            self.bump();
        }
        Ok(Some(name))
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}
