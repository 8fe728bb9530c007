//! JavaScript tokenizer
//!
//! An ES5 lexer (plus template literals) shared by the linter and the
//! minifier. Every token borrows its text from the source and records its
//! position and whether a line terminator preceded it, which is what
//! automatic semicolon insertion depends on.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number,
    String,
    Template,
    Regex,
    Punct,
    LineComment,
    BlockComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// 1-based
    pub line: usize,
    /// 1-based, in characters
    pub column: usize,
    pub newline_before: bool,
}

impl Token<'_> {
    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::LineComment | TokenKind::BlockComment)
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_keyword(&self, k: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == k
    }

    /// Whether a statement may end with this token
    pub fn can_end_statement(&self) -> bool {
        match self.kind {
            TokenKind::Identifier
            | TokenKind::Number
            | TokenKind::String
            | TokenKind::Template
            | TokenKind::Regex => true,
            TokenKind::Keyword => matches!(
                self.text,
                "this" | "null" | "true" | "false" | "super" | "return" | "break" | "continue"
                    | "debugger" | "throw"
            ),
            TokenKind::Punct => matches!(self.text, ")" | "]" | "}" | "++" | "--"),
            TokenKind::LineComment | TokenKind::BlockComment => false,
        }
    }

    /// Whether this token can begin a new statement that does not continue
    /// the previous line
    pub fn can_start_statement(&self) -> bool {
        match self.kind {
            TokenKind::Identifier
            | TokenKind::Number
            | TokenKind::String
            | TokenKind::Regex => true,
            TokenKind::Keyword => !matches!(self.text, "in" | "instanceof"),
            TokenKind::Punct => matches!(self.text, "{" | "!" | "~" | "++" | "--"),
            TokenKind::Template | TokenKind::LineComment | TokenKind::BlockComment => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for SyntaxError {}

pub const KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "let", "new", "null", "return", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Longest first
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "=>", "==", "!=", "<=", ">=", "&&",
    "||", "??", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<", ">>", "**",
    "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^",
    "!", "~", "?", ":", "=", ".", "@", "#",
];

/// Keywords after which a `/` starts a regular expression
const REGEX_AFTER_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "new", "delete", "void", "throw", "case", "do",
    "else", "yield",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

pub fn is_ident_start(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphabetic()
}

pub fn is_ident_part(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphanumeric() || c == '\u{200c}' || c == '\u{200d}'
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Whether `word` could be written as a dotted property name
pub fn is_identifier_name(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => chars.all(is_ident_part),
        _ => false,
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    newline_before: bool,
    tokens: Vec<Token<'a>>,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' || c == '\u{2028}' || c == '\u{2029}' || (c == '\r' && self.peek() != Some('\n')) {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn last_significant(&self) -> Option<&Token<'a>> {
        self.tokens.iter().rev().find(|t| !t.is_comment())
    }

    fn regex_allowed(&self) -> bool {
        match self.last_significant() {
            None => true,
            Some(t) => match t.kind {
                // a regex can never be the operand of `++`/`--`
                TokenKind::Punct => !matches!(t.text, ")" | "]" | "++" | "--"),
                TokenKind::Keyword => REGEX_AFTER_KEYWORDS.contains(&t.text),
                _ => false,
            },
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize, column: usize) {
        self.tokens.push(Token {
            kind,
            text: &self.src[start..self.pos],
            line,
            column,
            newline_before: self.newline_before,
        });
        if kind != TokenKind::BlockComment && kind != TokenKind::LineComment {
            self.newline_before = false;
        }
    }

    fn run(mut self) -> Result<Vec<Token<'a>>, SyntaxError> {
        while let Some(c) = self.peek() {
            if is_line_terminator(c) {
                self.bump();
                self.newline_before = true;
                continue;
            }
            if c.is_whitespace() || c == '\u{feff}' {
                self.bump();
                continue;
            }

            let (start, line, column) = (self.pos, self.line, self.column);

            if c == '/' && self.peek_at(1) == Some('/') {
                while let Some(c) = self.peek() {
                    if is_line_terminator(c) {
                        break;
                    }
                    self.bump();
                }
                self.push(TokenKind::LineComment, start, line, column);
            } else if c == '/' && self.peek_at(1) == Some('*') {
                self.bump();
                self.bump();
                loop {
                    match self.bump() {
                        Some('*') if self.peek() == Some('/') => {
                            self.bump();
                            break;
                        }
                        Some(_) => {}
                        None => {
                            return Err(SyntaxError {
                                line,
                                column,
                                message: "Unclosed comment.".to_string(),
                            })
                        }
                    }
                }
                self.push(TokenKind::BlockComment, start, line, column);
                // a comment spanning lines counts as a line break
                if self.src[start..self.pos].chars().any(is_line_terminator) {
                    self.newline_before = true;
                }
            } else if is_ident_start(c) || c == '\\' {
                self.scan_identifier()?;
                let kind = if is_keyword(&self.src[start..self.pos]) {
                    TokenKind::Keyword
                } else {
                    TokenKind::Identifier
                };
                self.push(kind, start, line, column);
            } else if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).map_or(false, |n| n.is_ascii_digit()))
            {
                self.scan_number();
                self.push(TokenKind::Number, start, line, column);
            } else if c == '"' || c == '\'' {
                self.scan_string(c)?;
                self.push(TokenKind::String, start, line, column);
            } else if c == '`' {
                self.scan_template()?;
                self.push(TokenKind::Template, start, line, column);
            } else if c == '/' && self.regex_allowed() {
                self.scan_regex()?;
                self.push(TokenKind::Regex, start, line, column);
            } else if let Some(p) = PUNCTUATORS.iter().find(|p| self.src[self.pos..].starts_with(*p)) {
                for _ in 0..p.len() {
                    self.bump();
                }
                self.push(TokenKind::Punct, start, line, column);
            } else {
                return Err(self.error(format!("Unexpected '{}'.", c)));
            }
        }

        Ok(self.tokens)
    }

    fn scan_identifier(&mut self) -> Result<(), SyntaxError> {
        while let Some(c) = self.peek() {
            if c == '\\' {
                // \uXXXX escape
                self.bump();
                if self.bump() != Some('u') {
                    return Err(self.error("Bad identifier escape."));
                }
                for _ in 0..4 {
                    match self.bump() {
                        Some(h) if h.is_ascii_hexdigit() => {}
                        _ => return Err(self.error("Bad identifier escape.")),
                    }
                }
            } else if is_ident_part(c) {
                self.bump();
            } else {
                break;
            }
        }
        Ok(())
    }

    fn scan_number(&mut self) {
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            self.bump();
            self.bump();
            while self.peek().map_or(false, |c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            return;
        }

        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).map_or(false, |c| c.is_ascii_digit()) {
                self.bump();
                if signed {
                    self.bump();
                }
                while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        loop {
            match self.peek() {
                Some('\\') => {
                    self.bump();
                    // escaped line terminator continues the string
                    if self.peek() == Some('\r') && self.peek_at(1) == Some('\n') {
                        self.bump();
                    }
                    self.bump();
                }
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(());
                }
                Some(c) if is_line_terminator(c) => break,
                Some(_) => {
                    self.bump();
                }
                None => break,
            }
        }
        Err(SyntaxError {
            line,
            column,
            message: "Unclosed string.".to_string(),
        })
    }

    fn scan_template(&mut self) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '`' => return Ok(()),
                _ => {}
            }
        }
        Err(SyntaxError {
            line,
            column,
            message: "Unclosed template literal.".to_string(),
        })
    }

    fn scan_regex(&mut self) -> Result<(), SyntaxError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        let mut in_class = false;
        loop {
            match self.peek() {
                Some('\\') => {
                    self.bump();
                    match self.peek() {
                        Some(c) if !is_line_terminator(c) => {
                            self.bump();
                        }
                        _ => break,
                    }
                }
                Some('[') => {
                    in_class = true;
                    self.bump();
                }
                Some(']') => {
                    in_class = false;
                    self.bump();
                }
                Some('/') if !in_class => {
                    self.bump();
                    while self.peek().map_or(false, is_ident_part) {
                        self.bump();
                    }
                    return Ok(());
                }
                Some(c) if is_line_terminator(c) => break,
                Some(_) => {
                    self.bump();
                }
                None => break,
            }
        }
        Err(SyntaxError {
            line,
            column,
            message: "Unclosed regular expression.".to_string(),
        })
    }
}

/// Tokenize JavaScript source, comments included
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, SyntaxError> {
    Lexer {
        src,
        pos: 0,
        line: 1,
        column: 1,
        newline_before: false,
        tokens: Vec::new(),
    }
    .run()
}

/// Tokenize and drop comments
pub fn significant_tokens(src: &str) -> Result<Vec<Token<'_>>, SyntaxError> {
    Ok(tokenize(src)?.into_iter().filter(|t| !t.is_comment()).collect())
}

/// Index of the matching closing bracket for every opening bracket
pub fn match_brackets(tokens: &[Token<'_>]) -> Vec<Option<usize>> {
    let mut matches = vec![None; tokens.len()];
    let mut stack: Vec<(usize, &str)> = Vec::new();

    for (i, tok) in tokens.iter().enumerate() {
        if tok.kind != TokenKind::Punct {
            continue;
        }
        match tok.text {
            "(" | "[" | "{" => stack.push((i, tok.text)),
            ")" | "]" | "}" => {
                let open = match tok.text {
                    ")" => "(",
                    "]" => "[",
                    _ => "{",
                };
                if let Some(pos) = stack.iter().rposition(|(_, t)| *t == open) {
                    let (start, _) = stack[pos];
                    stack.truncate(pos);
                    matches[start] = Some(i);
                }
            }
            _ => {}
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, &str)> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_basic_statement() {
        assert_eq!(
            kinds("var a = 1.5e3;"),
            vec![
                (TokenKind::Keyword, "var"),
                (TokenKind::Identifier, "a"),
                (TokenKind::Punct, "="),
                (TokenKind::Number, "1.5e3"),
                (TokenKind::Punct, ";"),
            ]
        );
    }

    #[test]
    fn test_regex_versus_division() {
        let toks = kinds("x = a / b; y = /ab+c/gi.test(s); z = (a) / 2;");
        assert!(toks.contains(&(TokenKind::Regex, "/ab+c/gi")));
        assert_eq!(
            toks.iter().filter(|(k, t)| *k == TokenKind::Punct && *t == "/").count(),
            2
        );
    }

    #[test]
    fn test_division_after_postfix_update() {
        let toks = kinds("var half = count++ / 2; var rest = n-- / d;");
        assert!(!toks.iter().any(|(k, _)| *k == TokenKind::Regex));
        assert_eq!(
            toks.iter().filter(|(k, t)| *k == TokenKind::Punct && *t == "/").count(),
            2
        );
    }

    #[test]
    fn test_regex_followed_by_keyword() {
        let toks = kinds("var ok = /x/ instanceof RegExp;");
        assert_eq!(toks[3], (TokenKind::Regex, "/x/"));
        assert_eq!(toks[4], (TokenKind::Keyword, "instanceof"));
    }

    #[test]
    fn test_regex_with_slash_in_class() {
        let toks = kinds("return /[/]+/;");
        assert_eq!(toks[1], (TokenKind::Regex, "/[/]+/"));
    }

    #[test]
    fn test_strings_and_comments() {
        let toks = kinds("// hi\n'it\\'s' /* block */ \"x\"");
        assert_eq!(
            toks,
            vec![
                (TokenKind::LineComment, "// hi"),
                (TokenKind::String, "'it\\'s'"),
                (TokenKind::BlockComment, "/* block */"),
                (TokenKind::String, "\"x\""),
            ]
        );
    }

    #[test]
    fn test_positions_and_newlines() {
        let toks = tokenize("a\n  b /*\n*/ c").unwrap();
        assert_eq!((toks[0].line, toks[0].column, toks[0].newline_before), (1, 1, false));
        assert_eq!((toks[1].line, toks[1].column, toks[1].newline_before), (2, 3, true));
        // multi-line comment acts as a line break
        assert!(toks[3].newline_before);
    }

    #[test]
    fn test_unclosed_string_is_error() {
        let err = tokenize("var s = 'abc\n';").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("string"));
    }

    #[test]
    fn test_match_brackets() {
        let toks = significant_tokens("f(a[1], {b: 2})").unwrap();
        let m = match_brackets(&toks);
        assert_eq!(m[1], Some(toks.len() - 1));
        assert_eq!(toks[m[3].unwrap()].text, "]");
    }
}
