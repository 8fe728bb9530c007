//! Token-level JavaScript minifier
//!
//! Drops comments and whitespace without touching a single token, so the
//! output re-tokenizes to exactly the comment-free token stream of the input.
//! A line break survives only where automatic semicolon insertion could
//! depend on it.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::MinifyOptions;
use crate::js::{self, SyntaxError, Token, TokenKind};

/// Minify JavaScript source
pub fn minify(src: &str, options: &MinifyOptions) -> Result<String, SyntaxError> {
    let tokens = js::tokenize(src)?;
    let mut out = String::with_capacity(src.len() / 2);
    let mut prev: Option<&Token<'_>> = None;

    for tok in &tokens {
        if tok.is_comment() {
            if options.preserve_license && tok.kind == TokenKind::BlockComment && tok.text.starts_with("/*!") {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(tok.text);
                out.push('\n');
            }
            continue;
        }

        if let Some(p) = prev {
            if !out.ends_with('\n') {
                if needs_newline(p, tok) {
                    out.push('\n');
                } else if needs_space(p, tok) {
                    out.push(' ');
                }
            }
        }

        out.push_str(tok.text);
        prev = Some(tok);
    }

    Ok(out)
}

/// Keywords whose operand may not follow a line break
const RESTRICTED: &[&str] = &["return", "break", "continue", "throw", "yield"];

fn needs_newline(prev: &Token<'_>, next: &Token<'_>) -> bool {
    if !next.newline_before {
        return false;
    }
    if prev.kind == TokenKind::Keyword && RESTRICTED.contains(&prev.text) {
        return true;
    }
    prev.can_end_statement() && next.can_start_statement()
}

fn needs_space(prev: &Token<'_>, next: &Token<'_>) -> bool {
    let (Some(last), Some(first)) = (prev.text.chars().last(), next.text.chars().next()) else {
        return false;
    };

    let word = |c: char| js::is_ident_part(c) || c == '\\';
    if word(last) && word(first) {
        return true;
    }

    // a word right after a regex would read as its flags
    if prev.kind == TokenKind::Regex && word(first) {
        return true;
    }

    // `1 .toString()` must not become `1.toString()`
    if prev.kind == TokenKind::Number && first == '.' && !prev.text.contains(['.', 'e', 'E', 'x', 'X']) {
        return true;
    }

    // `a + +b`, `a - -b`, `a / /re/`
    matches!((last, first), ('+', '+') | ('-', '-') | ('/', '/') | ('/', '*'))
}

/// Size of `data` after gzip compression
pub fn gzip_size(data: &[u8]) -> std::io::Result<usize> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?.len())
}
