//! JavaScript whitespace and comment minifier.
//!
//! Not a parser. The pipeline is:
//!
//! 1. strip `/* ... */` comments
//! 2. lift string literals (`"..."`, `'...'`, `` `...` ``) out into numbered
//!    placeholders and strip `//` line comments in the same pass
//! 3. fail if a quote character is left over (unterminated literal)
//! 4. drop whitespace
//! 5. put the literals back, with their inner whitespace collapsed
//!
//! Whitespace between two identifier characters cannot be dropped
//! (`var x`, `return a`); such a run becomes a single space, or a newline if
//! the run contained one, so statements relying on line breaks keep working.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const QUOTES: [char; 3] = ['"', '\'', '`'];

#[derive(Error, Debug, PartialEq)]
pub enum MinifyError {
    #[error("unmatched quote in script near: {line}")]
    UnmatchedQuote { line: String },
}

/// Minify one script.
pub fn minify(source: &str) -> Result<String, MinifyError> {
    let source = BLOCK_COMMENT.replace_all(source, "");
    let (code, literals) = lift_literals(&source);

    if let Some(line) = code.lines().find(|l| l.contains(QUOTES)) {
        let line = restore(line, &literals);
        return Err(MinifyError::UnmatchedQuote {
            line: WHITESPACE.replace_all(line.trim(), " ").into_owned(),
        });
    }

    let code = strip_whitespace(&code);
    Ok(restore(&code, &literals))
}

/// Replace every string literal with a placeholder and drop line comments.
///
/// An opening quote without a closing one is left in the text.
fn lift_literals(source: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = source.chars().collect();
    let mut code = String::with_capacity(source.len());
    let mut literals = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' && chars[i] != '\r' {
                i += 1;
            }
            continue;
        }
        if QUOTES.contains(&c) {
            if let Some(end) = closing_quote(&chars, i) {
                code.push_str(&format!("\u{E000}{}\u{E001}", literals.len()));
                literals.push(chars[i..=end].iter().collect());
                i = end + 1;
                continue;
            }
        }
        code.push(c);
        i += 1;
    }
    (code, literals)
}

/// Index of the quote closing the literal opened at `start`.
fn closing_quote(chars: &[char], start: usize) -> Option<usize> {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return Some(i),
            // Plain quotes do not span lines.
            '\n' if quote != '`' => return None,
            _ => i += 1,
        }
    }
    None
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn strip_whitespace(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut last = 0;
    for run in WHITESPACE.find_iter(code) {
        out.push_str(&code[last..run.start()]);
        last = run.end();

        let before = code[..run.start()].chars().next_back();
        let after = code[run.end()..].chars().next();
        if let (Some(b), Some(a)) = (before, after) {
            let glued = (is_word(b) && is_word(a)) || (b == a && (b == '+' || b == '-'));
            if glued {
                out.push(if run.as_str().contains('\n') { '\n' } else { ' ' });
            }
        }
    }
    out.push_str(&code[last..]);
    out
}

fn restore(code: &str, literals: &[String]) -> String {
    PLACEHOLDER
        .replace_all(code, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|k| literals.get(k))
                .map(|lit| WHITESPACE.replace_all(lit, " ").into_owned())
                .unwrap_or_default()
        })
        .into_owned()
}
