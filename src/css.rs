//! CSS parse/merge/emit engine.
//!
//! A pragmatic stylesheet model, sufficient to merge the stylesheets of a
//! page and all of its blocks into one file. It is not a CSS parser: there is
//! no tokenizer, no selector grammar and no value validation.
//!
//! # Model
//!
//! A [`Stylesheet`] has three ordered buckets, emitted in this order:
//!
//! | Bucket | Contents |
//! |--------|----------|
//! | top | `@charset`, `@import`, `@font-face` groups |
//! | main | plain rules: `selector → declarations` |
//! | bottom | other at-rule groups (`@media`, `@supports`, ...) keyed by their full prelude |
//!
//! A rule body is either a flat declaration list or, for at-rule groups
//! whose body holds further rules, a nested [`Stylesheet`].
//!
//! Repeated declarations of one property inside a selector (vendor fallbacks
//! such as `display:-webkit-flex; display:flex`) are kept as an ordered list
//! of values and emitted in that order.
//!
//! `@font-face` groups are keyed by a hash of their body, so two distinct
//! font faces never collapse into one.

use crate::fingerprint::hash_str;
use regex::Regex;
use std::sync::LazyLock;

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)(@import|@charset)(.*?);").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Property name and its values in source order (more than one for fallbacks).
pub type Declaration = (String, Vec<String>);

/// Body of a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Declarations(Vec<Declaration>),
    Nested(Stylesheet),
}

/// One keyed entry of a bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// `@charset <value>;`
    Charset(String),
    /// An `@import ...;` statement; the key is the full statement.
    Import,
    Rule { selector: String, body: Body },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stylesheet {
    top: Vec<(String, Entry)>,
    main: Vec<(String, Entry)>,
    bottom: Vec<(String, Entry)>,
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

impl Stylesheet {
    /// Parse stylesheet text. Returns `None` if nothing usable was found.
    pub fn parse(source: &str) -> Option<Self> {
        let source = COMMENT.replace_all(source, "");
        parse_rules(&source)
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_empty() && self.main.is_empty() && self.bottom.is_empty()
    }

    /// Plain-rule selectors in order.
    pub fn selectors(&self) -> Vec<&str> {
        self.main
            .iter()
            .filter_map(|(_, e)| match e {
                Entry::Rule { selector, .. } => Some(selector.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Declarations of a plain rule.
    pub fn declarations(&self, selector: &str) -> Option<&[Declaration]> {
        self.main.iter().find_map(|(k, e)| match e {
            Entry::Rule {
                body: Body::Declarations(d),
                ..
            } if k == selector => Some(d.as_slice()),
            _ => None,
        })
    }

    /// Nested group in the bottom bucket, keyed by its full prelude.
    pub fn group(&self, prelude: &str) -> Option<&Stylesheet> {
        self.bottom.iter().find_map(|(k, e)| match e {
            Entry::Rule {
                body: Body::Nested(s),
                ..
            } if k == prelude => Some(s),
            _ => None,
        })
    }

    /// Merge `other` into `self`, bucket by bucket.
    ///
    /// Matching keys merge recursively: nested groups merge as stylesheets,
    /// declaration lists merge per property. A property that holds several
    /// values on both sides gets the union of the lists; otherwise the
    /// incoming value replaces the existing one.
    pub fn merge(&mut self, other: Stylesheet) {
        merge_bucket(&mut self.top, other.top);
        merge_bucket(&mut self.main, other.main);
        merge_bucket(&mut self.bottom, other.bottom);
    }

    /// Serialize without any whitespace between rules.
    pub fn to_css(&self) -> String {
        let mut out = String::new();
        self.write_css(&mut out);
        out
    }

    fn write_css(&self, out: &mut String) {
        // @charset must come first and @import before any rule.
        for (key, entry) in &self.top {
            if let Entry::Charset(value) = entry {
                out.push_str(&format!("{key} {value};"));
            }
        }
        for (key, entry) in &self.top {
            if let Entry::Import = entry {
                out.push_str(&format!("{key};"));
            }
        }
        for (_, entry) in &self.top {
            if let Entry::Rule { .. } = entry {
                write_entry(entry, out);
            }
        }
        for (_, entry) in self.main.iter().chain(&self.bottom) {
            write_entry(entry, out);
        }
    }

    /// Pull `@import`/`@charset` statements out of `text` into the top
    /// bucket and return what is left.
    fn take_statements(&mut self, text: &str) -> String {
        let mut found = Vec::new();
        for caps in STATEMENT.captures_iter(text) {
            let keyword = caps[1].to_ascii_lowercase();
            let rest = collapse_whitespace(&caps[2]);
            if keyword == "@charset" {
                found.push(("@charset".to_string(), Entry::Charset(rest)));
            } else {
                found.push((format!("@import {rest}"), Entry::Import));
            }
        }
        merge_bucket(&mut self.top, found);
        STATEMENT.replace_all(text, "").into_owned()
    }

    fn insert_rule(&mut self, selector: String, body: Body) {
        let lower = selector.to_ascii_lowercase();
        let (bucket, key) = if lower.starts_with("@font-face") {
            (&mut self.top, format!("{selector}#{}", hash_str(&format!("{body:?}"))))
        } else if lower.starts_with('@') {
            (&mut self.bottom, selector.clone())
        } else {
            (&mut self.main, selector.clone())
        };
        merge_bucket(bucket, vec![(key, Entry::Rule { selector, body })]);
    }
}

fn write_entry(entry: &Entry, out: &mut String) {
    let Entry::Rule { selector, body } = entry else {
        return;
    };
    out.push_str(selector);
    out.push('{');
    match body {
        Body::Declarations(declarations) => {
            for (property, values) in declarations {
                for value in values {
                    out.push_str(&format!("{property}:{value};"));
                }
            }
        }
        Body::Nested(sheet) => sheet.write_css(out),
    }
    out.push('}');
}

fn merge_bucket(into: &mut Vec<(String, Entry)>, from: Vec<(String, Entry)>) {
    for (key, incoming) in from {
        match into.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => merge_entry(existing, incoming),
            None => into.push((key, incoming)),
        }
    }
}

fn merge_entry(existing: &mut Entry, incoming: Entry) {
    match (existing, incoming) {
        (
            Entry::Rule {
                body: Body::Declarations(have),
                ..
            },
            Entry::Rule {
                body: Body::Declarations(add),
                ..
            },
        ) => merge_declarations(have, add),
        (
            Entry::Rule {
                body: Body::Nested(have),
                ..
            },
            Entry::Rule {
                body: Body::Nested(add),
                ..
            },
        ) => have.merge(add),
        (existing, incoming) => *existing = incoming,
    }
}

fn merge_declarations(have: &mut Vec<Declaration>, add: Vec<Declaration>) {
    for (property, values) in add {
        match have.iter_mut().find(|(p, _)| *p == property) {
            Some((_, current)) if current.len() > 1 && values.len() > 1 => {
                for value in values {
                    if !current.contains(&value) {
                        current.push(value);
                    }
                }
            }
            Some((_, current)) => *current = values,
            None => have.push((property, values)),
        }
    }
}

/// Byte offset of the first `{` at or after `from`, outside string literals.
fn find_open(bytes: &[u8], from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Byte offset of the `}` closing the brace at `open`.
fn find_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Parse a sequence of `prelude { body }` blocks and loose statements.
fn parse_rules(text: &str) -> Option<Stylesheet> {
    let bytes = text.as_bytes();
    let mut sheet = Stylesheet::default();
    let mut rest = String::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let Some(open) = find_open(bytes, pos) else {
            rest.push_str(&text[pos..]);
            break;
        };
        let Some(close) = find_close(bytes, open) else {
            rest.push_str(&text[pos..]);
            break;
        };
        let prelude = sheet.take_statements(&text[pos..open]);
        let inner = &text[open + 1..close];
        pos = close + 1;

        let selector = collapse_whitespace(&prelude);
        if selector.is_empty() {
            continue;
        }
        let body = match parse_rules(inner) {
            Some(nested) => Body::Nested(nested),
            None => {
                let declarations = parse_declarations(inner);
                if declarations.is_empty() {
                    continue;
                }
                Body::Declarations(declarations)
            }
        };
        sheet.insert_rule(selector, body);
    }

    // Statements after the last block, or in a file without blocks.
    sheet.take_statements(&rest);

    (!sheet.is_empty()).then_some(sheet)
}

/// Split a rule body on `;` outside string literals and parentheses, so
/// `url(data:...;base64,...)` and `content:"a;b"` stay whole.
fn split_declarations(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut parts = Vec::new();
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b';' if depth == 0 => {
                    parts.push(&body[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    parts.push(&body[start..]);
    parts
}

fn is_property(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

fn parse_declarations(body: &str) -> Vec<Declaration> {
    let mut declarations: Vec<Declaration> = Vec::new();
    for part in split_declarations(body) {
        let Some((property, value)) = part.split_once(':') else {
            continue;
        };
        let property = property.trim();
        let value = collapse_whitespace(value);
        if !is_property(property) || value.is_empty() {
            continue;
        }
        match declarations.iter_mut().find(|(p, _)| p == property) {
            Some((_, values)) => values.push(value),
            None => declarations.push((property.to_string(), vec![value])),
        }
    }
    declarations
}

/// Parse, merge and serialize several stylesheet texts in order.
///
/// Sources that contain nothing usable are skipped.
pub fn merge_sources<S: AsRef<str>>(sources: &[S]) -> String {
    let mut merged = Stylesheet::default();
    for source in sources {
        if let Some(sheet) = Stylesheet::parse(source.as_ref()) {
            merged.merge(sheet);
        }
    }
    merged.to_css()
}
