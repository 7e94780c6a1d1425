//! Mixin injection: add a class token to matching elements of a template.
//!
//! A [`Mixin`] selects elements by any combination of tag name, `id` and
//! `class` (whole token). Matching is a text-level scan over opening tags,
//! not a DOM: attributes are read from the tag text with simple patterns.
//!
//! ```text
//! {"tag": "ul", "class": "menu", "mixin": "menu--dark"}
//!
//! <ul class="menu">      →  <ul class="menu menu--dark">
//! <ul class="menu-item"> →  unchanged (class is not a whole-token match)
//! <ul id="x">            →  unchanged
//! ```

use crate::config::Mixin;
use regex::Regex;
use std::sync::LazyLock;

static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*([a-zA-Z][a-zA-Z0-9-]*)\b[^>]*>").unwrap());
static CLASS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\sclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static ID_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\sid\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

/// Value of an attribute and the byte offset where its value ends.
fn attribute(pattern: &Regex, tag: &str) -> Option<(String, usize)> {
    let caps = pattern.captures(tag)?;
    let value = caps.get(1).or_else(|| caps.get(2))?;
    Some((value.as_str().to_string(), value.end()))
}

fn has_class(classes: &str, token: &str) -> bool {
    classes.split_whitespace().any(|c| c == token)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// True if the opening tag `tag` named `name` is selected by `mixin`.
fn selects(mixin: &Mixin, name: &str, tag: &str) -> bool {
    if let Some(want) = non_empty(&mixin.tag) {
        if !name.eq_ignore_ascii_case(want) {
            return false;
        }
    }
    if let Some(want) = non_empty(&mixin.id) {
        match attribute(&ID_ATTR, tag) {
            Some((id, _)) if id.trim() == want => {}
            _ => return false,
        }
    }
    if let Some(want) = non_empty(&mixin.class) {
        match attribute(&CLASS_ATTR, tag) {
            Some((classes, _)) if has_class(&classes, want) => {}
            _ => return false,
        }
    }
    true
}

/// Add `token` to the class attribute of an opening tag.
///
/// Returns `None` if the token is already present.
fn inject(tag: &str, token: &str) -> Option<String> {
    match attribute(&CLASS_ATTR, tag) {
        Some((classes, _)) if has_class(&classes, token) => None,
        Some((classes, end)) => {
            let sep = if classes.trim().is_empty() { "" } else { " " };
            Some(format!("{}{sep}{token}{}", &tag[..end], &tag[end..]))
        }
        None => {
            let close = if tag.ends_with("/>") { tag.len() - 2 } else { tag.len() - 1 };
            let at = tag[..close].trim_end().len();
            Some(format!("{} class=\"{token}\"{}", &tag[..at], &tag[at..]))
        }
    }
}

/// Apply one mixin. Returns the new text and whether any element changed.
fn apply_one(template: &str, mixin: &Mixin) -> (String, bool) {
    let token = mixin.mixin.trim();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    let mut changed = false;

    for caps in OPEN_TAG.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !selects(mixin, name.as_str(), whole.as_str()) {
            continue;
        }
        if let Some(rewritten) = inject(whole.as_str(), token) {
            out.push_str(&template[last..whole.start()]);
            out.push_str(&rewritten);
            last = whole.end();
            changed = true;
        }
    }
    out.push_str(&template[last..]);
    (out, changed)
}

/// Apply `mixins` in order to `template`.
///
/// Returns the rewritten template and the mixins that modified at least one
/// element.
pub fn apply_mixins(template: &str, mixins: &[Mixin]) -> (String, Vec<Mixin>) {
    let mut text = template.to_string();
    let mut used = Vec::new();
    for mixin in mixins {
        let (next, changed) = apply_one(&text, mixin);
        text = next;
        if changed && !used.contains(mixin) {
            used.push(mixin.clone());
        }
    }
    (text, used)
}

/// Mixin set handed down to dependencies: a block's own mixins first, then
/// inherited ones not already present.
pub fn merge_mixins(inherited: &[Mixin], own: &[Mixin]) -> Vec<Mixin> {
    let mut merged: Vec<Mixin> = Vec::with_capacity(own.len() + inherited.len());
    for mixin in own.iter().chain(inherited) {
        if !merged.contains(mixin) {
            merged.push(mixin.clone());
        }
    }
    merged
}
