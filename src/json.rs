//! Pretty JSON output with HTML-sensitive characters escaped.
//!
//! `config.json` and `index.json` are both written through [`to_string_html_safe`].
//! Characters `<`, `>`, `&`, `'` and `"` inside strings become `\u003C`,
//! `\u003E`, `\u0026`, `\u0027` and `\u0022`, so the files can be embedded
//! in markup without further escaping. Any JSON parser reads them back unchanged.

use serde::Serialize;
use serde_json::ser::{CharEscape, Formatter, PrettyFormatter};
use std::io;

/// Pretty printer that escapes HTML-sensitive characters in strings.
struct HtmlSafeFormatter<'a> {
    inner: PrettyFormatter<'a>,
}

impl HtmlSafeFormatter<'_> {
    fn new() -> Self {
        Self {
            inner: PrettyFormatter::new(),
        }
    }
}

fn html_escape(c: char) -> Option<&'static [u8]> {
    match c {
        '<' => Some(b"\\u003C"),
        '>' => Some(b"\\u003E"),
        '&' => Some(b"\\u0026"),
        '\'' => Some(b"\\u0027"),
        _ => None,
    }
}

impl Formatter for HtmlSafeFormatter<'_> {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if let Some(escaped) = html_escape(c) {
                writer.write_all(&fragment.as_bytes()[start..i])?;
                writer.write_all(escaped)?;
                start = i + c.len_utf8();
            }
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }

    fn write_char_escape<W>(&mut self, writer: &mut W, char_escape: CharEscape) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        match char_escape {
            CharEscape::Quote => writer.write_all(b"\\u0022"),
            other => self.inner.write_char_escape(writer, other),
        }
    }

    fn begin_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_array(writer)
    }

    fn end_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_object(writer)
    }

    fn end_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_object_value(writer)
    }
}

/// Serialize `value` as pretty JSON with HTML-sensitive characters escaped.
pub fn to_string_html_safe<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, HtmlSafeFormatter::new());
    value.serialize(&mut ser)?;
    // The formatter only ever writes valid UTF-8.
    Ok(String::from_utf8(buf).unwrap_or_default())
}
