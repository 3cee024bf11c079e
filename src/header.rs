//! Parsing of `Content-Type`-style header values
//!
//! Handles the `value; key=value; key="quoted; value"` shape shared by
//! `Content-Type` and `Link` headers.

use std::collections::HashMap;

/// A header value split into its main token and its parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedHeader {
    /// The leading value, e.g. `text/html` or `<https://example.com/>`
    pub value: String,

    /// Parameters keyed by lower-cased name, with quoting removed
    pub params: HashMap<String, String>,
}

impl ParsedHeader {
    /// Get a parameter by (lower-case) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// The main value lower-cased, for comparing media types.
    pub fn media_type(&self) -> String {
        self.value.to_ascii_lowercase()
    }
}

/// Parse a header value of the form `value; key=value; key="value"`.
///
/// Semicolons inside quoted strings do not split parameters. Parameters
/// without an `=` are ignored.
///
/// # Example
/// ```
/// use webpage_embed::parse_header;
///
/// let header = parse_header(r#"text/html; charset="UTF-8""#);
/// assert_eq!(header.value, "text/html");
/// assert_eq!(header.param("charset"), Some("UTF-8"));
/// ```
pub fn parse_header(line: &str) -> ParsedHeader {
    let mut parts = split_params(line).into_iter();
    let value = parts.next().unwrap_or_default().to_string();

    let params = parts
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            Some((name.trim().to_ascii_lowercase(), unquote(value.trim())))
        })
        .collect();

    ParsedHeader { value, params }
}

/// Split on `;` outside of quoted strings, trimming each field.
fn split_params(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                fields.push(line[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(line[start..].trim());
    fields
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1]
            .replace("\\\\", "\\")
            .replace("\\\"", "\"")
    } else {
        value.to_string()
    }
}
