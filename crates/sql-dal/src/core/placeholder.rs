//! Named placeholder rewriting.
//!
//! Commands are written once with `@Name` placeholders. Each driver rewrites
//! them into its native positional form through [`Dialect::param_placeholder`]
//! and sends the values in placeholder order.
//!
//! String literals, quoted identifiers, comments and `@@system` variables are
//! copied through untouched. A placeholder with no matching parameter stays in
//! the text as written; the server reports it when the command runs.

use super::traits::{Dialect, Parameter};
use super::value::SqlValue;

/// Command text in native placeholder form, with values in binding order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// If a literal, quoted identifier or comment starts at `i`, the index just
/// past its end.
fn skip_opaque(bytes: &[u8], i: usize) -> Option<usize> {
    let close = match bytes[i] {
        b'\'' => b'\'',
        b'"' => b'"',
        b'`' => b'`',
        b'[' => b']',
        b'-' if bytes.get(i + 1) == Some(&b'-') => {
            let end = bytes[i..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |p| i + p + 1);
            return Some(end);
        }
        b'/' if bytes.get(i + 1) == Some(&b'*') => {
            let end = bytes[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(bytes.len(), |p| i + 2 + p + 2);
            return Some(end);
        }
        _ => return None,
    };

    let mut j = i + 1;
    while j < bytes.len() {
        if bytes[j] == close {
            // A doubled closer is an escaped one.
            if bytes.get(j + 1) == Some(&close) {
                j += 2;
                continue;
            }
            return Some(j + 1);
        }
        j += 1;
    }
    Some(bytes.len())
}

fn param_name(param: &Parameter) -> &str {
    param.name.trim_start_matches('@')
}

/// Rewrite `@Name` placeholders in `text` for `dialect`.
///
/// Parameter names match ASCII case-insensitively, with or without a
/// leading `@`; the first parameter of a given name wins. Parameters the text
/// never references are not sent.
pub fn rewrite(text: &str, params: &[Parameter], dialect: &dyn Dialect) -> BoundStatement {
    let bytes = text.as_bytes();
    let numbered = dialect.numbered_placeholders();

    let mut sql = String::with_capacity(text.len());
    let mut values = Vec::new();
    // Parameter index for each numbered slot already emitted.
    let mut slots: Vec<usize> = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i) {
            i = end;
            continue;
        }

        if bytes[i] != b'@' {
            i += 1;
            continue;
        }

        if bytes.get(i + 1) == Some(&b'@') {
            i += 2;
            while i < bytes.len() && is_ident_byte(bytes[i]) {
                i += 1;
            }
            continue;
        }

        let start = i + 1;
        let mut end = start;
        while end < bytes.len() && is_ident_byte(bytes[end]) {
            end += 1;
        }

        if end > start && !bytes[start].is_ascii_digit() {
            let name = &text[start..end];
            let found = params
                .iter()
                .position(|p| param_name(p).eq_ignore_ascii_case(name));

            if let Some(idx) = found {
                sql.push_str(&text[copied..i]);
                let placeholder = match slots.iter().position(|&s| s == idx) {
                    Some(slot) if numbered => dialect.param_placeholder(slot + 1),
                    _ => {
                        slots.push(idx);
                        values.push(params[idx].value.clone());
                        dialect.param_placeholder(values.len())
                    }
                };
                sql.push_str(&placeholder);
                copied = end;
            }
        }

        i = end;
    }

    sql.push_str(&text[copied..]);
    BoundStatement { sql, values }
}

/// Split a batch on top-level `;`, dropping empty statements.
pub fn split_statements(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = skip_opaque(bytes, i) {
            i = end;
            continue;
        }
        if bytes[i] == b';' {
            statements.push(&text[start..i]);
            start = i + 1;
        }
        i += 1;
    }
    statements.push(&text[start..]);

    statements
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Statements to send one round trip at a time for `dialect`.
///
/// Dialects that accept parameterized batches get the text back whole.
pub fn statements<'a>(text: &'a str, dialect: &dyn Dialect) -> Vec<&'a str> {
    if dialect.supports_multi_statement() {
        vec![text]
    } else {
        split_statements(text)
    }
}
