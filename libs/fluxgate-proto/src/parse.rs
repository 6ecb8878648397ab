//! Tag and field list parsing
//!
//! Both parsers take comma-separated `key=value` lists as typed by users
//! (after variable interpolation). Tags are parsed tolerantly; fields are
//! strict because a bad field turns the whole line into a rejected write.

use crate::error::{ProtoError, Result};
use crate::point::{parse_finite, FieldSet, FieldValue, TagSet};

/// Parse `k1=v1,k2=v2` into a tag set
///
/// Never fails: a pair without `=` becomes a tag with an empty value and
/// segments with an empty key are skipped. Only the first `=` splits, so
/// values may contain further `=` characters.
pub fn parse_tags(input: &str) -> TagSet {
    let mut tags = TagSet::new();

    for segment in input.split(',') {
        let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        tags.insert(key, value.trim());
    }

    tags
}

/// Parse a pre-formatted field list such as `a=1.5,b="x,y",c=true`
///
/// Value syntax:
/// - `"..."` string (`\"` and `\\` are unescaped)
/// - `true`/`false` (plus the short and capitalized forms) boolean
/// - `12i` signed and `12u` unsigned integer
/// - anything else must be a finite float
///
/// Whitespace is only allowed inside quoted values (and around the whole
/// list), since a validated list is sent to the server as written.
pub fn parse_fields(input: &str) -> Result<FieldSet> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ProtoError::EmptyFieldSet);
    }

    let mut fields = FieldSet::new();

    for segment in split_unquoted(input) {
        let Some((key, raw)) = segment.split_once('=') else {
            return Err(ProtoError::malformed(segment.trim(), "missing '='"));
        };

        if key.trim().is_empty() {
            return Err(ProtoError::malformed(segment.trim(), "empty field key"));
        }
        if has_whitespace(key) || (!raw.starts_with('"') && has_whitespace(raw)) {
            return Err(ProtoError::malformed(key.trim(), "unquoted whitespace"));
        }

        let value = parse_field_value(key, raw)?;
        fields.insert(key, value);
    }

    Ok(fields)
}

fn parse_field_value(key: &str, raw: &str) -> Result<FieldValue> {
    if raw.is_empty() {
        return Err(ProtoError::malformed(key, "empty field value"));
    }

    if let Some(body) = raw.strip_prefix('"') {
        return parse_quoted(key, body).map(FieldValue::String);
    }

    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => return Ok(FieldValue::Bool(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Ok(FieldValue::Bool(false)),
        _ => {},
    }

    if let Some(digits) = raw.strip_suffix('i') {
        return digits
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| ProtoError::malformed(key, format!("invalid integer literal '{raw}'")));
    }

    if let Some(digits) = raw.strip_suffix('u') {
        return digits
            .parse::<u64>()
            .map(FieldValue::UInteger)
            .map_err(|_| ProtoError::malformed(key, format!("invalid unsigned literal '{raw}'")));
    }

    parse_finite(key, raw)
        .map(FieldValue::Float)
        .map_err(|_| ProtoError::malformed(key, format!("invalid numeric literal '{raw}'")))
}

/// Unescape the body of a quoted value (opening quote already stripped)
fn parse_quoted(key: &str, body: &str) -> Result<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                },
                None => break,
            },
            '"' => {
                return if chars.as_str().is_empty() {
                    Ok(out)
                } else {
                    Err(ProtoError::malformed(
                        key,
                        "unexpected characters after closing quote",
                    ))
                };
            },
            _ => out.push(c),
        }
    }

    Err(ProtoError::malformed(key, "unterminated string value"))
}

fn has_whitespace(text: &str) -> bool {
    text.chars().any(char::is_whitespace)
}

/// Split on commas that are not inside a double-quoted value
fn split_unquoted(input: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                segments.push(&input[start..i]);
                start = i + 1;
            },
            _ => {},
        }
    }
    segments.push(&input[start..]);

    segments
}
