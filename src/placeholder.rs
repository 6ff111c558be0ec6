//! Scanner for printf-style named placeholders (`%(key)s`).
//!
//! A template is split into literal text, escaped percents (`%%`) and
//! placeholders in a single pass. Any other `%` sequence is rejected with
//! [`Error::TemplateSyntax`] carrying the byte offset of the offending `%`.

use std::collections::BTreeSet;
use std::fmt;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    /// `%%`, kept verbatim until the template is rendered for a driver.
    Percent,
    Placeholder(&'a str),
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Text(text) => f.write_str(text),
            Segment::Percent => f.write_str("%%"),
            Segment::Placeholder(key) => write!(f, "%({})s", key),
        }
    }
}

/// Formats `key` as its own placeholder text.
pub fn placeholder(key: &str) -> String {
    format!("%({})s", key)
}

/// Splits `sql` into segments.
pub fn parse(sql: &str) -> Result<Vec<Segment<'_>>, Error> {
    let bytes = sql.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        if text_start < i {
            segments.push(Segment::Text(&sql[text_start..i]));
        }
        match bytes.get(i + 1) {
            Some(b'%') => {
                segments.push(Segment::Percent);
                i += 2;
            }
            Some(b'(') => {
                let key_start = i + 2;
                let key_end = find_key_end(bytes, key_start)
                    .ok_or_else(|| Error::syntax(i, "incomplete format key"))?;
                if key_end == key_start {
                    return Err(Error::syntax(i, "empty format key"));
                }
                match bytes.get(key_end + 1) {
                    Some(b's') => {}
                    Some(_) => {
                        let c = sql[key_end + 1..].chars().next().unwrap_or_default();
                        return Err(Error::syntax(
                            i,
                            format!("unsupported format character '{}'", c),
                        ));
                    }
                    None => return Err(Error::syntax(i, "incomplete format")),
                }
                segments.push(Segment::Placeholder(&sql[key_start..key_end]));
                i = key_end + 2;
            }
            Some(_) => {
                let c = sql[i + 1..].chars().next().unwrap_or_default();
                return Err(Error::syntax(
                    i,
                    format!("unsupported format character '{}'", c),
                ));
            }
            None => return Err(Error::syntax(i, "incomplete format")),
        }
        text_start = i;
    }
    if text_start < bytes.len() {
        segments.push(Segment::Text(&sql[text_start..]));
    }
    Ok(segments)
}

// Keys may contain balanced parentheses, as in printf mapping keys.
fn find_key_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (offset, b) in bytes[start..].iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Returns every distinct placeholder key referenced by `sql`.
pub fn param_keys(sql: &str) -> Result<BTreeSet<String>, Error> {
    Ok(parse(sql)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder(key) => Some(key.to_string()),
            _ => None,
        })
        .collect())
}

/// Rebuilds the template, replacing each placeholder for which `replace`
/// returns `Some`. Everything else is written back verbatim.
pub(crate) fn replace_placeholders<'a, F, R>(segments: &[Segment<'a>], mut replace: F) -> String
where
    F: FnMut(&'a str) -> Option<R>,
    R: AsRef<str>,
{
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Placeholder(key) => match replace(*key) {
                Some(text) => out.push_str(text.as_ref()),
                None => out.push_str(&placeholder(key)),
            },
            Segment::Text(text) => out.push_str(text),
            Segment::Percent => out.push_str("%%"),
        }
    }
    out
}
