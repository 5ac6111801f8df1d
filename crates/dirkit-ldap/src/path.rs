//! Distinguished paths and their structural relationships.
//!
//! A [`DirectoryPath`] is a parsed distinguished name. The leftmost component is the
//! entry's own RDN; removing it yields the parent path. Moves and recursive deletes are
//! built on these relationships, so comparisons ignore attribute-name case and
//! surrounding whitespace the same way directory servers do.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use dirkit_core::Error as CoreError;

/// Errors raised while parsing a distinguished path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Nothing to parse.
    #[error("directory path cannot be empty")]
    Empty,
    /// A component is empty or lacks an `=`.
    #[error("malformed path component `{0}`")]
    MalformedComponent(String),
    /// A component has no attribute name before the `=`.
    #[error("path component `{0}` has no attribute name")]
    MissingAttribute(String),
    /// A component has no value after the `=`.
    #[error("path component for `{0}` has no value")]
    MissingValue(String),
    /// A backslash escape is cut short or is not valid hex.
    #[error("invalid escape sequence in `{0}`")]
    BadEscape(String),
}

impl From<PathError> for CoreError {
    fn from(err: PathError) -> Self {
        CoreError::InvalidPath(err.to_string())
    }
}

/// One `attribute=value` pair inside an RDN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ava {
    attribute: String,
    value: String,
}

impl Ava {
    /// Attribute type (e.g. `ou`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl PartialEq for Ava {
    fn eq(&self, other: &Self) -> bool {
        self.attribute.eq_ignore_ascii_case(&other.attribute)
            && self.value.eq_ignore_ascii_case(&other.value)
    }
}

impl Eq for Ava {}

/// Relative distinguished name: the leaf component naming an entry under its parent.
///
/// Multi-valued RDNs (`cn=a+uid=b`) keep every pair in written order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rdn {
    pairs: Vec<Ava>,
}

impl Rdn {
    /// Single-valued RDN.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            pairs: vec![Ava {
                attribute: attribute.into(),
                value: value.into(),
            }],
        }
    }

    /// All attribute/value pairs.
    #[must_use]
    pub fn pairs(&self) -> &[Ava] {
        &self.pairs
    }

    /// Value of the first pair whose attribute matches (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|ava| ava.attribute.eq_ignore_ascii_case(attribute))
            .map(Ava::value)
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ava) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}={}", ava.attribute, escape_value(&ava.value))?;
        }
        Ok(())
    }
}

/// Parsed distinguished path, leaf first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DirectoryPath {
    rdns: Vec<Rdn>,
}

impl DirectoryPath {
    /// Parses a distinguished path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] for empty input, missing `=`, empty attribute or value, and
    /// broken escapes.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PathError> {
        let input = trim_unescaped(input.as_ref());
        if input.is_empty() {
            return Err(PathError::Empty);
        }

        let mut rdns = Vec::new();
        for component in split_unescaped(input, ',') {
            let mut pairs = Vec::new();
            for pair in split_unescaped(component, '+') {
                pairs.push(parse_ava(pair)?);
            }
            rdns.push(Rdn { pairs });
        }
        Ok(Self { rdns })
    }

    /// Builds a path from already-parsed components, leaf first.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Empty`] when `rdns` is empty.
    pub fn from_rdns(rdns: Vec<Rdn>) -> Result<Self, PathError> {
        if rdns.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self { rdns })
    }

    /// Components, leaf first.
    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Number of components.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// The entry's own RDN.
    #[must_use]
    pub fn leaf(&self) -> &Rdn {
        &self.rdns[0]
    }

    /// The path with the leaf removed, or `None` for a single-component path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        (self.rdns.len() > 1).then(|| Self {
            rdns: self.rdns[1..].to_vec(),
        })
    }

    /// True iff `self` is an immediate child of `other`.
    #[must_use]
    pub fn is_child_of(&self, other: &Self) -> bool {
        self.rdns.len() == other.rdns.len() + 1 && self.rdns[1..] == other.rdns[..]
    }

    /// True iff `self` sits anywhere below `other`.
    #[must_use]
    pub fn is_descendant_of(&self, other: &Self) -> bool {
        self.rdns.len() > other.rdns.len()
            && self.rdns[self.rdns.len() - other.rdns.len()..] == other.rdns[..]
    }

    /// Path of an entry named `rdn` directly under `self`.
    #[must_use]
    pub fn child(&self, rdn: Rdn) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// Path the entry would have after being moved under `new_parent`.
    #[must_use]
    pub fn reparented(&self, new_parent: &Self) -> Self {
        new_parent.child(self.leaf().clone())
    }
}

impl fmt::Display for DirectoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{rdn}")?;
        }
        Ok(())
    }
}

impl FromStr for DirectoryPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DirectoryPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DirectoryPath> for String {
    fn from(path: DirectoryPath) -> Self {
        path.to_string()
    }
}

/// Splits on `delimiter` outside backslash escapes. Escapes are left in place.
fn split_unescaped(input: &str, delimiter: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, ch) in input.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c == delimiter => {
                parts.push(&input[start..i]);
                start = i + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Trims surrounding whitespace, keeping a trailing space escaped with a backslash.
fn trim_unescaped(input: &str) -> &str {
    let start = input.trim_start();
    let end = start.trim_end();
    let backslashes = end.bytes().rev().take_while(|b| *b == b'\\').count();
    if backslashes % 2 == 1 && end.len() < start.len() {
        let kept = start[end.len()..].chars().next().map_or(0, char::len_utf8);
        &start[..end.len() + kept]
    } else {
        end
    }
}

fn parse_ava(raw: &str) -> Result<Ava, PathError> {
    let trimmed = trim_unescaped(raw);
    let (attribute, value) = trimmed
        .split_once('=')
        .ok_or_else(|| PathError::MalformedComponent(trimmed.to_string()))?;
    let attribute = attribute.trim();
    let value = trim_unescaped(value);
    if attribute.is_empty() {
        return Err(PathError::MissingAttribute(trimmed.to_string()));
    }
    if value.is_empty() {
        return Err(PathError::MissingValue(attribute.to_string()));
    }
    Ok(Ava {
        attribute: attribute.to_string(),
        value: unescape_value(value)?,
    })
}

/// Decodes `\c` and `\hh` escapes (RFC 4514).
fn unescape_value(value: &str) -> Result<String, PathError> {
    let bad = || PathError::BadEscape(value.to_string());
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let first = chars.next().ok_or_else(bad)?;
        if first.is_ascii_hexdigit() && chars.peek().is_some_and(char::is_ascii_hexdigit) {
            let second = chars.next().ok_or_else(bad)?;
            let hex = [first, second].iter().collect::<String>();
            bytes.push(u8::from_str_radix(&hex, 16).map_err(|_| bad())?);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
        }
    }
    String::from_utf8(bytes).map_err(|_| bad())
}

fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut out = String::with_capacity(value.len());
    for (i, ch) in value.chars().enumerate() {
        let special = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (i == 0 && matches!(ch, ' ' | '#'))
            || (i == last && ch == ' ');
        if special {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
