//! Uniform record shape for directory entries.

use crate::transport::RawEntry;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Reserved key holding the entry path when a record is serialized.
pub const DN_KEY: &str = "dn";

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// UTF-8 value.
    Text(String),
    /// Value the server returned as non-UTF-8 octets.
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Borrows the value as text, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// Borrows the raw octets.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Consumes the value into raw octets.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

/// Directory entry as returned to callers.
///
/// Attributes keep the order they arrived in (from the server or from caller input), and
/// each attribute keeps its values in order with duplicates preserved. Records have no
/// mutators: to change an entry, build new [`AttributeChanges`](crate::AttributeChanges)
/// and issue a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    dn: Option<String>,
    attributes: Vec<(String, Vec<AttributeValue>)>,
}

impl Record {
    /// Builds a record from caller key/value input. Repeated names are merged in order.
    pub fn from_pairs<I, K, V, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = T>,
        T: Into<AttributeValue>,
    {
        let mut record = Self::default();
        for (name, values) in pairs {
            record.push(name.into(), values.into_iter().map(Into::into));
        }
        record
    }

    /// Returns the same record carrying `dn`.
    #[must_use]
    pub fn with_dn(mut self, dn: impl Into<String>) -> Self {
        self.dn = Some(dn.into());
        self
    }

    pub(crate) fn from_raw(raw: RawEntry) -> Self {
        let mut record = Self {
            dn: Some(raw.dn),
            attributes: Vec::with_capacity(raw.attrs.len() + raw.bin_attrs.len()),
        };
        for (name, values) in raw.attrs {
            record.push(name, values.into_iter().map(AttributeValue::Text));
        }
        for (name, values) in raw.bin_attrs {
            record.push(name, values.into_iter().map(AttributeValue::Binary));
        }
        record
    }

    fn push(&mut self, name: String, values: impl Iterator<Item = AttributeValue>) {
        match self
            .attributes
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => existing.extend(values),
            None => self.attributes.push((name, values.collect())),
        }
    }

    /// The entry's distinguished path. Always present on records read from a server.
    #[must_use]
    pub fn dn(&self) -> Option<&str> {
        self.dn.as_deref()
    }

    /// All values of `attribute` (case-insensitive).
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[AttributeValue]> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
    }

    /// First value of `attribute` if it is text.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first())
            .and_then(AttributeValue::as_text)
    }

    /// Text values of `attribute`; binary values are skipped.
    #[must_use]
    pub fn texts(&self, attribute: &str) -> Vec<&str> {
        self.values(attribute)
            .map(|values| values.iter().filter_map(AttributeValue::as_text).collect())
            .unwrap_or_default()
    }

    /// Parses the attribute as boolean (`TRUE` / `true` / `1`).
    #[must_use]
    pub fn bool_value(&self, attribute: &str) -> bool {
        self.first(attribute)
            .is_some_and(|value| value.eq_ignore_ascii_case("true") || value == "1")
    }

    /// Returns true when the attribute is present.
    #[must_use]
    pub fn contains(&self, attribute: &str) -> bool {
        self.values(attribute).is_some()
    }

    /// Attribute names in order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.attributes.iter().map(|(name, _)| name.as_str())
    }

    /// `(name, values)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AttributeValue])> + '_ {
        self.attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of attributes (the path is not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true when the record has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.dn.is_some());
        let mut map = serializer.serialize_map(Some(self.attributes.len() + extra))?;
        if let Some(dn) = &self.dn {
            map.serialize_entry(DN_KEY, dn)?;
        }
        for (name, values) in &self.attributes {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

/// Single-pass sequence of records produced by `search` and `list`.
///
/// Each record is built from the next raw result entry only when it is pulled. The
/// sequence cannot be rewound; running the query again is the only way to see the
/// entries a second time.
#[derive(Debug)]
#[must_use = "records are produced lazily; iterate to consume them"]
pub struct Records {
    entries: std::vec::IntoIter<RawEntry>,
}

impl Records {
    pub(crate) fn new(entries: Vec<RawEntry>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl Iterator for Records {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.entries.next().map(Record::from_raw)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for Records {}
