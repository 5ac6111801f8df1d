//! Caller-built write instructions for `add` and `modify`.

use crate::record::{AttributeValue, Record};
use crate::transport::Modification;

/// What to do with one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    /// Replace every value of the attribute with the supplied ones.
    Replace,
    /// Remove the attribute entirely.
    Delete,
}

/// One attribute instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    /// Attribute name.
    pub attribute: String,
    /// Operation to apply.
    pub operation: ChangeOp,
    /// Values for [`ChangeOp::Replace`]; ignored for deletes.
    pub values: Vec<AttributeValue>,
}

impl AttributeChange {
    /// Replace `attribute` with `values`.
    pub fn replace<T: Into<AttributeValue>>(
        attribute: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            operation: ChangeOp::Replace,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Remove `attribute`.
    pub fn delete(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operation: ChangeOp::Delete,
            values: Vec::new(),
        }
    }

    /// A replace with no values removes the attribute just like a delete.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.operation == ChangeOp::Delete || self.values.is_empty()
    }
}

/// Ordered list of attribute instructions.
///
/// ```
/// use dirkit_ldap::AttributeChanges;
///
/// let changes = AttributeChanges::new()
///     .set("cn", "Jane")
///     .replace("mail", ["jane@example.com", "j@example.com"])
///     .delete("description");
/// assert_eq!(changes.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeChanges {
    changes: Vec<AttributeChange>,
}

impl AttributeChanges {
    /// Empty change list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a replace of `attribute` with `values`.
    #[must_use]
    pub fn replace<T: Into<AttributeValue>>(
        mut self,
        attribute: impl Into<String>,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.changes.push(AttributeChange::replace(attribute, values));
        self
    }

    /// Appends a replace of `attribute` with a single value.
    #[must_use]
    pub fn set(self, attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.replace(attribute, [value.into()])
    }

    /// Appends a removal of `attribute`.
    #[must_use]
    pub fn delete(mut self, attribute: impl Into<String>) -> Self {
        self.changes.push(AttributeChange::delete(attribute));
        self
    }

    /// Appends an already-built instruction.
    pub fn push(&mut self, change: AttributeChange) {
        self.changes.push(change);
    }

    /// Reads key/value input that uses name markers: a leading `-` or an empty value set
    /// removes the attribute, a leading `+` is stripped, anything else replaces.
    pub fn from_marked_pairs<I, K, V, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoIterator<Item = T>,
        T: Into<AttributeValue>,
    {
        let mut changes = Self::new();
        for (name, values) in pairs {
            let name = name.as_ref();
            let (deleting, attribute) = match name.chars().next() {
                Some('-') => (true, &name[1..]),
                Some('+') => (false, &name[1..]),
                _ => (false, name),
            };
            let change = AttributeChange::replace(attribute, values);
            if deleting || change.values.is_empty() {
                changes.push(AttributeChange::delete(attribute));
            } else {
                changes.push(change);
            }
        }
        changes
    }

    /// Instructions in order.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeChange> + '_ {
        self.changes.iter()
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true when there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Per-attribute replace operations for a modify request. Removals become replaces with
    /// no values, which servers accept whether or not the attribute exists.
    pub(crate) fn to_modifications(&self) -> Vec<Modification> {
        self.changes
            .iter()
            .map(|change| Modification {
                attribute: change.attribute.clone(),
                values: if change.is_removal() {
                    Vec::new()
                } else {
                    change.values.iter().map(|v| v.as_bytes().to_vec()).collect()
                },
            })
            .collect()
    }

    /// Attribute set for an add request: removals are dropped and repeated names merge.
    pub(crate) fn to_creation_attributes(&self) -> Vec<(String, Vec<Vec<u8>>)> {
        let mut attributes: Vec<(String, Vec<Vec<u8>>)> = Vec::new();
        for change in &self.changes {
            let slot = attributes
                .iter()
                .position(|(name, _)| name.eq_ignore_ascii_case(&change.attribute));
            if change.is_removal() {
                if let Some(index) = slot {
                    attributes.remove(index);
                }
                continue;
            }
            let values = change.values.iter().map(|v| v.as_bytes().to_vec());
            match slot {
                Some(index) => attributes[index].1 = values.collect(),
                None => attributes.push((change.attribute.clone(), values.collect())),
            }
        }
        attributes
    }
}

impl From<&Record> for AttributeChanges {
    /// Replace every attribute of `record` with its current values.
    fn from(record: &Record) -> Self {
        let mut changes = Self::new();
        for (name, values) in record.iter() {
            changes.push(AttributeChange::replace(name, values.iter().cloned()));
        }
        changes
    }
}

impl FromIterator<AttributeChange> for AttributeChanges {
    fn from_iter<I: IntoIterator<Item = AttributeChange>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}
