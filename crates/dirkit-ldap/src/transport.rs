//! Protocol seam between sessions and the wire.
//!
//! A [`Connector`] opens connections and a [`DirectoryTransport`] issues single protocol
//! requests on one of them. Transports report dispatch failures as `Err` and hand every
//! server answer back as a [`Reply`], including non-success statuses; interpreting those
//! statuses (busy retries, upsert redirects) is the session's job.

use crate::config::TransportOptions;
use crate::Result;
use async_trait::async_trait;
use dirkit_core::ResultCode;

/// Protocol version every connection uses.
pub const PROTOCOL_VERSION: u8 = 3;

/// Attribute selector meaning "all user attributes".
pub const ALL_ATTRIBUTES: &str = "*";

/// Attribute selector meaning "no attributes, entry names only".
pub const NO_ATTRIBUTES: &str = "1.1";

/// Filter matching every entry.
pub const MATCH_ALL_FILTER: &str = "(objectClass=*)";

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

/// Entry exactly as the transport decoded it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    /// Distinguished path of the entry.
    pub dn: String,
    /// UTF-8 attributes in delivery order.
    pub attrs: Vec<(String, Vec<String>)>,
    /// Attributes with values that are not valid UTF-8.
    pub bin_attrs: Vec<(String, Vec<Vec<u8>>)>,
}

/// Replace `attribute` with `values`; an empty `values` removes the attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    /// Attribute name.
    pub attribute: String,
    /// Replacement values.
    pub values: Vec<Vec<u8>>,
}

/// Server answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply<T> {
    /// Result code.
    pub status: ResultCode,
    /// Matched path reported by the server (may be empty).
    pub matched: String,
    /// Diagnostic message (may be empty).
    pub message: String,
    /// Referral URIs.
    pub referrals: Vec<String>,
    /// Operation-specific payload; meaningful on success.
    pub payload: T,
}

impl<T> Reply<T> {
    /// Successful reply carrying `payload`.
    pub fn success(payload: T) -> Self {
        Self {
            status: ResultCode::Success,
            matched: String::new(),
            message: String::new(),
            referrals: Vec::new(),
            payload,
        }
    }
}

impl<T: Default> Reply<T> {
    /// Reply with `status`, a diagnostic message and an empty payload.
    pub fn status(status: ResultCode, message: impl Into<String>) -> Self {
        Self {
            status,
            matched: String::new(),
            message: message.into(),
            referrals: Vec::new(),
            payload: T::default(),
        }
    }
}

/// One live directory connection.
///
/// `add` and `modify` request the post-write entry state; their payload is that entry
/// when the server returned it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryTransport: Send {
    /// Simple bind; empty identity and secret bind anonymously.
    async fn simple_bind(&mut self, identity: &str, secret: &str) -> Result<Reply<()>>;

    /// Search below `base`.
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Reply<Vec<RawEntry>>>;

    /// Add an entry.
    ///
    /// Servers store attribute values as sets: duplicate values collapse and value order is
    /// not kept on write, even though records preserve both on read.
    async fn add(
        &mut self,
        path: &str,
        attributes: &[(String, Vec<Vec<u8>>)],
    ) -> Result<Reply<Option<RawEntry>>>;

    /// Apply replace operations to an entry. Replacement values are written as a set, like
    /// [`add`](Self::add).
    async fn modify(
        &mut self,
        path: &str,
        modifications: &[Modification],
    ) -> Result<Reply<Option<RawEntry>>>;

    /// Delete a leaf entry.
    async fn delete(&mut self, path: &str) -> Result<Reply<()>>;

    /// Rename `path` to `new_rdn` under `new_parent`.
    async fn rename(
        &mut self,
        path: &str,
        new_rdn: &str,
        new_parent: &str,
        delete_old_rdn: bool,
    ) -> Result<Reply<()>>;

    /// Unbind and drop the connection.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens transports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `uri` with the given pass-through options.
    ///
    /// Implementations report an unreachable server as
    /// [`Error::Connection`](dirkit_core::Error::Connection).
    async fn connect(
        &self,
        uri: &str,
        options: &TransportOptions,
    ) -> Result<Box<dyn DirectoryTransport>>;
}
