//! LDAP directory sessions for dirkit.
//!
//! This crate wraps a directory server connection in a [`DirectorySession`] that retries busy
//! replies, turns `add` and `modify` into convergent upserts, deletes whole subtrees and moves
//! entries between parents. Sessions are shared per server URI through a [`SessionRegistry`].
//!
//! ```no_run
//! # async fn run() -> dirkit_ldap::Result<()> {
//! use dirkit_ldap::{AttributeChanges, SessionOptions, SessionRegistry};
//!
//! let registry = SessionRegistry::ldap3();
//! let options = SessionOptions::new().with_bind("cn=admin,dc=example,dc=com", "secret");
//! let session = registry.get("ldap://localhost:389", &options).await?;
//!
//! let changes = AttributeChanges::new()
//!     .replace("objectClass", ["top", "organizationalUnit"])
//!     .set("ou", "people");
//! let record = session.add("ou=people,dc=example,dc=com", &changes).await?;
//! println!("{:?}", record.first("ou"));
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod backend;
mod changes;
mod config;
mod path;
mod record;
mod registry;
mod session;
mod transport;

pub use backend::Ldap3Connector;
pub use changes::{AttributeChange, AttributeChanges, ChangeOp};
pub use config::{
    SessionOptions, TransportOptions, DEFAULT_CONNECTION_TIMEOUT_SECS,
    DEFAULT_OPERATION_TIMEOUT_SECS,
};
pub use dirkit_core::retry::BusyRetryPolicy;
pub use dirkit_core::{Error, ResultCode};
pub use path::{Ava, DirectoryPath, PathError, Rdn};
pub use record::{AttributeValue, Record, Records, DN_KEY};
pub use registry::SessionRegistry;
pub use session::DirectorySession;
pub use transport::{
    Connector, DirectoryTransport, Modification, RawEntry, Reply, SearchScope, ALL_ATTRIBUTES,
    MATCH_ALL_FILTER, NO_ATTRIBUTES, PROTOCOL_VERSION,
};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirkit_core::Result<T>;
