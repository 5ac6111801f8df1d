//! Directory sessions.
//!
//! A [`DirectorySession`] owns one bound connection and exposes the operation set. Every
//! operation holds the connection lock for its whole duration, busy pauses and recursive
//! deletes included, so a session never has two requests in flight.

use crate::changes::AttributeChanges;
use crate::config::SessionOptions;
use crate::path::DirectoryPath;
use crate::record::{Record, Records};
use crate::transport::{
    Connector, DirectoryTransport, RawEntry, Reply, SearchScope, ALL_ATTRIBUTES,
    MATCH_ALL_FILTER, NO_ATTRIBUTES, PROTOCOL_VERSION,
};
use crate::Result;
use dirkit_core::retry::BusyRetryPolicy;
use dirkit_core::{Error, ResultCode};
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

type Transport = Box<dyn DirectoryTransport>;

/// Re-issues `$request` while the server answers busy, spending `$budget`.
macro_rules! until_not_busy {
    ($budget:expr, $request:expr) => {
        loop {
            let reply = $request.await?;
            if reply.status.is_busy() {
                $budget.wait().await?;
                continue;
            }
            break reply;
        }
    };
}

/// Which write the upsert machine issues next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpsertStep {
    Create,
    Reconcile,
}

impl UpsertStep {
    const fn operation(self) -> &'static str {
        match self {
            Self::Create => "add",
            Self::Reconcile => "modify",
        }
    }

    /// Status that sends this step over to the other one.
    const fn redirect_status(self) -> ResultCode {
        match self {
            Self::Create => ResultCode::EntryAlreadyExists,
            Self::Reconcile => ResultCode::NoSuchObject,
        }
    }

    const fn fallback(self) -> Self {
        match self {
            Self::Create => Self::Reconcile,
            Self::Reconcile => Self::Create,
        }
    }
}

/// One bound connection to a directory server.
pub struct DirectorySession {
    uri: String,
    identity: String,
    retry: BusyRetryPolicy,
    transport: Mutex<Option<Transport>>,
}

impl fmt::Debug for DirectorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySession")
            .field("uri", &self.uri)
            .field("identity", &self.identity)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl DirectorySession {
    /// Connects to `uri` and binds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid options or URI, [`Error::Connection`] when the
    /// server cannot be reached and [`Error::Bind`] when the bind is rejected.
    pub async fn connect(
        connector: &dyn Connector,
        uri: &str,
        options: &SessionOptions,
    ) -> Result<Self> {
        options.check()?;
        Url::parse(uri)
            .map_err(|err| Error::Config(format!("Invalid directory URI `{uri}`: {err}")))?;

        debug!(uri, protocol_version = PROTOCOL_VERSION, "connecting to directory server");
        let mut transport = connector.connect(uri, &options.transport).await?;

        let identity = options.bind_identity();
        let bind_error = |message: String| Error::Bind {
            uri: uri.to_string(),
            identity: identity.to_string(),
            message,
        };
        let rejection = match transport.simple_bind(identity, options.bind_secret()).await {
            Ok(reply) if reply.status.is_success() => None,
            Ok(reply) => Some(bind_error(format!("({}) {}", reply.status, reply.message))),
            Err(err) => Some(bind_error(err.to_string())),
        };
        if let Some(err) = rejection {
            if let Err(unbind_err) = transport.unbind().await {
                warn!(uri, error = %unbind_err, "unbind after failed bind failed");
            }
            return Err(err);
        }

        debug!(uri, identity, "bound to directory server");
        Ok(Self {
            uri: uri.to_string(),
            identity: identity.to_string(),
            retry: options.retry_policy(),
            transport: Mutex::new(Some(transport)),
        })
    }

    /// Server URI this session is bound to.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Identity used for the bind (empty for anonymous).
    #[must_use]
    pub fn bind_identity(&self) -> &str {
        &self.identity
    }

    /// Busy-retry policy applied to every operation except `move_entry`.
    #[must_use]
    pub const fn retry_policy(&self) -> BusyRetryPolicy {
        self.retry
    }

    /// Unbinds and drops the connection. Later operations fail with
    /// [`Error::SessionClosed`]. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates unbind failures; the session is closed regardless.
    pub async fn close(&self) -> Result<()> {
        let transport = self.transport.lock().await.take();
        match transport {
            Some(mut transport) => {
                info!(uri = %self.uri, "closing directory session");
                transport.unbind().await
            }
            None => Ok(()),
        }
    }

    /// Returns true once [`close`](Self::close) has run.
    pub async fn is_closed(&self) -> bool {
        self.transport.lock().await.is_none()
    }

    /// Subtree search below `base`. An empty `attributes` slice selects all attributes.
    ///
    /// A busy reply re-runs the whole search; the returned [`Records`] is single-pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for non-success statuses and [`Error::BusyExceeded`] when
    /// the retry budget runs out.
    pub async fn search(&self, base: &str, filter: &str, attributes: &[&str]) -> Result<Records> {
        self.collect("search", base, SearchScope::Subtree, filter, attributes)
            .await
    }

    /// Like [`search`](Self::search) but only returns immediate children of `base`.
    ///
    /// # Errors
    ///
    /// Same as [`search`](Self::search).
    pub async fn list(&self, base: &str, filter: &str, attributes: &[&str]) -> Result<Records> {
        self.collect("list", base, SearchScope::OneLevel, filter, attributes)
            .await
    }

    /// Reads the single entry at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no entry exists at `path`.
    pub async fn read(&self, path: &str, attributes: &[&str]) -> Result<Record> {
        let mut guard = self.transport.lock().await;
        let transport = self.live(&mut guard)?;
        self.read_entry(transport, path, &projection(attributes))
            .await
    }

    /// Creates `path`, or reconciles it through a modify when it already exists.
    ///
    /// Only a not-found probe leads to an add; any other probe failure is returned. If the
    /// add races with another writer and reports the entry as existing, the changes are
    /// applied as a modify instead. Returns the entry as the server stored it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for any status other than the single redirect.
    pub async fn add(&self, path: &str, changes: &AttributeChanges) -> Result<Record> {
        let mut guard = self.transport.lock().await;
        let transport = self.live(&mut guard)?;
        let all = [ALL_ATTRIBUTES.to_string()];
        let start = match self.read_entry(transport, path, &all).await {
            Ok(_) => UpsertStep::Reconcile,
            Err(Error::NotFound(_)) => UpsertStep::Create,
            Err(err) => return Err(err),
        };
        self.upsert(transport, path, changes, start).await
    }

    /// Applies `changes` to `path`, creating the entry when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for any status other than the single redirect.
    pub async fn modify(&self, path: &str, changes: &AttributeChanges) -> Result<Record> {
        let mut guard = self.transport.lock().await;
        let transport = self.live(&mut guard)?;
        self.upsert(transport, path, changes, UpsertStep::Reconcile)
            .await
    }

    /// Deletes `path` and everything below it, children first.
    ///
    /// Not transactional: entries removed before a failure stay removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Delete`] naming the first entry that could not be removed.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let mut guard = self.transport.lock().await;
        let transport = self.live(&mut guard)?;

        // (path, children already queued)
        let mut pending = vec![(path.to_string(), false)];
        while let Some((current, expanded)) = pending.pop() {
            if expanded {
                self.delete_leaf(transport, &current)
                    .await
                    .map_err(|source| Error::Delete {
                        path: current.clone(),
                        source: Box::new(source),
                    })?;
                debug!(path = %current, "deleted directory entry");
                continue;
            }
            pending.push((current.clone(), true));
            match self.child_paths(transport, &current).await {
                Ok(children) => pending.extend(children.into_iter().map(|child| (child, false))),
                Err(err) => {
                    warn!(path = %current, error = %err, "listing children failed, deleting entry directly");
                }
            }
        }
        Ok(())
    }

    /// Moves `path` under `new_parent`, keeping its RDN and dropping the old RDN value.
    ///
    /// A single attempt is made; busy replies are not retried. Returns the new path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] when either path does not parse and [`Error::Move`]
    /// when the rename fails.
    pub async fn move_entry(&self, path: &str, new_parent: &str) -> Result<DirectoryPath> {
        let source = DirectoryPath::parse(path)?;
        let parent = DirectoryPath::parse(new_parent)?;

        let mut guard = self.transport.lock().await;
        let transport = self.live(&mut guard)?;

        let rdn = source.leaf().to_string();
        let reply = transport
            .rename(path, &rdn, new_parent, true)
            .await
            .map_err(|err| move_error(path, new_parent, err))?;
        if !reply.status.is_success() {
            return Err(move_error(
                path,
                new_parent,
                protocol_error("move", path, &reply),
            ));
        }

        let destination = source.reparented(&parent);
        debug!(from = path, to = %destination, "moved directory entry");
        Ok(destination)
    }

    fn live<'a>(&self, guard: &'a mut Option<Transport>) -> Result<&'a mut Transport> {
        guard
            .as_mut()
            .ok_or_else(|| Error::SessionClosed(self.uri.clone()))
    }

    async fn collect(
        &self,
        operation: &'static str,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Records> {
        let mut guard = self.transport.lock().await;
        let transport = self.live(&mut guard)?;
        let reply = self
            .query(transport, operation, base, scope, filter, &projection(attributes))
            .await?;
        if !reply.status.is_success() {
            return Err(protocol_error(operation, base, &reply));
        }
        Ok(Records::new(reply.payload))
    }

    async fn query(
        &self,
        transport: &mut Transport,
        operation: &'static str,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Reply<Vec<RawEntry>>> {
        debug!(operation, base, filter, "searching directory");
        let mut budget = self.retry.budget(operation, base);
        Ok(until_not_busy!(
            budget,
            transport.search(base, scope, filter, attributes)
        ))
    }

    async fn read_entry(
        &self,
        transport: &mut Transport,
        path: &str,
        attributes: &[String],
    ) -> Result<Record> {
        let reply = self
            .query(transport, "read", path, SearchScope::Base, MATCH_ALL_FILTER, attributes)
            .await?;
        match reply.status {
            ResultCode::Success => {}
            ResultCode::NoSuchObject => return Err(Error::NotFound(path.to_string())),
            _ => return Err(protocol_error("read", path, &reply)),
        }
        reply
            .payload
            .into_iter()
            .next()
            .map(Record::from_raw)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn upsert(
        &self,
        transport: &mut Transport,
        path: &str,
        changes: &AttributeChanges,
        start: UpsertStep,
    ) -> Result<Record> {
        let mut step = start;
        let mut redirected = false;
        loop {
            let operation = step.operation();
            debug!(operation, path, "writing directory entry");
            let mut budget = self.retry.budget(operation, path);
            let reply = match step {
                UpsertStep::Create => {
                    let attributes = changes.to_creation_attributes();
                    until_not_busy!(budget, transport.add(path, &attributes))
                }
                UpsertStep::Reconcile => {
                    let modifications = changes.to_modifications();
                    until_not_busy!(budget, transport.modify(path, &modifications))
                }
            };

            if reply.status.is_success() {
                return match reply.payload {
                    Some(entry) => Ok(written_record(path, entry)),
                    // The post-read control is critical, so servers that honour the request
                    // always echo the entry; fall back to a read for those that don't.
                    None => {
                        let all = [ALL_ATTRIBUTES.to_string()];
                        self.read_entry(transport, path, &all).await
                    }
                };
            }

            if reply.status == step.redirect_status() && !redirected {
                debug!(
                    path,
                    from = operation,
                    to = step.fallback().operation(),
                    status = %reply.status,
                    "upsert switching write"
                );
                redirected = true;
                step = step.fallback();
                continue;
            }

            return Err(protocol_error(operation, path, &reply));
        }
    }

    async fn child_paths(&self, transport: &mut Transport, path: &str) -> Result<Vec<String>> {
        let names_only = [NO_ATTRIBUTES.to_string()];
        let reply = self
            .query(transport, "list", path, SearchScope::OneLevel, MATCH_ALL_FILTER, &names_only)
            .await?;
        if !reply.status.is_success() {
            return Err(protocol_error("list", path, &reply));
        }
        Ok(reply.payload.into_iter().map(|entry| entry.dn).collect())
    }

    async fn delete_leaf(&self, transport: &mut Transport, path: &str) -> Result<()> {
        let mut budget = self.retry.budget("delete", path);
        let reply = until_not_busy!(budget, transport.delete(path));
        if reply.status.is_success() {
            Ok(())
        } else {
            Err(protocol_error("delete", path, &reply))
        }
    }
}

fn projection(attributes: &[&str]) -> Vec<String> {
    if attributes.is_empty() {
        vec![ALL_ATTRIBUTES.to_string()]
    } else {
        attributes.iter().map(|attr| (*attr).to_string()).collect()
    }
}

fn written_record(path: &str, mut entry: RawEntry) -> Record {
    if entry.dn.is_empty() {
        entry.dn = path.to_string();
    }
    Record::from_raw(entry)
}

fn protocol_error<T>(operation: &'static str, path: &str, reply: &Reply<T>) -> Error {
    Error::Protocol {
        operation,
        path: path.to_string(),
        code: reply.status,
        message: reply.message.clone(),
    }
}

fn move_error(path: &str, new_parent: &str, source: Error) -> Error {
    Error::Move {
        path: path.to_string(),
        new_parent: new_parent.to_string(),
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionOptions;
    use crate::transport::{MockConnector, MockDirectoryTransport};
    use mockall::predicate::eq;
    use mockall::Sequence;

    const URI: &str = "ldap://directory.example.com";
    const PATH: &str = "uid=jdoe,ou=people,dc=example,dc=com";

    fn options() -> SessionOptions {
        SessionOptions::new()
            .with_max_busy_retries(2)
            .with_busy_wait_interval_ms(1)
    }

    fn entry(dn: &str, attrs: &[(&str, &[&str])]) -> RawEntry {
        RawEntry {
            dn: dn.to_string(),
            attrs: attrs
                .iter()
                .map(|(name, values)| {
                    (
                        (*name).to_string(),
                        values.iter().map(|v| (*v).to_string()).collect(),
                    )
                })
                .collect(),
            bin_attrs: Vec::new(),
        }
    }

    fn busy<T: Default>() -> Result<Reply<T>> {
        Ok(Reply::status(ResultCode::Busy, "server busy"))
    }

    async fn connect_with(
        mut transport: MockDirectoryTransport,
        options: SessionOptions,
    ) -> DirectorySession {
        transport
            .expect_simple_bind()
            .times(1)
            .returning(|_, _| Ok(Reply::success(())));
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move |_, _| Ok(Box::new(transport)));
        DirectorySession::connect(&connector, URI, &options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn connect_binds_with_configured_credentials() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_simple_bind()
            .with(eq("cn=admin,dc=example,dc=com"), eq("secret"))
            .times(1)
            .returning(|_, _| Ok(Reply::success(())));
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .withf(|uri, _| uri == URI)
            .return_once(move |_, _| Ok(Box::new(transport)));

        let options = options().with_bind("cn=admin,dc=example,dc=com", "secret");
        let session = DirectorySession::connect(&connector, URI, &options)
            .await
            .unwrap();
        assert_eq!(session.uri(), URI);
        assert_eq!(session.bind_identity(), "cn=admin,dc=example,dc=com");
        assert_eq!(session.retry_policy().max_busy_retries, 2);
    }

    #[tokio::test]
    async fn rejected_bind_is_a_bind_error() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_simple_bind()
            .returning(|_, _| Ok(Reply::status(ResultCode::InvalidCredentials, "bad password")));
        transport.expect_unbind().times(1).returning(|| Ok(()));
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .return_once(move |_, _| Ok(Box::new(transport)));

        let err = DirectorySession::connect(&connector, URI, &options().with_bind("cn=x", "y"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Bind { ref identity, .. } if identity == "cn=x"));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        let mut connector = MockConnector::new();
        connector.expect_connect().return_once(|uri, _| {
            Err(Error::Connection {
                uri: uri.to_string(),
                message: "connection refused".to_string(),
            })
        });

        let err = DirectorySession::connect(&connector, URI, &options())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONNECTION_ERROR");
    }

    #[tokio::test]
    async fn invalid_uri_never_dials() {
        let connector = MockConnector::new();
        let err = DirectorySession::connect(&connector, "not a uri", &options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn search_retries_busy_until_success() {
        let mut transport = MockDirectoryTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_search()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| busy());
        transport
            .expect_search()
            .withf(|base, scope, filter, attrs| {
                base == "dc=example,dc=com"
                    && *scope == SearchScope::Subtree
                    && filter == "(uid=jdoe)"
                    && attrs == ["*".to_string()]
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(Reply::success(vec![entry(PATH, &[("uid", &["jdoe"])])])));

        let session = connect_with(transport, options()).await;
        let records: Vec<Record> = session
            .search("dc=example,dc=com", "(uid=jdoe)", &[])
            .await
            .unwrap()
            .collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dn(), Some(PATH));
        assert_eq!(records[0].first("uid"), Some("jdoe"));
    }

    #[tokio::test]
    async fn busy_budget_exhaustion_fails() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .times(2)
            .returning(|_, _, _, _| busy());

        let session = connect_with(transport, options().with_max_busy_retries(1)).await;
        let err = session
            .list("dc=example,dc=com", MATCH_ALL_FILTER, &[])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::BusyExceeded {
                operation: "list",
                path: "dc=example,dc=com".to_string(),
                attempts: 2,
            }
        );
    }

    #[tokio::test]
    async fn non_busy_failure_is_not_retried() {
        let mut transport = MockDirectoryTransport::new();
        transport.expect_search().times(1).returning(|_, _, _, _| {
            Ok(Reply::status(ResultCode::InsufficientAccess, "denied"))
        });

        let session = connect_with(transport, options()).await;
        let err = session
            .search("dc=example,dc=com", MATCH_ALL_FILTER, &["cn"])
            .await
            .unwrap_err();
        assert_eq!(err.result_code(), Some(ResultCode::InsufficientAccess));
    }

    #[tokio::test]
    async fn read_maps_missing_entry_to_not_found() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .withf(|base, scope, filter, _| {
                base == PATH && *scope == SearchScope::Base && filter == MATCH_ALL_FILTER
            })
            .times(1)
            .returning(|_, _, _, _| Ok(Reply::status(ResultCode::NoSuchObject, "")));

        let session = connect_with(transport, options()).await;
        let err = session.read(PATH, &[]).await.unwrap_err();
        assert_eq!(err, Error::NotFound(PATH.to_string()));
    }

    #[tokio::test]
    async fn add_creates_when_probe_finds_nothing() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .times(1)
            .returning(|_, _, _, _| Ok(Reply::status(ResultCode::NoSuchObject, "")));
        transport
            .expect_add()
            .withf(|path, attrs| {
                path == PATH
                    && attrs == [("cn".to_string(), vec![b"John".to_vec()])]
            })
            .times(1)
            .returning(|_, _| {
                Ok(Reply::success(Some(entry("", &[("cn", &["John"])]))))
            });

        let session = connect_with(transport, options()).await;
        let changes = AttributeChanges::new().set("cn", "John").delete("mail");
        let record = session.add(PATH, &changes).await.unwrap();
        assert_eq!(record.dn(), Some(PATH));
        assert_eq!(record.first("cn"), Some("John"));
    }

    #[tokio::test]
    async fn add_on_existing_entry_reconciles() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .times(1)
            .returning(|_, _, _, _| Ok(Reply::success(vec![entry(PATH, &[("cn", &["Old"])])])));
        transport.expect_add().never();
        transport
            .expect_modify()
            .times(1)
            .returning(|_, _| Ok(Reply::success(Some(entry(PATH, &[("cn", &["New"])])))));

        let session = connect_with(transport, options()).await;
        let record = session
            .add(PATH, &AttributeChanges::new().set("cn", "New"))
            .await
            .unwrap();
        assert_eq!(record.first("cn"), Some("New"));
    }

    #[tokio::test]
    async fn add_race_with_existing_entry_falls_back_to_modify() {
        let mut transport = MockDirectoryTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(Reply::status(ResultCode::NoSuchObject, "")));
        transport
            .expect_add()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Reply::status(ResultCode::EntryAlreadyExists, "exists")));
        transport
            .expect_modify()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Reply::success(Some(entry(PATH, &[("cn", &["John"])])))));

        let session = connect_with(transport, options()).await;
        let record = session
            .add(PATH, &AttributeChanges::new().set("cn", "John"))
            .await
            .unwrap();
        assert_eq!(record.first("cn"), Some("John"));
    }

    #[tokio::test]
    async fn add_surfaces_probe_failures_other_than_not_found() {
        let mut transport = MockDirectoryTransport::new();
        transport.expect_search().times(1).returning(|_, _, _, _| {
            Err(Error::Transport {
                operation: "search",
                path: PATH.to_string(),
                message: "connection reset".to_string(),
            })
        });
        transport.expect_add().never();

        let session = connect_with(transport, options()).await;
        let err = session
            .add(PATH, &AttributeChanges::new().set("cn", "John"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TRANSPORT_ERROR");
    }

    #[tokio::test]
    async fn modify_on_missing_entry_creates_it() {
        let mut transport = MockDirectoryTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_modify()
            .withf(|_, mods| mods.len() == 2 && mods[1].values.is_empty())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Reply::status(ResultCode::NoSuchObject, "")));
        transport
            .expect_add()
            .withf(|_, attrs| attrs.len() == 1 && attrs[0].0 == "cn")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Reply::success(Some(entry(PATH, &[("cn", &["John"])])))));

        let session = connect_with(transport, options()).await;
        let changes = AttributeChanges::new().set("cn", "John").delete("mail");
        let record = session.modify(PATH, &changes).await.unwrap();
        assert_eq!(record.first("cn"), Some("John"));
        assert!(!record.contains("mail"));
    }

    #[tokio::test]
    async fn upsert_redirects_only_once() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_modify()
            .times(1)
            .returning(|_, _| Ok(Reply::status(ResultCode::NoSuchObject, "")));
        transport
            .expect_add()
            .times(1)
            .returning(|_, _| Ok(Reply::status(ResultCode::EntryAlreadyExists, "")));

        let session = connect_with(transport, options()).await;
        let err = session
            .modify(PATH, &AttributeChanges::new().set("cn", "John"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol {
                operation: "add",
                code: ResultCode::EntryAlreadyExists,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn missing_post_read_falls_back_to_read() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_modify()
            .times(1)
            .returning(|_, _| Ok(Reply::success(None)));
        transport
            .expect_search()
            .times(1)
            .returning(|_, _, _, _| Ok(Reply::success(vec![entry(PATH, &[("cn", &["John"])])])));

        let session = connect_with(transport, options()).await;
        let record = session
            .modify(PATH, &AttributeChanges::new().set("cn", "John"))
            .await
            .unwrap();
        assert_eq!(record.dn(), Some(PATH));
    }

    #[tokio::test]
    async fn delete_removes_children_before_parent() {
        let mut transport = MockDirectoryTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_search()
            .withf(|base, scope, _, attrs| {
                base == "ou=people,dc=example,dc=com"
                    && *scope == SearchScope::OneLevel
                    && attrs == [NO_ATTRIBUTES.to_string()]
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(Reply::success(vec![entry(PATH, &[])])));
        transport
            .expect_search()
            .withf(|base, _, _, _| base == PATH)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(Reply::success(Vec::new())));
        transport
            .expect_delete()
            .with(eq(PATH))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Reply::success(())));
        transport
            .expect_delete()
            .with(eq("ou=people,dc=example,dc=com"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Reply::success(())));

        let session = connect_with(transport, options()).await;
        session.delete("ou=people,dc=example,dc=com").await.unwrap();
    }

    #[tokio::test]
    async fn delete_proceeds_when_listing_fails() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_search()
            .times(1)
            .returning(|_, _, _, _| Ok(Reply::status(ResultCode::UnwillingToPerform, "")));
        transport
            .expect_delete()
            .times(1)
            .returning(|_| Ok(Reply::status(ResultCode::NoSuchObject, "gone")));

        let session = connect_with(transport, options()).await;
        let err = session.delete(PATH).await.unwrap_err();
        match err {
            Error::Delete { path, source } => {
                assert_eq!(path, PATH);
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn move_keeps_leaf_and_deletes_old_rdn() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_rename()
            .with(eq("ou=a,dc=x"), eq("ou=a"), eq("ou=b,dc=x"), eq(true))
            .times(1)
            .returning(|_, _, _, _| Ok(Reply::success(())));

        let session = connect_with(transport, options()).await;
        let moved = session.move_entry("ou=a,dc=x", "ou=b,dc=x").await.unwrap();
        assert_eq!(moved.to_string(), "ou=a,ou=b,dc=x");
    }

    #[tokio::test]
    async fn move_accepts_escaped_trailing_space() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_rename()
            .with(
                eq("cn=John\\ ,ou=a,dc=x"),
                eq("cn=John\\ "),
                eq("ou=b,dc=x"),
                eq(true),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(Reply::success(())));

        let session = connect_with(transport, options()).await;
        let moved = session
            .move_entry("cn=John\\ ,ou=a,dc=x", "ou=b,dc=x")
            .await
            .unwrap();
        assert_eq!(moved.to_string(), "cn=John\\ ,ou=b,dc=x");
    }

    #[tokio::test]
    async fn move_is_not_retried_on_busy() {
        let mut transport = MockDirectoryTransport::new();
        transport
            .expect_rename()
            .times(1)
            .returning(|_, _, _, _| Ok(Reply::status(ResultCode::Busy, "")));

        let session = connect_with(transport, options()).await;
        let err = session
            .move_entry("ou=a,dc=x", "ou=b,dc=x")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MOVE_ERROR");
        assert_eq!(err.result_code(), Some(ResultCode::Busy));
    }

    #[tokio::test]
    async fn closed_session_rejects_operations() {
        let mut transport = MockDirectoryTransport::new();
        transport.expect_unbind().times(1).returning(|| Ok(()));

        let session = connect_with(transport, options()).await;
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.is_closed().await);
        let err = session.read(PATH, &[]).await.unwrap_err();
        assert_eq!(err, Error::SessionClosed(URI.to_string()));
    }
}
