//! Process-wide session sharing.
//!
//! A [`SessionRegistry`] hands out one [`DirectorySession`] per server URI. The first request
//! for a URI connects and binds with the options it supplies; later requests get the same
//! session back and their options are ignored. The registry lock is held while a session is
//! being built, so two callers racing on a new URI still produce a single connection.

use crate::backend::Ldap3Connector;
use crate::config::SessionOptions;
use crate::session::DirectorySession;
use crate::transport::Connector;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Shares one session per server URI.
pub struct SessionRegistry {
    connector: Arc<dyn Connector>,
    sessions: Mutex<HashMap<String, Arc<DirectorySession>>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates an empty registry that dials through `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an empty registry backed by `ldap3`.
    #[must_use]
    pub fn ldap3() -> Self {
        Self::new(Arc::new(Ldap3Connector::new()))
    }

    /// Returns the session for `uri`, connecting with `options` if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns the connect or bind failure; nothing is registered in that case and the next
    /// call for the same URI tries again.
    pub async fn get(&self, uri: &str, options: &SessionOptions) -> Result<Arc<DirectorySession>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(uri) {
            debug!(uri, "reusing directory session");
            return Ok(Arc::clone(session));
        }

        let session =
            Arc::new(DirectorySession::connect(self.connector.as_ref(), uri, options).await?);
        sessions.insert(uri.to_string(), Arc::clone(&session));
        info!(uri, identity = session.bind_identity(), "registered directory session");
        Ok(session)
    }

    /// Returns true when a session for `uri` is registered.
    pub async fn contains(&self, uri: &str) -> bool {
        self.sessions.lock().await.contains_key(uri)
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Returns true when no session is registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Unregisters and closes the session for `uri`. Returns false if there was none.
    ///
    /// Holders of the session see [`Error::SessionClosed`](dirkit_core::Error::SessionClosed)
    /// on their next operation.
    ///
    /// # Errors
    ///
    /// Propagates the unbind failure; the session is unregistered regardless.
    pub async fn release(&self, uri: &str) -> Result<bool> {
        let session = self.sessions.lock().await.remove(uri);
        match session {
            Some(session) => {
                session.close().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Closes and unregisters every session. Unbind failures are logged.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.sessions.lock().await.drain().collect();
        for (uri, session) in drained {
            if let Err(err) = session.close().await {
                warn!(uri = %uri, error = %err, "failed to close directory session");
            }
        }
    }
}
