//! Reference-counted nested transactions over a plain database driver.
//!
//! [`NestedTransactions`] wraps any [`TransactionBackend`] and turns inner `begin`
//! calls into savepoints, so code that opens its own transaction can be called from
//! inside another one. Only the outermost `commit`/`rollback` touches the real
//! transaction.

use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

/// Minimal driver surface the nesting manager needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionBackend: Send {
    /// Start the real transaction.
    async fn begin(&mut self) -> Result<()>;
    /// Commit the real transaction.
    async fn commit(&mut self) -> Result<()>;
    /// Roll back the real transaction.
    async fn rollback(&mut self) -> Result<()>;
    /// Execute a raw statement (used for savepoint management).
    async fn execute(&mut self, statement: &str) -> Result<()>;
}

/// Depth-counting transaction manager.
#[derive(Debug)]
pub struct NestedTransactions<B> {
    backend: B,
    depth: u32,
}

impl<B: TransactionBackend> NestedTransactions<B> {
    /// Wraps a backend with no transaction open.
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend, depth: 0 }
    }

    /// Opens a transaction, or a savepoint when one is already open.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; the depth is unchanged on error.
    pub async fn begin(&mut self) -> Result<()> {
        if self.depth == 0 {
            self.backend.begin().await?;
        } else {
            self.backend
                .execute(&format!("SAVEPOINT {}", savepoint_name(self.depth + 1)))
                .await?;
        }
        self.depth += 1;
        debug!(depth = self.depth, "transaction level opened");
        Ok(())
    }

    /// Commits the innermost level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transaction`] when no transaction is open.
    pub async fn commit(&mut self) -> Result<()> {
        let depth = self.ensure_open("commit")?;
        if depth == 1 {
            self.backend.commit().await?;
        } else {
            self.backend
                .execute(&format!("RELEASE SAVEPOINT {}", savepoint_name(depth)))
                .await?;
        }
        self.depth = depth - 1;
        debug!(depth = self.depth, "transaction level committed");
        Ok(())
    }

    /// Rolls back the innermost level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transaction`] when no transaction is open.
    pub async fn rollback(&mut self) -> Result<()> {
        let depth = self.ensure_open("rollback")?;
        if depth == 1 {
            self.backend.rollback().await?;
        } else {
            self.backend
                .execute(&format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(depth)))
                .await?;
        }
        self.depth = depth - 1;
        debug!(depth = self.depth, "transaction level rolled back");
        Ok(())
    }

    /// Abandons every open level with a single real rollback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transaction`] when no transaction is open.
    pub async fn cancel(&mut self) -> Result<()> {
        self.ensure_open("cancel")?;
        self.depth = 0;
        self.backend.rollback().await
    }

    /// Commits every open level with a single real commit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transaction`] when no transaction is open.
    pub async fn complete(&mut self) -> Result<()> {
        self.ensure_open("complete")?;
        self.depth = 0;
        self.backend.commit().await
    }

    /// Returns true while at least one level is open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Number of open levels.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Borrows the wrapped backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn ensure_open(&self, action: &str) -> Result<u32> {
        if self.depth == 0 {
            return Err(Error::Transaction(format!("{action} without an open transaction")));
        }
        Ok(self.depth)
    }
}

fn savepoint_name(level: u32) -> String {
    format!("trans{level}")
}
