//! Transaction strategy: the database is "cleaned" by rolling back a
//! transaction opened before the test ran.

use crate::connection::Connection;
use crate::error::CleanError;
use std::ops::{Deref, DerefMut};
use tracing::{debug, error};

/// An open transaction that is always rolled back.
///
/// Run the test's statements through the scope (it dereferences to the
/// connection). Clearing happens at [`teardown`](Self::teardown), or when the
/// scope is dropped.
pub struct TransactionScope<C: Connection> {
    conn: C,
    active: bool,
}

impl<C: Connection> TransactionScope<C> {
    pub(crate) fn begin(mut conn: C) -> Result<Self, CleanError> {
        conn.begin_transaction()
            .map_err(|source| CleanError::Transaction {
                action: "begin",
                source,
            })?;
        debug!("transaction scope opened");
        Ok(Self { conn, active: true })
    }

    /// Roll back everything done inside the scope
    pub fn teardown(mut self) -> Result<(), CleanError> {
        self.active = false;
        self.conn.rollback().map_err(|source| CleanError::Transaction {
            action: "roll back",
            source,
        })?;
        debug!("transaction scope rolled back");
        Ok(())
    }
}

impl<C: Connection> Deref for TransactionScope<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C: Connection> DerefMut for TransactionScope<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<C: Connection> Drop for TransactionScope<C> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(e) = self.conn.rollback() {
            error!(error = %e, "failed to roll back transaction scope");
        }
    }
}
