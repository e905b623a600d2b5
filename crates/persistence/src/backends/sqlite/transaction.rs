//! Transaction scope for SQLite operations.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::{StorageError, StorageResult, TransactionError, is_interrupted};
use crate::tenant::TenantContext;

/// Runs `f` inside one `BEGIN IMMEDIATE` transaction.
///
/// Commits when `f` succeeds and rolls back when it fails. A failed commit
/// leaves nothing applied; the rusqlite transaction rolls back on drop.
pub fn with_transaction<T, F>(
    conn: &mut Connection,
    tenant: &TenantContext,
    f: F,
) -> StorageResult<T>
where
    F: FnOnce(&Transaction<'_>) -> StorageResult<T>,
{
    tenant.cancellation().check()?;
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| {
            StorageError::Transaction(TransactionError::Failed {
                message: format!("Failed to begin transaction: {}", e),
            })
        })?;

    match f(&tx) {
        Ok(value) => {
            tx.commit().map_err(|e| {
                if is_interrupted(&e) {
                    return StorageError::Transaction(TransactionError::Cancelled);
                }
                StorageError::Transaction(TransactionError::RolledBack {
                    reason: format!("Commit failed: {}", e),
                })
            })?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::warn!(
                    error = %rollback_err,
                    tenant = %tenant.tenant_id(),
                    "Rollback failed after error: {}",
                    err
                );
            } else {
                tracing::debug!(tenant = %tenant.tenant_id(), "Rolled back: {}", err);
            }
            Err(err)
        }
    }
}
