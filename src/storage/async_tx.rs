//! Async facade over map transactions
//!
//! Transactions run on tokio's blocking pool. With a deadline, a transaction
//! still running when it passes is cancelled: the statement in flight is
//! interrupted and nothing further (commit included) is allowed.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::map::{MapSnapshot, MapStorage, MapTransaction};
use super::tree_tx::{interrupted, CancelHandle};
use crate::error::{MapStorageResult, StorageError};
use crate::tree::Tree;

impl MapStorage {
    /// [`read_write_transaction`](MapStorage::read_write_transaction) on the
    /// blocking pool, cancelled if it outlives `deadline`
    pub async fn read_write_transaction_async<T, F>(
        &self,
        tree: Tree,
        deadline: Option<Duration>,
        f: F,
    ) -> MapStorageResult<T>
    where
        F: FnOnce(&MapTransaction) -> MapStorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.clone();
        run_blocking(deadline, move |slot| {
            let tx = storage.begin_for_tree(&tree)?.into_transaction();
            slot.attach(tx.cancel_handle())?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
        .await
    }

    /// Run `f` against a snapshot of `tree` on the blocking pool
    pub async fn snapshot_async<T, F>(
        &self,
        tree: Tree,
        deadline: Option<Duration>,
        f: F,
    ) -> MapStorageResult<T>
    where
        F: FnOnce(&MapSnapshot) -> MapStorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.clone();
        run_blocking(deadline, move |slot| {
            let snapshot = storage.snapshot_for_tree(&tree)?;
            slot.attach(snapshot.cancel_handle())?;
            let out = f(&snapshot)?;
            snapshot.commit()?;
            Ok(out)
        })
        .await
    }
}

/// Hands the cancel handle of a transaction opened on the blocking pool
/// back to the task waiting on it.
#[derive(Default)]
struct CancelSlot {
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    expired: bool,
    handle: Option<CancelHandle>,
}

impl CancelSlot {
    /// Register the transaction; fails straight away if the deadline passed
    /// while it was opening.
    fn attach(&self, handle: CancelHandle) -> MapStorageResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.expired {
            handle.cancel();
            return Err(interrupted());
        }
        state.handle = Some(handle);
        Ok(())
    }

    fn expire(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.expired = true;
        if let Some(handle) = &state.handle {
            handle.cancel();
        }
    }
}

async fn run_blocking<T, F>(deadline: Option<Duration>, job: F) -> MapStorageResult<T>
where
    F: FnOnce(&CancelSlot) -> MapStorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    let slot = Arc::new(CancelSlot::default());
    let mut task = tokio::task::spawn_blocking({
        let slot = Arc::clone(&slot);
        move || job(slot.as_ref())
    });

    let joined = match deadline {
        None => task.await,
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    deadline_ms = limit.as_millis() as u64,
                    "map transaction deadline elapsed, cancelling"
                );
                slot.expire();
                task.await
            }
        },
    };

    joined.map_err(|e| StorageError::TransactionFailed(format!("spawn_blocking failed: {}", e)))?
}
