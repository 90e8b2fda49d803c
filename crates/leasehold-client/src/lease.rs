//! Held lock lease
//!
//! A `Lease` is returned by `LockClient::acquire`. It owns:
//! - the current fencing token, replaced on every successful renewal
//! - the heartbeat task that renews the record every heartbeat period
//! - the channel on which renewal failures are reported
//!
//! Renewal and release never write concurrently: both run while holding the
//! lease's state gate. A release requested during an in-flight renewal waits
//! on the gate and runs as soon as that renewal's write has completed, before
//! the heartbeat can schedule another one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use leasehold_common::{LockError, Result, StoreError};
use leasehold_store::{ItemKey, LockStore};

use crate::config::LockClientConfig;
use crate::id::LockId;
use crate::record::{LockRecord, held_with, new_fencing_token};

struct LeaseState {
    fencing_token: String,
}

struct LeaseShared {
    store: Arc<dyn LockStore>,
    config: Arc<LockClientConfig>,
    owner_name: String,
    id: LockId,
    key: ItemKey,
    state: tokio::sync::Mutex<LeaseState>,
    /// Set while a renewal write is in flight. Only observed, never waited
    /// on: the state mutex is what orders release after renewal.
    renewing: AtomicBool,
    released: AtomicBool,
}

impl LeaseShared {
    async fn renew(&self, state: &mut LeaseState) -> Result<()> {
        let fencing_token = new_fencing_token();
        let record = LockRecord::new(
            &self.owner_name,
            fencing_token.clone(),
            Some(self.config.lease()),
            self.config.trust_local_time,
        );
        let condition = held_with(&self.key, &state.fencing_token);

        self.store
            .put(
                &self.config.table,
                &self.key,
                record.to_attributes(),
                Some(&condition),
            )
            .await?;

        debug!(lock = %self.id, "Lease renewed");
        state.fencing_token = fencing_token;
        Ok(())
    }
}

async fn heartbeat(
    shared: Arc<LeaseShared>,
    period: Duration,
    failures: mpsc::UnboundedSender<LockError>,
) {
    loop {
        tokio::time::sleep(period).await;

        let mut state = shared.state.lock().await;
        if shared.released.load(Ordering::Acquire) {
            return;
        }

        shared.renewing.store(true, Ordering::Release);
        let result = shared.renew(&mut state).await;
        shared.renewing.store(false, Ordering::Release);
        drop(state);

        if let Err(e) = result {
            warn!(lock = %shared.id, error = %e, "Lease renewal failed; heartbeat stopped");
            let _ = failures.send(e);
            return;
        }
    }
}

/// A held lock
///
/// Dropping a `Lease` without releasing it stops the heartbeat and leaves the
/// record to expire on its own.
pub struct Lease {
    shared: Arc<LeaseShared>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    failures: Mutex<Option<mpsc::UnboundedReceiver<LockError>>>,
}

impl Lease {
    pub(crate) fn start(
        store: Arc<dyn LockStore>,
        config: Arc<LockClientConfig>,
        owner_name: String,
        id: LockId,
        key: ItemKey,
        fencing_token: String,
    ) -> Self {
        let shared = Arc::new(LeaseShared {
            store,
            config,
            owner_name,
            id,
            key,
            state: tokio::sync::Mutex::new(LeaseState { fencing_token }),
            renewing: AtomicBool::new(false),
            released: AtomicBool::new(false),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = shared
            .config
            .heartbeat_period
            .map(|period| tokio::spawn(heartbeat(shared.clone(), period, tx)));

        Self {
            shared,
            heartbeat: Mutex::new(handle),
            failures: Mutex::new(Some(rx)),
        }
    }

    pub fn id(&self) -> &LockId {
        &self.shared.id
    }

    pub fn key(&self) -> &ItemKey {
        &self.shared.key
    }

    pub fn owner_name(&self) -> &str {
        &self.shared.owner_name
    }

    pub fn lease_duration(&self) -> Duration {
        self.shared.config.lease()
    }

    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::Acquire)
    }

    /// Whether the heartbeat is currently waiting on a renewal write
    pub fn is_renewing(&self) -> bool {
        self.shared.renewing.load(Ordering::Acquire)
    }

    /// Current fencing token; waits for an in-flight renewal to finish
    pub async fn fencing_token(&self) -> String {
        self.shared.state.lock().await.fencing_token.clone()
    }

    /// Receiver of renewal failures, available once
    ///
    /// At most one failure is ever sent: the heartbeat stops after it. The
    /// receiver yields `None` once the heartbeat has ended without failing.
    pub fn take_renewal_failures(&self) -> Option<mpsc::UnboundedReceiver<LockError>> {
        self.failures.lock().take()
    }

    /// Release the lock
    ///
    /// Idempotent and fail-open: only the first call deletes the record, and
    /// a failed delete is logged rather than returned since the lease
    /// expires on its own.
    pub async fn release(&self) {
        if self.is_released() {
            debug!(lock = %self.shared.id, "Lease already released");
            return;
        }
        if self.is_renewing() {
            debug!(lock = %self.shared.id, "Renewal in flight; release deferred");
        }

        let state = self.shared.state.lock().await;
        if self.shared.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let heartbeat = self.heartbeat.lock().take();
        if let Some(handle) = heartbeat {
            handle.abort();
        }

        let condition = held_with(&self.shared.key, &state.fencing_token);
        match self
            .shared
            .store
            .delete(&self.shared.config.table, &self.shared.key, Some(&condition))
            .await
        {
            Ok(()) => info!(lock = %self.shared.id, "Lock released"),
            Err(StoreError::ConditionFailed) => warn!(
                lock = %self.shared.id,
                "Lock record was overwritten or removed before release"
            ),
            Err(e) => error!(
                lock = %self.shared.id,
                error = %e,
                "Failed to delete lock record; lease will expire"
            ),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.shared.id)
            .field("owner_name", &self.shared.owner_name)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}
