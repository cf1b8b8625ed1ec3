//! Concurrent write batching for attestation records.
//!
//! Many validators managed by one process try to record attestations within
//! the same slot. Committing each save on its own serializes every signer
//! through the single writer and pays one fsync per record; the batcher
//! coalesces concurrent saves into grouped durable commits instead.
//!
//! Savers enqueue a record and block on a completion handle. One flusher
//! task owns the queue drain: it commits either when the queue reaches
//! capacity or when the write interval elapses, then resolves every handle
//! with the commit result.

use std::sync::Arc;
use std::time::Duration;

use slashguard_types::attestation::AttestationData;
use slashguard_types::primitives::{Epoch, H256, PublicKeyBytes};
use tokio::sync::{Mutex, Notify, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{KvEngine, WriteTxn};
use crate::error::{Result, StoreError};
use crate::metrics;
use crate::schema;

/// Maximum number of attestation records coalesced into one commit.
pub const ATTESTATION_BATCH_CAPACITY: usize = 100;

/// How long a partially filled queue waits before it is committed anyway.
pub(crate) const ATTESTATION_BATCH_WRITE_INTERVAL: Duration = Duration::from_millis(100);

/// An attestation record waiting to be flushed.
///
/// `waiters` holds one completion handle per save call folded into this
/// record; every handle resolves with the commit result of the batch.
struct BatchedAttestation {
    pub_key: PublicKeyBytes,
    signing_root: H256,
    source: Epoch,
    target: Epoch,
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

/// Coalesces concurrent attestation saves into grouped durable commits.
pub(crate) struct AttestationBatcher {
    engine: Arc<dyn KvEngine>,
    pending: Mutex<Vec<BatchedAttestation>>,
    capacity_reached: Notify,
}

impl AttestationBatcher {
    pub(crate) fn new(engine: Arc<dyn KvEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            pending: Mutex::new(Vec::with_capacity(ATTESTATION_BATCH_CAPACITY)),
            capacity_reached: Notify::new(),
        })
    }

    /// Queue one record and hand back the completion handle its saver awaits.
    ///
    /// A pair still in the queue is overwritten by a later save for the same
    /// `(pubkey, source, target)`: the last signing root wins and the earlier
    /// savers wait on the merged record.
    pub(crate) async fn enqueue(
        &self,
        pub_key: PublicKeyBytes,
        signing_root: H256,
        data: &AttestationData,
    ) -> oneshot::Receiver<Result<()>> {
        let (sender, receiver) = oneshot::channel();
        let source = data.source.epoch;
        let target = data.target.epoch;

        let mut pending = self.pending.lock().await;
        match pending
            .iter_mut()
            .find(|entry| entry.pub_key == pub_key && entry.source == source && entry.target == target)
        {
            Some(entry) => {
                entry.signing_root = signing_root;
                entry.waiters.push(sender);
            }
            None => pending.push(BatchedAttestation {
                pub_key,
                signing_root,
                source,
                target,
                waiters: vec![sender],
            }),
        }

        if pending.len() >= ATTESTATION_BATCH_CAPACITY {
            debug!(
                records = pending.len(),
                "Reached max capacity of batched attestation records"
            );
            self.capacity_reached.notify_one();
        }

        receiver
    }

    /// Number of records currently queued.
    pub(crate) async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Run the flush loop until `shutdown` fires.
    ///
    /// The final drain after shutdown is the store's job, so close() can
    /// report the result of that last commit.
    pub(crate) async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(ATTESTATION_BATCH_WRITE_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.capacity_reached.notified() => {
                    let _ = self.flush("capacity").await;
                }
                _ = interval.tick() => {
                    if self.pending.lock().await.is_empty() {
                        continue;
                    }
                    debug!("Batched attestation records write interval reached");
                    let _ = self.flush("interval").await;
                }
                _ = shutdown.cancelled() => {
                    return;
                }
            }
        }
    }

    /// Commit everything queued and resolve the waiters with the outcome.
    pub(crate) async fn flush(&self, trigger: &str) -> Result<()> {
        // Snapshot and clear under the lock; the commit runs outside it so
        // new saves can keep queueing for the next batch.
        let batch = std::mem::take(&mut *self.pending.lock().await);
        if batch.is_empty() {
            return Ok(());
        }

        let result = self.commit_records(&batch);
        match &result {
            Ok(()) => {
                debug!(
                    records = batch.len(),
                    "Successfully flushed batched attestations to DB"
                );
                metrics::inc_attestation_batch_flushes(trigger);
                metrics::inc_flushed_attestation_records(batch.len() as u64);
            }
            Err(err) => {
                warn!(%err, records = batch.len(), "Failed to flush batched attestations to DB");
            }
        }

        for entry in batch {
            for waiter in entry.waiters {
                let _ = waiter.send(result.clone());
            }
        }
        result
    }

    /// Resolve every queued waiter with `err` without committing.
    pub(crate) async fn fail_pending(&self, err: StoreError) {
        let batch = std::mem::take(&mut *self.pending.lock().await);
        for entry in batch {
            for waiter in entry.waiters {
                let _ = waiter.send(Err(err.clone()));
            }
        }
    }

    /// Write both halves of every record inside one atomic transaction.
    fn commit_records(&self, batch: &[BatchedAttestation]) -> Result<()> {
        let mut txn = self.engine.write_txn()?;
        for entry in batch {
            schema::register_validator(txn.as_mut(), &entry.pub_key)?;
            schema::put_source_target(txn.as_mut(), &entry.pub_key, entry.source, entry.target)?;
            schema::put_target_root(
                txn.as_mut(),
                &entry.pub_key,
                entry.target,
                entry.signing_root,
            )?;
        }
        txn.commit()?;
        Ok(())
    }
}
