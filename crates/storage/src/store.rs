use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use slashguard_types::attestation::AttestationData;
use slashguard_types::primitives::{Epoch, H256, PublicKeyBytes, Slot};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{KvEngine, ReadTxn, Table, WriteTxn};
use crate::backend::RocksDbEngine;
use crate::batch::AttestationBatcher;
use crate::error::{Result, StoreError};
use crate::metrics;
use crate::schema;
use crate::slashing::{self, SlashingKind};

/// Validator slashing-protection store.
///
/// The store keeps, per public key, the minimal signing history needed to
/// decide whether a candidate attestation or block proposal would be a
/// slashable offense, and records every acknowledged sign durably.
///
/// Callers follow a check-then-save discipline on the signing hot path:
/// [`check_slashable_attestation`](Self::check_slashable_attestation) before
/// producing a signature,
/// [`save_attestation_for_pub_key`](Self::save_attestation_for_pub_key)
/// before releasing it. A save that has returned is visible to every
/// subsequent check.
///
/// `Store` is a cheap [`Clone`] handle; all clones share the engine, the
/// batching queue, and the background flusher, whose lifetime ends with
/// [`close`](Self::close).
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    engine: Arc<dyn KvEngine>,
    batcher: Arc<AttestationBatcher>,
    shutdown: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
    path: Option<PathBuf>,
    closed: AtomicBool,
}

impl Store {
    /// Open (or create) the on-disk store at `path` and register the given
    /// public keys.
    ///
    /// Spawns the batch flusher, so this must run inside a tokio runtime.
    pub fn open(path: impl AsRef<Path>, pub_keys: &[PublicKeyBytes]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let engine = RocksDbEngine::open(&path)?;
        Self::build(Arc::new(engine), pub_keys, Some(path))
    }

    /// Open a store over an arbitrary engine (in-memory in tests).
    pub fn with_engine(engine: Arc<dyn KvEngine>, pub_keys: &[PublicKeyBytes]) -> Result<Self> {
        Self::build(engine, pub_keys, None)
    }

    fn build(
        engine: Arc<dyn KvEngine>,
        pub_keys: &[PublicKeyBytes],
        path: Option<PathBuf>,
    ) -> Result<Self> {
        if !pub_keys.is_empty() {
            let mut txn = engine.write_txn()?;
            for pub_key in pub_keys {
                schema::register_validator(txn.as_mut(), pub_key)?;
            }
            txn.commit()?;
        }

        let batcher = AttestationBatcher::new(Arc::clone(&engine));
        let shutdown = CancellationToken::new();
        let flusher = tokio::spawn(Arc::clone(&batcher).run(shutdown.clone()));

        info!(validators = pub_keys.len(), "Opened slashing protection store");

        Ok(Self {
            inner: Arc::new(StoreInner {
                engine,
                batcher,
                shutdown,
                flusher: Mutex::new(Some(flusher)),
                path,
                closed: AtomicBool::new(false),
            }),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StoreError::NotOpen);
        }
        Ok(())
    }

    /// Stop the flusher and commit anything still queued.
    ///
    /// The final flush's outcome is the close result. Every operation after
    /// this returns [`StoreError::NotOpen`].
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::NotOpen);
        }

        self.inner.shutdown.cancel();
        if let Some(handle) = self.inner.flusher.lock().await.take() {
            let _ = handle.await;
        }

        let result = self.inner.batcher.flush("shutdown").await;
        // A save could have slipped past the closed check while the final
        // flush ran; its record must not linger unflushed forever.
        self.inner.batcher.fail_pending(StoreError::NotOpen).await;
        result
    }

    /// Remove the store's on-disk files. The store must be closed first.
    pub fn clear_db(&self) -> Result<()> {
        if !self.inner.closed.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidInput(
                "store must be closed before clearing".into(),
            ));
        }
        let Some(path) = &self.inner.path else {
            return Ok(());
        };
        if path.exists() {
            std::fs::remove_dir_all(path).map_err(StoreError::storage)?;
        }
        Ok(())
    }

    // ============ Attestations ============

    /// Decide whether signing `data` with `signing_root` would be slashable
    /// for `pub_key`.
    ///
    /// Returns `Ok(SlashingKind::NotSlashable)` when signing is safe and
    /// `Err(StoreError::Slashable(kind))` when it is not; the caller must
    /// not sign in the latter case.
    pub fn check_slashable_attestation(
        &self,
        pub_key: &PublicKeyBytes,
        signing_root: H256,
        data: &AttestationData,
    ) -> Result<SlashingKind> {
        self.ensure_open()?;
        let txn = self.inner.engine.read_txn()?;
        let kind = slashing::check_attestation(txn.as_ref(), pub_key, signing_root, data)?;
        metrics::inc_slashing_checks(kind.label());
        match kind {
            SlashingKind::NotSlashable => Ok(SlashingKind::NotSlashable),
            kind => {
                warn!(
                    %pub_key,
                    source = data.source.epoch,
                    target = data.target.epoch,
                    %kind,
                    "Attestation is slashable"
                );
                Err(StoreError::Slashable(kind))
            }
        }
    }

    /// Durably record that `pub_key` signed `data` with `signing_root`.
    ///
    /// The record is coalesced with concurrent saves; the call returns only
    /// once its batch has been committed, or with
    /// [`StoreError::Cancelled`] if `ctx` fires first (the record may still
    /// be written as part of the in-flight batch).
    pub async fn save_attestation_for_pub_key(
        &self,
        ctx: &CancellationToken,
        pub_key: PublicKeyBytes,
        signing_root: H256,
        data: &AttestationData,
    ) -> Result<()> {
        self.ensure_open()?;
        if data.source.epoch >= data.target.epoch {
            return Err(StoreError::InvalidInput(format!(
                "attestation source epoch {} must be lower than target epoch {}",
                data.source.epoch, data.target.epoch
            )));
        }

        let receiver = self.inner.batcher.enqueue(pub_key, signing_root, data).await;
        tokio::select! {
            result = receiver => {
                result.unwrap_or_else(|_| Err(StoreError::storage("batch flusher terminated")))
            }
            _ = ctx.cancelled() => Err(StoreError::Cancelled),
        }
    }

    /// Number of attestation records queued but not yet flushed.
    pub async fn batched_attestation_count(&self) -> usize {
        self.inner.batcher.pending_len().await
    }

    // ============ Proposals ============

    /// Decide whether signing a block proposal at `slot` with `signing_root`
    /// would be slashable for `pub_key`.
    ///
    /// Proposal protection is double-proposal detection only: a differing
    /// signing root at an already-proposed slot.
    pub fn check_slashable_proposal(
        &self,
        pub_key: &PublicKeyBytes,
        signing_root: H256,
        slot: Slot,
    ) -> Result<SlashingKind> {
        self.ensure_open()?;
        let txn = self.inner.engine.read_txn()?;
        let kind = match schema::root_for_slot(txn.as_ref(), pub_key, slot)? {
            None => SlashingKind::NotSlashable,
            Some(existing) if existing == signing_root => SlashingKind::NotSlashable,
            Some(_) => SlashingKind::DoubleVote,
        };
        metrics::inc_slashing_checks(kind.label());
        match kind {
            SlashingKind::NotSlashable => Ok(SlashingKind::NotSlashable),
            kind => {
                warn!(%pub_key, slot, %kind, "Proposal is slashable");
                Err(StoreError::Slashable(kind))
            }
        }
    }

    /// Durably record that `pub_key` proposed at `slot` with `signing_root`.
    ///
    /// Proposals happen about once per epoch per validator, so they are
    /// committed directly rather than batched.
    pub fn save_proposal_for_pub_key(
        &self,
        pub_key: &PublicKeyBytes,
        signing_root: H256,
        slot: Slot,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut txn = self.inner.engine.write_txn()?;
        schema::register_validator(txn.as_mut(), pub_key)?;
        schema::put_proposal_root(txn.as_mut(), pub_key, slot, signing_root)?;
        txn.commit()?;
        metrics::inc_saved_proposal_records();
        Ok(())
    }

    // ============ History queries ============

    /// The lowest source epoch `pub_key` has ever attested with.
    pub fn lowest_signed_source_epoch(&self, pub_key: &PublicKeyBytes) -> Result<Option<Epoch>> {
        self.ensure_open()?;
        let txn = self.inner.engine.read_txn()?;
        schema::lowest_source(txn.as_ref(), pub_key)
    }

    /// The lowest target epoch `pub_key` has ever attested with.
    pub fn lowest_signed_target_epoch(&self, pub_key: &PublicKeyBytes) -> Result<Option<Epoch>> {
        self.ensure_open()?;
        let txn = self.inner.engine.read_txn()?;
        schema::lowest_target(txn.as_ref(), pub_key)
    }

    /// The highest source epoch `pub_key` has ever attested with.
    pub fn highest_signed_source_epoch(&self, pub_key: &PublicKeyBytes) -> Result<Option<Epoch>> {
        self.ensure_open()?;
        let txn = self.inner.engine.read_txn()?;
        schema::highest_source(txn.as_ref(), pub_key)
    }

    /// The highest target epoch `pub_key` has ever attested with.
    pub fn highest_signed_target_epoch(&self, pub_key: &PublicKeyBytes) -> Result<Option<Epoch>> {
        self.ensure_open()?;
        let txn = self.inner.engine.read_txn()?;
        schema::highest_target(txn.as_ref(), pub_key)
    }

    /// Public keys with at least one attestation record.
    pub fn attested_public_keys(&self) -> Result<Vec<PublicKeyBytes>> {
        self.ensure_open()?;
        let txn = self.inner.engine.read_txn()?;
        schema::public_keys_in_table(txn.as_ref(), Table::AttestationSourceEpochs)
    }

    /// Public keys with at least one proposal record.
    pub fn proposed_public_keys(&self) -> Result<Vec<PublicKeyBytes>> {
        self.ensure_open()?;
        let txn = self.inner.engine.read_txn()?;
        schema::public_keys_in_table(txn.as_ref(), Table::ProposalRecords)
    }

    // ============ Pruning ============

    /// Delete attestation records below `lowest_epoch` for `pub_key`.
    ///
    /// Removes source entries with `source < lowest_epoch` and root entries
    /// with `target < lowest_epoch` in one atomic batch. The predicates
    /// tolerate pruned history; this only bounds growth.
    pub fn prune_attestation_records(
        &self,
        pub_key: &PublicKeyBytes,
        lowest_epoch: Epoch,
    ) -> Result<()> {
        self.ensure_open()?;
        let txn = self.inner.engine.read_txn()?;

        // Keys are sorted by epoch (big-endian encoding) so the scan can
        // stop at the bound.
        let mut source_keys = Vec::new();
        for entry in txn.scan(Table::AttestationSourceEpochs, pub_key.as_bytes())? {
            let (key, _) = entry.map_err(StoreError::from)?;
            if schema::decode_record_epoch(&key)? >= lowest_epoch {
                break;
            }
            source_keys.push(key);
        }

        let mut root_keys = Vec::new();
        for entry in txn.scan(Table::AttestationSigningRoots, pub_key.as_bytes())? {
            let (key, _) = entry.map_err(StoreError::from)?;
            if schema::decode_record_epoch(&key)? >= lowest_epoch {
                break;
            }
            root_keys.push(key);
        }
        drop(txn);

        if source_keys.is_empty() && root_keys.is_empty() {
            return Ok(());
        }

        let pruned = (source_keys.len(), root_keys.len());
        let mut txn = self.inner.engine.write_txn()?;
        for key in source_keys {
            txn.delete(Table::AttestationSourceEpochs, key)?;
        }
        for key in root_keys {
            txn.delete(Table::AttestationSigningRoots, key)?;
        }
        txn.commit()?;

        info!(
            %pub_key,
            lowest_epoch,
            pruned_sources = pruned.0,
            pruned_roots = pruned.1,
            "Pruned attestation records"
        );
        Ok(())
    }

    /// Whether `pub_key` was registered with this store.
    pub fn is_registered(&self, pub_key: &PublicKeyBytes) -> Result<bool> {
        self.ensure_open()?;
        let txn = self.inner.engine.read_txn()?;
        schema::is_registered(txn.as_ref(), pub_key)
    }
}
