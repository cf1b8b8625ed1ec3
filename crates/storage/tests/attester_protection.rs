//! End-to-end tests for attestation slashing protection: double votes,
//! surround votes across the weak-subjectivity horizon, and the concurrent
//! batch-write path with its observable log lines.

use std::sync::{Arc, Mutex};

use slashguard_storage::{
    ATTESTATION_BATCH_CAPACITY, KvEngine, ReadTxn, SlashingKind, Store, StoreError, Table,
    WriteTxn,
    backend::{MemoryEngine, RocksDbEngine},
};
use slashguard_types::attestation::AttestationData;
use slashguard_types::primitives::{Epoch, H256, PUBLIC_KEY_LENGTH, PublicKeyBytes};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

// ============ Log capture ============

/// Collects formatted log output so tests can assert on the literal
/// messages the batching layer emits.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contains(&self, needle: &str) -> bool {
        String::from_utf8_lossy(&self.0.lock().unwrap()).contains(needle)
    }
}

struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(Arc::clone(&self.0))
    }
}

/// Install a buffering subscriber for the current test.
///
/// The tests run on the current-thread runtime, so the store's flusher task
/// is polled on this thread and its events land in the returned buffer.
fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(buffer.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

// ============ Helpers ============

fn pub_key_for_index(index: usize) -> PublicKeyBytes {
    let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
    bytes[..8].copy_from_slice(&(index as u64).to_be_bytes());
    PublicKeyBytes::new(bytes)
}

/// Signing root used by the batch tests: the decimal digits of the saver's
/// index written into the front of a zeroed 32-byte value.
fn indexed_root(index: usize) -> H256 {
    let mut root = [0u8; 32];
    let digits = index.to_string();
    root[..digits.len()].copy_from_slice(digits.as_bytes());
    H256(root)
}

fn record_key(pub_key: &PublicKeyBytes, epoch: Epoch) -> Vec<u8> {
    let mut key = pub_key.as_bytes().to_vec();
    key.extend_from_slice(&epoch.to_be_bytes());
    key
}

// ============ Double votes ============

#[tokio::test]
async fn check_slashable_attestation_double_vote() {
    struct Case {
        name: &'static str,
        existing: AttestationData,
        existing_root: H256,
        incoming: AttestationData,
        incoming_root: H256,
        slashable: bool,
    }

    let cases = [
        Case {
            name: "different signing root at same target equals a double vote",
            existing: AttestationData::with_epochs(0, 1),
            existing_root: H256::repeat_byte(1),
            incoming: AttestationData::with_epochs(0, 1),
            incoming_root: H256::repeat_byte(2),
            slashable: true,
        },
        Case {
            name: "same signing root at same target is safe",
            existing: AttestationData::with_epochs(0, 1),
            existing_root: H256::repeat_byte(1),
            incoming: AttestationData::with_epochs(0, 1),
            incoming_root: H256::repeat_byte(1),
            slashable: false,
        },
        Case {
            name: "different signing root at different target is safe",
            existing: AttestationData::with_epochs(0, 1),
            existing_root: H256::repeat_byte(1),
            incoming: AttestationData::with_epochs(0, 2),
            incoming_root: H256::repeat_byte(2),
            slashable: false,
        },
        Case {
            name: "no data stored at target should not be considered a double vote",
            existing: AttestationData::with_epochs(0, 1),
            existing_root: H256::repeat_byte(1),
            incoming: AttestationData::with_epochs(0, 2),
            incoming_root: H256::repeat_byte(1),
            slashable: false,
        },
    ];

    let pub_key = pub_key_for_index(0);
    let store = Store::with_engine(Arc::new(MemoryEngine::new()), &[pub_key]).unwrap();
    let ctx = CancellationToken::new();

    for case in cases {
        store
            .save_attestation_for_pub_key(&ctx, pub_key, case.existing_root, &case.existing)
            .await
            .unwrap_or_else(|err| panic!("{}: save failed: {err}", case.name));

        let result = store.check_slashable_attestation(&pub_key, case.incoming_root, &case.incoming);
        if case.slashable {
            match result {
                Err(StoreError::Slashable(kind)) => {
                    assert_eq!(kind, SlashingKind::DoubleVote, "{}", case.name)
                }
                other => panic!("{}: expected double vote, got {other:?}", case.name),
            }
        } else {
            match result {
                Ok(SlashingKind::NotSlashable) => {}
                other => panic!("{}: expected safe verdict, got {other:?}", case.name),
            }
        }
    }

    store.close().await.unwrap();
}

// ============ Surround votes ============

#[tokio::test]
async fn check_slashable_attestation_surround_vote_54k_epochs() {
    const NUM_EPOCHS: Epoch = 54_000;

    let pub_key = pub_key_for_index(0);
    let engine = Arc::new(MemoryEngine::new());
    let store = Store::with_engine(engine.clone(), &[pub_key]).unwrap();

    // Attest to every (source = epoch - 1, target = epoch) sequential pair
    // since genesis up to and including the weak subjectivity period epoch,
    // seeded directly through the engine.
    {
        let mut txn = engine.write_txn().unwrap();
        for epoch in 1..NUM_EPOCHS {
            txn.put(
                Table::AttestationSourceEpochs,
                record_key(&pub_key, epoch - 1),
                epoch.to_be_bytes().to_vec(),
            )
            .unwrap();
        }
        txn.commit().unwrap();
    }

    let cases = [
        (
            "surround vote at half of the weak subjectivity period",
            NUM_EPOCHS / 2,
            NUM_EPOCHS,
            Some(SlashingKind::SurroundingVote),
        ),
        (
            "spanning genesis to weak subjectivity period surround vote",
            0,
            NUM_EPOCHS,
            Some(SlashingKind::SurroundingVote),
        ),
        (
            "simple surround vote at end of weak subjectivity period",
            NUM_EPOCHS - 3,
            NUM_EPOCHS,
            Some(SlashingKind::SurroundingVote),
        ),
        ("non-slashable vote", NUM_EPOCHS, NUM_EPOCHS + 1, None),
    ];

    for (name, source, target, expected) in cases {
        let data = AttestationData::with_epochs(source, target);
        let result = store.check_slashable_attestation(&pub_key, H256::zero(), &data);
        match expected {
            Some(kind) => match result {
                Err(StoreError::Slashable(found)) => assert_eq!(found, kind, "{name}"),
                other => panic!("{name}: expected {kind:?}, got {other:?}"),
            },
            None => match result {
                Ok(SlashingKind::NotSlashable) => {}
                other => panic!("{name}: expected safe verdict, got {other:?}"),
            },
        }
    }

    store.close().await.unwrap();
}

// ============ Batched writes ============

#[tokio::test]
async fn save_attestation_batch_writes_full_capacity() {
    let (logs, _guard) = capture_logs();

    let pub_keys: Vec<_> = (0..ATTESTATION_BATCH_CAPACITY)
        .map(pub_key_for_index)
        .collect();
    let engine = Arc::new(MemoryEngine::new());
    let store = Store::with_engine(engine.clone(), &pub_keys).unwrap();
    let ctx = CancellationToken::new();

    // For each public key, save one attestation concurrently; the last
    // enqueue fills the batch and forces a flush before the write interval.
    let handles: Vec<_> = pub_keys
        .iter()
        .copied()
        .enumerate()
        .map(|(i, pub_key)| {
            let store = store.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let data = AttestationData::with_epochs(i as Epoch, i as Epoch + 1);
                store
                    .save_attestation_for_pub_key(&ctx, pub_key, indexed_root(i), &data)
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(logs.contains("Reached max capacity of batched attestation records"));
    assert!(!logs.contains("Batched attestation records write interval reached"));
    assert!(logs.contains("Successfully flushed batched attestations to DB"));
    assert_eq!(store.batched_attestation_count().await, 0);

    verify_batch_records(engine.as_ref(), &pub_keys);
    store.close().await.unwrap();
}

#[tokio::test]
async fn save_attestation_batch_writes_low_capacity_timer_reached() {
    let (logs, _guard) = capture_logs();

    // Half the batch capacity: the queue never fills, so the flush must
    // come from the write interval instead.
    let pub_keys: Vec<_> = (0..ATTESTATION_BATCH_CAPACITY / 2)
        .map(pub_key_for_index)
        .collect();
    let engine = Arc::new(MemoryEngine::new());
    let store = Store::with_engine(engine.clone(), &pub_keys).unwrap();
    let ctx = CancellationToken::new();

    let handles: Vec<_> = pub_keys
        .iter()
        .copied()
        .enumerate()
        .map(|(i, pub_key)| {
            let store = store.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let data = AttestationData::with_epochs(i as Epoch, i as Epoch + 1);
                store
                    .save_attestation_for_pub_key(&ctx, pub_key, indexed_root(i), &data)
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(!logs.contains("Reached max capacity of batched attestation records"));
    assert!(logs.contains("Batched attestation records write interval reached"));
    assert!(logs.contains("Successfully flushed batched attestations to DB"));
    assert_eq!(store.batched_attestation_count().await, 0);

    verify_batch_records(engine.as_ref(), &pub_keys);
    store.close().await.unwrap();
}

/// Verify both halves of every batched record landed on disk.
fn verify_batch_records(engine: &dyn KvEngine, pub_keys: &[PublicKeyBytes]) {
    let txn = engine.read_txn().unwrap();
    for (i, pub_key) in pub_keys.iter().enumerate() {
        let source = i as Epoch;
        let target = source + 1;

        let saved_target = txn
            .fetch(Table::AttestationSourceEpochs, &record_key(pub_key, source))
            .unwrap();
        assert_eq!(saved_target, Some(target.to_be_bytes().to_vec()));

        let saved_root = txn
            .fetch(Table::AttestationSigningRoots, &record_key(pub_key, target))
            .unwrap();
        assert_eq!(saved_root, Some(indexed_root(i).as_bytes().to_vec()));
    }
}

// ============ Persistence ============

#[tokio::test]
async fn reopening_preserves_attestation_records() {
    let dir = tempfile::tempdir().unwrap();
    let pub_key = pub_key_for_index(7);
    let ctx = CancellationToken::new();
    let data = AttestationData::with_epochs(4, 5);

    {
        let store = Store::open(dir.path(), &[pub_key]).unwrap();
        store
            .save_attestation_for_pub_key(&ctx, pub_key, H256::repeat_byte(0xaa), &data)
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    {
        let store = Store::open(dir.path(), &[pub_key]).unwrap();
        assert_eq!(
            store
                .check_slashable_attestation(&pub_key, H256::repeat_byte(0xaa), &data)
                .unwrap(),
            SlashingKind::NotSlashable
        );
        assert!(matches!(
            store.check_slashable_attestation(&pub_key, H256::repeat_byte(0xbb), &data),
            Err(StoreError::Slashable(SlashingKind::DoubleVote))
        ));
        store.close().await.unwrap();
    }

    // The records survive reopening bit for bit.
    let engine = RocksDbEngine::open(dir.path()).unwrap();
    let txn = engine.read_txn().unwrap();
    assert_eq!(
        txn.fetch(Table::AttestationSourceEpochs, &record_key(&pub_key, 4))
            .unwrap(),
        Some(5u64.to_be_bytes().to_vec())
    );
    assert_eq!(
        txn.fetch(Table::AttestationSigningRoots, &record_key(&pub_key, 5))
            .unwrap(),
        Some(H256::repeat_byte(0xaa).as_bytes().to_vec())
    );
}

#[tokio::test]
async fn clear_db_removes_the_store_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("protection");
    let pub_key = pub_key_for_index(1);

    let store = Store::open(&path, &[pub_key]).unwrap();
    assert!(matches!(
        store.clear_db(),
        Err(StoreError::InvalidInput(_))
    ));
    store.close().await.unwrap();
    store.clear_db().unwrap();
    assert!(!path.exists());
}
