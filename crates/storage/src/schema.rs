//! Key layout and record access for the per-validator history tables.
//!
//! Every record key is the 48-byte public key followed by an 8-byte
//! big-endian epoch (or slot). Big-endian ensures lexicographic ordering
//! matches numeric ordering, so a prefix scan over one validator walks its
//! history in ascending epoch order.

use slashguard_types::primitives::{Epoch, H256, PUBLIC_KEY_LENGTH, PublicKeyBytes, Slot};

use crate::api::{ReadTxn, Table, WriteTxn};
use crate::error::{Result, StoreError};

/// Length of a fully-qualified record key: pubkey prefix plus big-endian epoch.
const RECORD_KEY_LENGTH: usize = PUBLIC_KEY_LENGTH + 8;

/// Encode a record key: pubkey (48 bytes) || epoch (8 bytes big-endian).
pub(crate) fn encode_record_key(pub_key: &PublicKeyBytes, epoch: Epoch) -> Vec<u8> {
    let mut key = Vec::with_capacity(RECORD_KEY_LENGTH);
    key.extend_from_slice(pub_key.as_bytes());
    key.extend_from_slice(&epoch.to_be_bytes());
    key
}

/// Decode the epoch suffix of a record key.
pub(crate) fn decode_record_epoch(key: &[u8]) -> Result<Epoch> {
    let suffix: [u8; 8] = key
        .get(PUBLIC_KEY_LENGTH..)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| StoreError::storage("malformed record key"))?;
    Ok(u64::from_be_bytes(suffix))
}

/// Decode an epoch stored as a big-endian value.
pub(crate) fn decode_epoch_value(value: &[u8]) -> Result<Epoch> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| StoreError::storage("malformed epoch value"))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Decode a 32-byte signing root value.
pub(crate) fn decode_root_value(value: &[u8]) -> Result<H256> {
    if value.len() != 32 {
        return Err(StoreError::storage("malformed signing root value"));
    }
    Ok(H256::from_slice(value))
}

/// Mark a public key as belonging to this store.
pub(crate) fn register_validator(txn: &mut dyn WriteTxn, pub_key: &PublicKeyBytes) -> Result<()> {
    txn.put(Table::Validators, pub_key.as_bytes().to_vec(), Vec::new())?;
    Ok(())
}

pub(crate) fn is_registered(txn: &dyn ReadTxn, pub_key: &PublicKeyBytes) -> Result<bool> {
    Ok(txn.fetch(Table::Validators, pub_key.as_bytes())?.is_some())
}

/// Record `source -> target` in the validator's attestation history.
pub(crate) fn put_source_target(
    txn: &mut dyn WriteTxn,
    pub_key: &PublicKeyBytes,
    source: Epoch,
    target: Epoch,
) -> Result<()> {
    txn.put(
        Table::AttestationSourceEpochs,
        encode_record_key(pub_key, source),
        target.to_be_bytes().to_vec(),
    )?;
    Ok(())
}

/// Record `target -> signing_root` in the validator's attestation history.
pub(crate) fn put_target_root(
    txn: &mut dyn WriteTxn,
    pub_key: &PublicKeyBytes,
    target: Epoch,
    signing_root: H256,
) -> Result<()> {
    txn.put(
        Table::AttestationSigningRoots,
        encode_record_key(pub_key, target),
        signing_root.as_bytes().to_vec(),
    )?;
    Ok(())
}

/// Record `slot -> signing_root` in the validator's proposal history.
pub(crate) fn put_proposal_root(
    txn: &mut dyn WriteTxn,
    pub_key: &PublicKeyBytes,
    slot: Slot,
    signing_root: H256,
) -> Result<()> {
    txn.put(
        Table::ProposalRecords,
        encode_record_key(pub_key, slot),
        signing_root.as_bytes().to_vec(),
    )?;
    Ok(())
}

/// Signing root the validator attested with at `target`, if any.
pub(crate) fn root_for_target(
    txn: &dyn ReadTxn,
    pub_key: &PublicKeyBytes,
    target: Epoch,
) -> Result<Option<H256>> {
    txn.fetch(
        Table::AttestationSigningRoots,
        &encode_record_key(pub_key, target),
    )?
    .map(|value| decode_root_value(&value))
    .transpose()
}

/// Signing root the validator proposed with at `slot`, if any.
pub(crate) fn root_for_slot(
    txn: &dyn ReadTxn,
    pub_key: &PublicKeyBytes,
    slot: Slot,
) -> Result<Option<H256>> {
    txn.fetch(Table::ProposalRecords, &encode_record_key(pub_key, slot))?
        .map(|value| decode_root_value(&value))
        .transpose()
}

/// The lowest source epoch in the validator's attestation history.
pub(crate) fn lowest_source(txn: &dyn ReadTxn, pub_key: &PublicKeyBytes) -> Result<Option<Epoch>> {
    first_epoch_in_table(txn, Table::AttestationSourceEpochs, pub_key)
}

/// The lowest target epoch in the validator's attestation history.
pub(crate) fn lowest_target(txn: &dyn ReadTxn, pub_key: &PublicKeyBytes) -> Result<Option<Epoch>> {
    first_epoch_in_table(txn, Table::AttestationSigningRoots, pub_key)
}

fn first_epoch_in_table(
    txn: &dyn ReadTxn,
    table: Table,
    pub_key: &PublicKeyBytes,
) -> Result<Option<Epoch>> {
    txn.scan(table, pub_key.as_bytes())?
        .next()
        .transpose()
        .map_err(StoreError::from)?
        .map(|(key, _)| decode_record_epoch(&key))
        .transpose()
}

/// Iterate the validator's `(source, target)` pairs in ascending source order.
pub(crate) fn iter_source_targets<'a>(
    txn: &'a dyn ReadTxn,
    pub_key: &PublicKeyBytes,
) -> Result<impl Iterator<Item = Result<(Epoch, Epoch)>> + 'a> {
    let iter = txn.scan(Table::AttestationSourceEpochs, pub_key.as_bytes())?;
    Ok(iter.map(|entry| {
        let (key, value) = entry.map_err(StoreError::from)?;
        Ok((decode_record_epoch(&key)?, decode_epoch_value(&value)?))
    }))
}

/// Iterate the validator's `(source, target)` pairs in descending source
/// order, starting at the largest stored source not above `source`.
pub(crate) fn iter_source_targets_descending_from<'a>(
    txn: &'a dyn ReadTxn,
    pub_key: &PublicKeyBytes,
    source: Epoch,
) -> Result<impl Iterator<Item = Result<(Epoch, Epoch)>> + 'a> {
    let iter = txn.scan_rev(
        Table::AttestationSourceEpochs,
        pub_key.as_bytes(),
        &encode_record_key(pub_key, source),
    )?;
    Ok(iter.map(|entry| {
        let (key, value) = entry.map_err(StoreError::from)?;
        Ok((decode_record_epoch(&key)?, decode_epoch_value(&value)?))
    }))
}

/// The highest source epoch in the validator's attestation history.
pub(crate) fn highest_source(txn: &dyn ReadTxn, pub_key: &PublicKeyBytes) -> Result<Option<Epoch>> {
    match iter_source_targets_descending_from(txn, pub_key, Epoch::MAX)?.next() {
        Some(entry) => Ok(Some(entry?.0)),
        None => Ok(None),
    }
}

/// The highest target epoch in the validator's attestation history.
pub(crate) fn highest_target(txn: &dyn ReadTxn, pub_key: &PublicKeyBytes) -> Result<Option<Epoch>> {
    txn.scan_rev(
        Table::AttestationSigningRoots,
        pub_key.as_bytes(),
        &encode_record_key(pub_key, Epoch::MAX),
    )?
    .next()
    .transpose()
    .map_err(StoreError::from)?
    .map(|(key, _)| decode_record_epoch(&key))
    .transpose()
}

/// Distinct public keys holding records in `table`.
///
/// Iteration is ordered by full key, so all records of one validator are
/// adjacent and deduplication only has to look at the previous prefix.
pub(crate) fn public_keys_in_table(txn: &dyn ReadTxn, table: Table) -> Result<Vec<PublicKeyBytes>> {
    let mut keys: Vec<PublicKeyBytes> = Vec::new();
    for entry in txn.scan(table, &[])? {
        let (key, _) = entry.map_err(StoreError::from)?;
        let pub_key = key
            .get(..PUBLIC_KEY_LENGTH)
            .and_then(PublicKeyBytes::from_slice)
            .ok_or_else(|| StoreError::storage("malformed record key"))?;
        if keys.last() != Some(&pub_key) {
            keys.push(pub_key);
        }
    }
    Ok(keys)
}
