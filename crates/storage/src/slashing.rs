//! Slashing predicates: double-vote and surround-vote detection.
//!
//! The predicates are pure readers. They classify a candidate attestation
//! against a validator's stored history and never mutate it; the facade
//! decides what to do with the verdict.

use slashguard_types::attestation::AttestationData;
use slashguard_types::primitives::{H256, PublicKeyBytes};

use crate::api::ReadTxn;
use crate::error::Result;
use crate::schema;

/// Verdict of checking a candidate message against a validator's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashingKind {
    /// Signing the candidate is safe.
    NotSlashable,
    /// A different signing root already exists at the candidate's target
    /// epoch (attestations) or slot (proposals).
    DoubleVote,
    /// The candidate strictly contains a stored attestation's
    /// `(source, target)` span.
    SurroundingVote,
    /// A stored attestation strictly contains the candidate's span.
    SurroundedVote,
}

impl SlashingKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::NotSlashable => "not_slashable",
            Self::DoubleVote => "double_vote",
            Self::SurroundingVote => "surrounding_vote",
            Self::SurroundedVote => "surrounded_vote",
        }
    }
}

impl std::fmt::Display for SlashingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotSlashable => "not slashable",
            Self::DoubleVote => "double vote",
            Self::SurroundingVote => "surrounding vote",
            Self::SurroundedVote => "surrounded vote",
        };
        f.write_str(name)
    }
}

/// Classify a candidate attestation against the validator's stored history.
///
/// The double-vote lookup is a single point read, so it runs first; the
/// surround scan walks the source-epoch history only when that lookup is
/// clean.
pub(crate) fn check_attestation(
    txn: &dyn ReadTxn,
    pub_key: &PublicKeyBytes,
    signing_root: H256,
    data: &AttestationData,
) -> Result<SlashingKind> {
    let kind = check_double_vote(txn, pub_key, signing_root, data)?;
    if kind != SlashingKind::NotSlashable {
        return Ok(kind);
    }
    check_surround_vote(txn, pub_key, data)
}

/// Double votes are keyed by target epoch alone: two attestations with the
/// same target but different signing roots are slashable regardless of
/// their sources. Re-signing identical data is safe.
fn check_double_vote(
    txn: &dyn ReadTxn,
    pub_key: &PublicKeyBytes,
    signing_root: H256,
    data: &AttestationData,
) -> Result<SlashingKind> {
    match schema::root_for_target(txn, pub_key, data.target.epoch)? {
        None => Ok(SlashingKind::NotSlashable),
        Some(existing) if existing == signing_root => Ok(SlashingKind::NotSlashable),
        Some(_) => Ok(SlashingKind::DoubleVote),
    }
}

/// Scan the validator's `(source, target)` history for a span that strictly
/// contains, or is strictly contained by, the candidate's span. Equal source
/// or equal target on either side is never surround.
fn check_surround_vote(
    txn: &dyn ReadTxn,
    pub_key: &PublicKeyBytes,
    data: &AttestationData,
) -> Result<SlashingKind> {
    let source = data.source.epoch;
    let target = data.target.epoch;

    for entry in schema::iter_source_targets(txn, pub_key)? {
        let (stored_source, stored_target) = entry?;
        if stored_source < source {
            if stored_target > target {
                return Ok(SlashingKind::SurroundedVote);
            }
        } else if stored_source > source {
            if stored_target < target {
                return Ok(SlashingKind::SurroundingVote);
            }
            // An honest signer's history is weakly monotone: every entry
            // past this one carries a target at least as high, so neither
            // clause can match further on.
            break;
        }
        // stored_source == source: never surround, keep scanning.
    }
    Ok(SlashingKind::NotSlashable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{KvEngine, WriteTxn};
    use crate::backend::MemoryEngine;
    use slashguard_types::primitives::{Epoch, PUBLIC_KEY_LENGTH};

    fn pub_key() -> PublicKeyBytes {
        PublicKeyBytes::new([42; PUBLIC_KEY_LENGTH])
    }

    fn engine_with_history(history: &[(Epoch, Epoch)]) -> MemoryEngine {
        let engine = MemoryEngine::new();
        let mut txn = engine.write_txn().unwrap();
        for (source, target) in history {
            schema::put_source_target(txn.as_mut(), &pub_key(), *source, *target).unwrap();
        }
        txn.commit().unwrap();
        engine
    }

    fn surround_verdict(engine: &MemoryEngine, source: Epoch, target: Epoch) -> SlashingKind {
        let txn = engine.read_txn().unwrap();
        let data = AttestationData::with_epochs(source, target);
        check_surround_vote(txn.as_ref(), &pub_key(), &data).unwrap()
    }

    #[test]
    fn empty_history_is_safe() {
        let engine = engine_with_history(&[]);
        assert_eq!(surround_verdict(&engine, 0, 1), SlashingKind::NotSlashable);
    }

    #[test]
    fn candidate_surrounding_stored_span() {
        let engine = engine_with_history(&[(3, 4)]);
        assert_eq!(
            surround_verdict(&engine, 2, 5),
            SlashingKind::SurroundingVote
        );
    }

    #[test]
    fn candidate_surrounded_by_stored_span() {
        let engine = engine_with_history(&[(1, 10)]);
        assert_eq!(
            surround_verdict(&engine, 2, 5),
            SlashingKind::SurroundedVote
        );
    }

    #[test]
    fn equal_source_is_not_surround() {
        let engine = engine_with_history(&[(2, 4)]);
        assert_eq!(surround_verdict(&engine, 2, 5), SlashingKind::NotSlashable);
        assert_eq!(surround_verdict(&engine, 2, 3), SlashingKind::NotSlashable);
    }

    #[test]
    fn equal_target_is_not_surround() {
        let engine = engine_with_history(&[(2, 4)]);
        assert_eq!(surround_verdict(&engine, 1, 4), SlashingKind::NotSlashable);
        assert_eq!(surround_verdict(&engine, 3, 4), SlashingKind::NotSlashable);
    }

    #[test]
    fn disjoint_spans_are_safe() {
        let engine = engine_with_history(&[(2, 4)]);
        assert_eq!(surround_verdict(&engine, 4, 6), SlashingKind::NotSlashable);
        assert_eq!(surround_verdict(&engine, 0, 2), SlashingKind::NotSlashable);
    }

    #[test]
    fn double_vote_requires_differing_root() {
        let engine = MemoryEngine::new();
        let mut txn = engine.write_txn().unwrap();
        schema::put_target_root(txn.as_mut(), &pub_key(), 7, H256::repeat_byte(1)).unwrap();
        txn.commit().unwrap();

        let txn = engine.read_txn().unwrap();
        let data = AttestationData::with_epochs(6, 7);
        let same = check_double_vote(txn.as_ref(), &pub_key(), H256::repeat_byte(1), &data).unwrap();
        assert_eq!(same, SlashingKind::NotSlashable);
        let different =
            check_double_vote(txn.as_ref(), &pub_key(), H256::repeat_byte(2), &data).unwrap();
        assert_eq!(different, SlashingKind::DoubleVote);
        let elsewhere = AttestationData::with_epochs(6, 8);
        let clean =
            check_double_vote(txn.as_ref(), &pub_key(), H256::repeat_byte(2), &elsewhere).unwrap();
        assert_eq!(clean, SlashingKind::NotSlashable);
    }
}
