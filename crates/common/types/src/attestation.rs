use crate::primitives::{Epoch, H256, Slot};

/// A justified or finalized point on the chain as seen by a validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Checkpoint {
    /// The first epoch of the checkpoint's justification period.
    pub epoch: Epoch,

    /// Root of the checkpoint block.
    pub root: H256,
}

impl Checkpoint {
    pub fn at_epoch(epoch: Epoch) -> Self {
        Self {
            epoch,
            root: H256::zero(),
        }
    }
}

/// Attestation content describing the validator's observed chain view.
///
/// The slashing predicates consume only `source.epoch` and `target.epoch`;
/// the remaining fields ride along so callers can hand over the data they
/// are about to sign without reshaping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttestationData {
    /// The slot for which the attestation is made.
    pub slot: Slot,

    /// The checkpoint representing the source block as observed by the validator.
    pub source: Checkpoint,

    /// The checkpoint representing the target block as observed by the validator.
    pub target: Checkpoint,
}

impl AttestationData {
    /// Build attestation data carrying only the `(source, target)` epoch pair.
    pub fn with_epochs(source: Epoch, target: Epoch) -> Self {
        Self {
            slot: 0,
            source: Checkpoint::at_epoch(source),
            target: Checkpoint::at_epoch(target),
        }
    }
}
