/// Tables in the storage layer.
///
/// Every key is prefixed with the 48-byte validator public key, so a prefix
/// scan over one table yields a single validator's records in ascending
/// epoch (or slot) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Registered validator public keys: pubkey -> empty marker
    Validators,
    /// Attestation history: (pubkey || source_epoch_be) -> target_epoch_be
    AttestationSourceEpochs,
    /// Attestation signing roots: (pubkey || target_epoch_be) -> signing_root[32]
    AttestationSigningRoots,
    /// Proposal history: (pubkey || slot_be) -> signing_root[32]
    ProposalRecords,
}

impl Table {
    /// On-disk name of the table.
    ///
    /// These bytes are the compatibility surface of the database file and
    /// must never change across versions.
    pub fn name(self) -> &'static str {
        match self {
            Table::Validators => "validators",
            Table::AttestationSourceEpochs => "attestation_source_epochs",
            Table::AttestationSigningRoots => "attestation_signing_roots",
            Table::ProposalRecords => "proposal_records",
        }
    }
}

/// All table variants.
pub const ALL_TABLES: [Table; 4] = [
    Table::Validators,
    Table::AttestationSourceEpochs,
    Table::AttestationSigningRoots,
    Table::ProposalRecords,
];
