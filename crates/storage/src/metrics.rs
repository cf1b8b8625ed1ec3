//! Prometheus metrics for the slashing protection store.

/// Increment the slashing check counter for a verdict.
pub fn inc_slashing_checks(verdict: &str) {
    static SLASHGUARD_CHECKS_TOTAL: std::sync::LazyLock<prometheus::IntCounterVec> =
        std::sync::LazyLock::new(|| {
            prometheus::register_int_counter_vec!(
                "slashguard_checks_total",
                "Count of slashing checks by verdict",
                &["verdict"]
            )
            .unwrap()
        });
    SLASHGUARD_CHECKS_TOTAL.with_label_values(&[verdict]).inc();
}

/// Increment the batched attestation flush counter for a trigger.
pub fn inc_attestation_batch_flushes(trigger: &str) {
    static SLASHGUARD_ATTESTATION_BATCH_FLUSHES_TOTAL: std::sync::LazyLock<
        prometheus::IntCounterVec,
    > = std::sync::LazyLock::new(|| {
        prometheus::register_int_counter_vec!(
            "slashguard_attestation_batch_flushes_total",
            "Count of batched attestation flushes by trigger",
            &["trigger"]
        )
        .unwrap()
    });
    SLASHGUARD_ATTESTATION_BATCH_FLUSHES_TOTAL
        .with_label_values(&[trigger])
        .inc();
}

/// Increment the flushed attestation record counter.
pub fn inc_flushed_attestation_records(count: u64) {
    static SLASHGUARD_FLUSHED_ATTESTATION_RECORDS_TOTAL: std::sync::LazyLock<
        prometheus::IntCounter,
    > = std::sync::LazyLock::new(|| {
        prometheus::register_int_counter!(
            "slashguard_flushed_attestation_records_total",
            "Count of attestation records written through batched flushes"
        )
        .unwrap()
    });
    SLASHGUARD_FLUSHED_ATTESTATION_RECORDS_TOTAL.inc_by(count);
}

/// Increment the saved proposal record counter.
pub fn inc_saved_proposal_records() {
    static SLASHGUARD_SAVED_PROPOSAL_RECORDS_TOTAL: std::sync::LazyLock<prometheus::IntCounter> =
        std::sync::LazyLock::new(|| {
            prometheus::register_int_counter!(
                "slashguard_saved_proposal_records_total",
                "Count of proposal records written"
            )
            .unwrap()
        });
    SLASHGUARD_SAVED_PROPOSAL_RECORDS_TOTAL.inc();
}
