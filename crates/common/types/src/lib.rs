pub mod attestation;
pub mod primitives;

/// Display helper for truncated hex dumps of keys and roots (8 hex chars)
pub struct ShortHex<'a>(pub &'a [u8]);

impl std::fmt::Display for ShortHex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0.iter().take(4) {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
