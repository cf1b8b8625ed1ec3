pub use ethereum_types::H256;

/// An epoch number on the beacon chain.
pub type Epoch = u64;

/// A slot number on the beacon chain.
pub type Slot = u64;

/// Length in bytes of a compressed validator public key.
pub const PUBLIC_KEY_LENGTH: usize = 48;

/// A compressed validator public key.
///
/// The store never interprets these bytes cryptographically; they identify
/// the signer and name the per-validator record namespace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKeyBytes([u8; PUBLIC_KEY_LENGTH]);

impl Default for PublicKeyBytes {
    fn default() -> Self {
        Self([0; PUBLIC_KEY_LENGTH])
    }
}

impl PublicKeyBytes {
    pub const fn new(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Parse a key from a byte slice. Fails unless the slice is exactly
    /// [`PUBLIC_KEY_LENGTH`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl From<[u8; PUBLIC_KEY_LENGTH]> for PublicKeyBytes {
    fn from(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for PublicKeyBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for PublicKeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", crate::ShortHex(&self.0))
    }
}

impl std::fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
