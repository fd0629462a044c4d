//! Account key material.

use zeroize::Zeroize;

/// Length of an account key in bytes.
pub const ACCOUNT_KEY_LEN: usize = 16;

/// A 16-byte secret shared with a paired device.
///
/// The key proves set membership through the account key filter and seeds the
/// RRD key derivation. The persistent key store owns the canonical copy; this
/// type holds a working copy for the duration of one generation cycle.
///
/// Key bytes are zeroed on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountKey {
    bytes: [u8; ACCOUNT_KEY_LEN],
}

impl AccountKey {
    /// Create a key from raw bytes.
    pub fn new(bytes: [u8; ACCOUNT_KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Key bytes in canonical (big-endian) order.
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_KEY_LEN] {
        &self.bytes
    }

    /// Overwrite the first byte of this copy.
    ///
    /// Used by the generation cycle to tag the in-use key in its *working*
    /// copy of the key list. The stored original is never mutated.
    pub fn set_tag(&mut self, tag: u8) {
        self.bytes[0] = tag;
    }
}

impl From<[u8; ACCOUNT_KEY_LEN]> for AccountKey {
    fn from(bytes: [u8; ACCOUNT_KEY_LEN]) -> Self {
        Self::new(bytes)
    }
}

// Zeroize key material on drop
impl Drop for AccountKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccountKey(..)")
    }
}
