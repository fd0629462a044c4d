//! Key derivation and IV construction for random resolvable data.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::{account_key::ACCOUNT_KEY_LEN, error::CryptoError};

/// Length of the AES-CTR initialization vector.
pub const IV_LEN: usize = 16;

/// Derive a 16-byte key from an account key via HKDF-SHA256.
///
/// No salt enters the derivation; per-advertisement variation comes from the
/// IV instead. The `info` label binds the derived key to its purpose
/// ([`crate::fields::RRD_KEY_INFO`] for the RRD pipeline).
///
/// # Errors
///
/// - `CryptoError::KeyExpansion` if HKDF rejects the output length. Not
///   reachable for 16 bytes, but propagated rather than assumed away.
pub fn derive_key(
    ikm: &[u8; ACCOUNT_KEY_LEN],
    info: &[u8],
) -> Result<[u8; ACCOUNT_KEY_LEN], CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = [0u8; ACCOUNT_KEY_LEN];
    hkdf.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyExpansion { requested: ACCOUNT_KEY_LEN })?;

    Ok(okm)
}

/// Build the 16-byte AES-CTR initialization vector from the cycle salt.
///
/// Layout:
/// - bytes 0-1: salt (big-endian)
/// - bytes 2-15: zero
pub fn build_iv(salt: u16) -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    iv[0..2].copy_from_slice(&salt.to_be_bytes());
    iv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::RRD_KEY_INFO;

    #[test]
    fn derive_is_deterministic() {
        let ikm = [0x11; 16];

        let a = derive_key(&ikm, RRD_KEY_INFO).unwrap();
        let b = derive_key(&ikm, RRD_KEY_INFO).unwrap();

        assert_eq!(a, b, "same inputs must produce same output");
    }

    #[test]
    fn different_account_keys_produce_different_rrd_keys() {
        let a = derive_key(&[0x11; 16], RRD_KEY_INFO).unwrap();
        let b = derive_key(&[0x22; 16], RRD_KEY_INFO).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn different_labels_produce_different_keys() {
        let ikm = [0x11; 16];

        let rrd = derive_key(&ikm, RRD_KEY_INFO).unwrap();
        let other = derive_key(&ikm, b"some-other-purpose").unwrap();

        assert_ne!(rrd, other);
    }

    #[test]
    fn derived_key_differs_from_input() {
        let ikm = [0x11; 16];
        assert_ne!(derive_key(&ikm, RRD_KEY_INFO).unwrap(), ikm);
    }

    #[test]
    fn iv_carries_big_endian_salt_then_zeros() {
        let iv = build_iv(0xC7C8);

        assert_eq!(iv[0], 0xC7);
        assert_eq!(iv[1], 0xC8);
        assert_eq!(&iv[2..], &[0u8; 14]);
    }

    #[test]
    fn iv_of_zero_salt_is_all_zero() {
        assert_eq!(build_iv(0), [0u8; IV_LEN]);
    }
}
