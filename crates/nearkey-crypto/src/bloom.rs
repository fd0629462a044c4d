//! Account key filter construction.
//!
//! The filter is a salted Bloom filter over the full set of account keys. A
//! scanner holding one of the keys recomputes that key's bit positions and
//! checks them against the advertised bits; the advertiser never reveals
//! which keys it holds. Collisions are expected and accepted.
//!
//! # Buffer layout
//!
//! ```text
//! [flags: 1][size << 4 | type: 1][filter bits: size][salt descriptor: 1][salt: 2 BE]
//! ```
//!
//! The layout is fixed by the scanner's parser; every byte here is
//! interoperability-critical.

use crate::{
    account_key::{ACCOUNT_KEY_LEN, AccountKey},
    fields::{ADV_FLAGS, FILTER_FIELD_TYPE, SALT_FIELD_DESCRIPTOR},
};

/// Number of digest bytes consumed per key (8 big-endian byte pairs).
const DIGEST_PREFIX_LEN: usize = 16;

/// Filter size in bytes for a given key count.
///
/// Zero keys means no filter at all; otherwise the wire protocol fixes the
/// sizing at `6 * n / 5 + 3` (integer division).
pub fn filter_size(key_count: usize) -> usize {
    if key_count == 0 { 0 } else { 6 * key_count / 5 + 3 }
}

/// Assemble the hash input for one account key.
///
/// Layout: key bytes (tagged working copy for the in-use key), salt
/// (big-endian), battery status bytes, RRD bytes. The salt, battery, and RRD
/// fields are identical for every key within one generation cycle; only the
/// key bytes vary.
pub fn hash_input(key: &AccountKey, salt: u16, battery: &[u8], rrd: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(ACCOUNT_KEY_LEN + 2 + battery.len() + rrd.len());
    input.extend_from_slice(key.as_bytes());
    input.extend_from_slice(&salt.to_be_bytes());
    input.extend_from_slice(battery);
    input.extend_from_slice(rrd);
    input
}

/// A filter buffer under construction.
///
/// Created with the TLV skeleton in place and all filter bits zero; one
/// [`apply_digest`](Self::apply_digest) call per key sets that key's bits.
/// The buffer is write-once per generation cycle and published whole, so a
/// reader never observes a partially hashed filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterBuffer {
    buf: Vec<u8>,
    size: usize,
}

impl FilterBuffer {
    /// Allocate the skeleton for `key_count` keys with the given salt.
    ///
    /// For an empty key set this is the empty buffer: the advertisement then
    /// carries no filter field at all.
    pub fn new(key_count: usize, salt: u16) -> Self {
        let size = filter_size(key_count);
        if size == 0 {
            return Self { buf: Vec::new(), size };
        }

        let mut buf = Vec::with_capacity(size + 5);
        buf.push(ADV_FLAGS);
        buf.push(((size as u8) << 4) | FILTER_FIELD_TYPE);
        buf.resize(2 + size, 0);
        buf.push(SALT_FIELD_DESCRIPTOR);
        buf.extend_from_slice(&salt.to_be_bytes());

        Self { buf, size }
    }

    /// Set one key's bits from its hash digest.
    ///
    /// The first 16 digest bytes are read as 8 consecutive big-endian byte
    /// pairs; each pair, widened to 32 bits and reduced modulo the bit count,
    /// selects one bit to set. The digest must already be in canonical order
    /// (normalized back from the engine).
    pub fn apply_digest(&mut self, digest: &[u8; 32]) {
        if self.size == 0 {
            return;
        }

        let bit_count = self.size * 8;
        for pair in digest[..DIGEST_PREFIX_LEN].chunks_exact(2) {
            let value = u32::from(u16::from_be_bytes([pair[0], pair[1]]));
            let index = value as usize % bit_count;
            self.buf[2 + index / 8] |= 1 << (index % 8);
        }
    }

    /// Filter size in bytes (the bit region only, excluding TLV overhead).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Complete buffer, skeleton plus whatever bits have been applied.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the builder and take the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn size_formula_matches_protocol() {
        assert_eq!(filter_size(0), 0);
        assert_eq!(filter_size(1), 4);
        assert_eq!(filter_size(2), 5);
        assert_eq!(filter_size(5), 9);
        assert_eq!(filter_size(10), 15);
        assert_eq!(filter_size(50), 63);
    }

    #[test]
    fn skeleton_layout_for_three_keys() {
        let filter = FilterBuffer::new(3, 0xC7C8);
        let bytes = filter.as_bytes();

        assert_eq!(bytes.len(), 11);
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], 0x60, "descriptor is (size << 4) | filter type");
        assert_eq!(&bytes[2..8], &[0u8; 6], "bit region starts zeroed");
        assert_eq!(&bytes[8..], &[0x01, 0xC7, 0xC8], "salt field");
    }

    #[test]
    fn empty_key_set_produces_empty_buffer() {
        let filter = FilterBuffer::new(0, 0x1234);
        assert_eq!(filter.as_bytes().len(), 0);
        assert_eq!(filter.size(), 0);
    }

    #[test]
    fn buffer_length_tracks_size_formula() {
        for n in [1, 2, 5, 10] {
            let filter = FilterBuffer::new(n, 0);
            assert_eq!(filter.as_bytes().len(), 1 + 1 + filter_size(n) + 1 + 2);
        }
    }

    #[test]
    fn apply_digest_sets_expected_bits() {
        let mut filter = FilterBuffer::new(3, 0);
        // size = 6, bit_count = 48. Pairs below reduce to indices
        // 0x0000 % 48 = 0, 0x0001 % 48 = 1, 0x0030 % 48 = 0, 0x0031 % 48 = 1,
        // so only bits 0 and 1 of byte 0 end up set.
        let mut digest = [0u8; 32];
        digest[3] = 0x01; // pair 1 -> 0x0001
        digest[5] = 0x30; // pair 2 -> 0x0030
        digest[7] = 0x31; // pair 3 -> 0x0031

        filter.apply_digest(&digest);

        assert_eq!(filter.as_bytes()[2], 0b0000_0011);
        assert_eq!(&filter.as_bytes()[3..8], &[0u8; 5]);
    }

    #[test]
    fn apply_digest_is_deterministic() {
        let digest = {
            let mut d = [0u8; 32];
            for (i, byte) in d.iter_mut().enumerate() {
                *byte = (i as u8).wrapping_mul(37);
            }
            d
        };

        let mut a = FilterBuffer::new(5, 0xBEEF);
        let mut b = FilterBuffer::new(5, 0xBEEF);
        a.apply_digest(&digest);
        b.apply_digest(&digest);

        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn digest_tail_does_not_influence_bits() {
        let mut head_only = [0u8; 32];
        let mut with_tail = [0u8; 32];
        head_only[..16].copy_from_slice(&[0x5A; 16]);
        with_tail[..16].copy_from_slice(&[0x5A; 16]);
        with_tail[16..].copy_from_slice(&[0xFF; 16]);

        let mut a = FilterBuffer::new(4, 0);
        let mut b = FilterBuffer::new(4, 0);
        a.apply_digest(&head_only);
        b.apply_digest(&with_tail);

        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn hash_input_concatenation_order() {
        let key = AccountKey::new([0x04; 16]);
        let input = hash_input(&key, 0xC7C8, &[0xB1, 0xB2], &[0x46, 0x6E]);

        assert_eq!(&input[..16], &[0x04; 16]);
        assert_eq!(&input[16..18], &[0xC7, 0xC8]);
        assert_eq!(&input[18..20], &[0xB1, 0xB2]);
        assert_eq!(&input[20..], &[0x46, 0x6E]);
    }

    #[test]
    fn hash_input_with_empty_auxiliary_fields() {
        let key = AccountKey::new([0x04; 16]);
        let input = hash_input(&key, 0x0001, &[], &[]);

        assert_eq!(input.len(), 18);
    }

    proptest! {
        #[test]
        fn set_bits_stay_inside_bit_region(
            key_count in 1usize..12,
            digest in proptest::array::uniform32(any::<u8>()),
            salt in any::<u16>(),
        ) {
            let mut filter = FilterBuffer::new(key_count, salt);
            filter.apply_digest(&digest);

            let size = filter.size();
            let bytes = filter.as_bytes();

            // TLV framing is untouched by bit application
            prop_assert_eq!(bytes[0], ADV_FLAGS);
            prop_assert_eq!(bytes[1], ((size as u8) << 4) | FILTER_FIELD_TYPE);
            prop_assert_eq!(bytes[2 + size], SALT_FIELD_DESCRIPTOR);
            prop_assert_eq!(&bytes[2 + size + 1..], &salt.to_be_bytes()[..]);
        }

        #[test]
        fn at_most_eight_bits_set_per_digest(
            key_count in 1usize..12,
            digest in proptest::array::uniform32(any::<u8>()),
        ) {
            let mut filter = FilterBuffer::new(key_count, 0);
            filter.apply_digest(&digest);

            let set_bits: u32 = filter.as_bytes()[2..2 + filter.size()]
                .iter()
                .map(|b| b.count_ones())
                .sum();
            prop_assert!(set_bits <= 8);
            prop_assert!(set_bits >= 1);
        }
    }
}
