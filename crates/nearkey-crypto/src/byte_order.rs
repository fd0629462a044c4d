//! Byte-order normalization for the crypto engine boundary.
//!
//! The system's canonical representation is big-endian throughout. The
//! external crypto engine consumes and produces buffers in the opposite
//! order, so every buffer is reversed on the way in and on the way out.
//! Reversal is its own inverse, which keeps the two directions trivially
//! consistent; the two names exist so call sites read as intent.

/// Convert a canonical (big-endian) buffer to engine order.
pub fn to_engine_order(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// Convert an engine-order buffer back to canonical (big-endian) order.
pub fn from_engine_order(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn reverses_whole_buffer() {
        assert_eq!(to_engine_order(&[0x01, 0x02, 0x03]), vec![0x03, 0x02, 0x01]);
    }

    #[test]
    fn empty_buffer_stays_empty() {
        assert_eq!(to_engine_order(&[]), Vec::<u8>::new());
        assert_eq!(from_engine_order(&[]), Vec::<u8>::new());
    }

    proptest! {
        #[test]
        fn round_trip_is_identity(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(from_engine_order(&to_engine_order(&bytes)), bytes);
        }
    }
}
