//! Fuzz target for FilterBuffer construction
//!
//! Applies arbitrary digests to filters of arbitrary size to find:
//! - Out-of-bounds bit indices
//! - Corruption of the TLV framing around the bit region
//!
//! The fuzzer should NEVER panic, and the framing bytes must survive any
//! sequence of digest applications.

#![no_main]

use libfuzzer_sys::fuzz_target;
use nearkey_crypto::{FilterBuffer, filter_size};

fuzz_target!(|input: (u8, u16, Vec<[u8; 32]>)| {
    let (key_count, salt, digests) = input;
    let key_count = usize::from(key_count % 33);

    let mut filter = FilterBuffer::new(key_count, salt);
    for digest in &digests {
        filter.apply_digest(digest);
    }

    let size = filter_size(key_count);
    let bytes = filter.as_bytes();
    if size == 0 {
        assert!(bytes.is_empty());
    } else {
        assert_eq!(bytes.len(), size + 5);
        assert_eq!(bytes[2 + size], 0x01);
        assert_eq!(&bytes[2 + size + 1..], &salt.to_be_bytes());
    }
});
