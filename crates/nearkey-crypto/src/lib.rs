//! Nearkey Cryptographic Primitives
//!
//! Pure building blocks for the account key filter and random resolvable
//! data (RRD) pipeline. Every function here is synchronous and deterministic:
//! salts and randomness are provided by the caller, which keeps the
//! higher-level generation state machine testable with fixed inputs.
//!
//! # Pipeline
//!
//! ```text
//! Account Keys ──┐
//!                ├─ HKDF ─▶ RRD Key ─▶ AES-CTR ─▶ Random Resolvable Data
//! Salt ──────────┤
//!                └─ SHA-256 per key ─▶ bit positions ─▶ Account Key Filter
//! ```
//!
//! The asynchronous crypto engine that executes the SHA-256 and AES-CTR
//! requests lives in `nearkey-core`; this crate only prepares and interprets
//! the byte buffers that cross that boundary.
//!
//! # Wire formats
//!
//! The filter and RRD layouts are fixed by the proximity-pairing scanner's
//! parser and must be reproduced byte-for-byte. See [`bloom::FilterBuffer`]
//! and [`fields::frame_rrd`] for the exact layouts.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod account_key;
pub mod bloom;
pub mod byte_order;
pub mod error;
pub mod fields;
pub mod rrd;

pub use account_key::{ACCOUNT_KEY_LEN, AccountKey};
pub use bloom::{FilterBuffer, filter_size, hash_input};
pub use byte_order::{from_engine_order, to_engine_order};
pub use error::CryptoError;
pub use fields::{
    ADV_FLAGS, CONNECTION_STATUS_LEN, RRD_KEY_INFO, TAG_IN_USE_ACTIVE, TAG_MOST_RECENTLY_USED,
    encode_connection_status, frame_rrd,
};
pub use rrd::{build_iv, derive_key};
