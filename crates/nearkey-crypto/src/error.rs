//! Error types for the crypto primitives.

use thiserror::Error;

/// Errors from the synchronous crypto primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// HKDF rejected the requested output length.
    ///
    /// Cannot happen for the fixed 16-byte RRD key, but the derivation
    /// primitive reports it and callers must check rather than assume.
    #[error("HKDF expansion failed for {requested}-byte output")]
    KeyExpansion {
        /// Output length that was requested
        requested: usize,
    },
}
