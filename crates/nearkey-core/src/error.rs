//! Error types for the generation pipeline.
//!
//! Engine failures are cycle-scoped: they abort the in-flight generation and
//! leave the previously published buffers in place. An empty key set or a
//! missing in-use key are valid steady states, not errors, and have no
//! variants here.

use thiserror::Error;

/// Errors reported by a [`crate::engine::CryptoEngine`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Key derivation rejected its inputs.
    #[error("key derivation failed: {reason}")]
    KeyDerivation {
        /// Engine-reported reason
        reason: String,
    },

    /// An asynchronous hash request failed.
    #[error("hash request failed: {reason}")]
    Hash {
        /// Engine-reported reason
        reason: String,
    },

    /// An asynchronous AES-CTR request failed.
    #[error("AES-CTR request failed: {reason}")]
    Encrypt {
        /// Engine-reported reason
        reason: String,
    },
}

/// Errors from the generation state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// A cycle was started while another was in flight.
    ///
    /// Driver bug: triggers arriving while busy must go through
    /// [`crate::machine::GenerationMachine::note_trigger`] instead.
    #[error("generation cycle already in flight")]
    AlreadyRunning,

    /// A completion was fed to the machine in the wrong state.
    #[error("unexpected {completion} completion in state {state}")]
    UnexpectedCompletion {
        /// Completion kind that was delivered
        completion: &'static str,
        /// State the machine was in
        state: &'static str,
    },

    /// RRD key derivation failed; the RRD step was skipped this cycle.
    #[error("RRD key derivation failed")]
    KeyDerivation(#[source] EngineError),

    /// RRD encryption failed; the ready RRD buffer kept its previous bytes.
    #[error("RRD encryption failed")]
    RrdEncrypt(#[source] EngineError),

    /// A per-key hash failed; the cycle was aborted and the ready filter
    /// kept its previous bytes.
    #[error("hash failed for key {index}")]
    KeyHash {
        /// Index of the key whose hash request failed
        index: usize,
        /// Engine failure
        #[source]
        source: EngineError,
    },
}
