//! Crypto engine capability boundary.
//!
//! The radio platform exposes its crypto hardware through a single-request,
//! single-completion interface that consumes and produces buffers in
//! *engine order*: the whole buffer reversed relative to this system's
//! canonical big-endian representation. The generation machine performs that
//! normalization; engine implementations see engine-ordered bytes only.
//!
//! [`SoftwareEngine`] stands in for the chip on hosts without one, matching
//! the hardware contract bit-for-bit.

use aes::Aes128;
use async_trait::async_trait;
use ctr::cipher::{KeyIvInit, StreamCipher};
use sha2::{Digest, Sha256};

use crate::error::EngineError;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Asynchronous crypto engine capability.
///
/// One request may be outstanding per call site; the generation state
/// machine's states encode that invariant, so implementations never see
/// overlapping requests from this crate.
#[async_trait]
pub trait CryptoEngine {
    /// Derive a 16-byte key from `ikm` bound to the `info` label.
    ///
    /// Synchronous: derivation runs on the host, not the crypto hardware.
    /// Inputs and output are canonical (big-endian) order.
    fn derive_key(&self, ikm: &[u8; 16], info: &[u8]) -> Result<[u8; 16], EngineError>;

    /// SHA-256 over `data`. Input and digest are in engine order.
    async fn hash(&self, data: Vec<u8>) -> Result<[u8; 32], EngineError>;

    /// AES-128-CTR over `data`. Key, IV, input, and output are in engine
    /// order.
    async fn aes_ctr_encrypt(
        &self,
        key: [u8; 16],
        iv: [u8; 16],
        data: Vec<u8>,
    ) -> Result<Vec<u8>, EngineError>;
}

/// Software implementation of the engine contract.
///
/// Reverses engine-ordered inputs back to canonical order, runs the
/// primitive, and reverses the result, so a scanner combining this engine's
/// outputs with canonical-order inputs sees standard SHA-256 / AES-CTR.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareEngine;

#[async_trait]
impl CryptoEngine for SoftwareEngine {
    fn derive_key(&self, ikm: &[u8; 16], info: &[u8]) -> Result<[u8; 16], EngineError> {
        nearkey_crypto::derive_key(ikm, info)
            .map_err(|e| EngineError::KeyDerivation { reason: e.to_string() })
    }

    async fn hash(&self, data: Vec<u8>) -> Result<[u8; 32], EngineError> {
        let canonical = nearkey_crypto::from_engine_order(&data);
        let mut digest: [u8; 32] = Sha256::digest(&canonical).into();
        digest.reverse();
        Ok(digest)
    }

    async fn aes_ctr_encrypt(
        &self,
        key: [u8; 16],
        iv: [u8; 16],
        data: Vec<u8>,
    ) -> Result<Vec<u8>, EngineError> {
        let mut canonical_key = key;
        let mut canonical_iv = iv;
        canonical_key.reverse();
        canonical_iv.reverse();

        let mut buf = nearkey_crypto::from_engine_order(&data);
        let mut cipher = Aes128Ctr::new(&canonical_key.into(), &canonical_iv.into());
        cipher.apply_keystream(&mut buf);

        buf.reverse();
        Ok(buf)
    }
}
