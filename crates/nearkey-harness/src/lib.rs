//! Deterministic test doubles for the Nearkey pipeline.
//!
//! In-memory implementations of the `nearkey-core` ports and a scripted
//! crypto engine that records every request, returns reproducible results,
//! and fails on command. All doubles are cheaply cloneable handles over
//! shared state, so a test can keep mutating a store or tracker after handing
//! it to an [`nearkey_core::Advertiser`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use nearkey_core::{
    BatteryStatus, ConnectionTracker, CryptoEngine, DeviceAddress, EngineError, KeyStore,
};
use nearkey_crypto::AccountKey;

/// One recorded crypto engine request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    /// `derive_key` request (the `info` label; key material is not recorded).
    DeriveKey {
        /// Derivation label
        info: Vec<u8>,
    },
    /// Asynchronous hash request, buffer in engine order.
    Hash {
        /// Request payload
        data: Vec<u8>,
    },
    /// Asynchronous AES-CTR request, buffers in engine order.
    Encrypt {
        /// Key
        key: [u8; 16],
        /// Initialization vector
        iv: [u8; 16],
        /// Plaintext
        data: Vec<u8>,
    },
}

#[derive(Debug, Default)]
struct EngineState {
    calls: Vec<EngineCall>,
    scripted_digests: VecDeque<[u8; 32]>,
    scripted_ciphertexts: VecDeque<Vec<u8>>,
    fail_hash: Option<String>,
    fail_encrypt: Option<String>,
    fail_derive: Option<String>,
}

/// Scripted crypto engine.
///
/// Records every request. Hash digests and ciphertexts come from scripted
/// queues when present, otherwise from a deterministic fold of the request
/// bytes, so unscripted tests are still reproducible. Buffers follow the
/// engine contract: requests arrive and results leave in engine order.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    state: Arc<Mutex<EngineState>>,
}

impl ScriptedEngine {
    /// Create an engine with no script and no failures.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// All requests seen so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    /// Payload of the most recent hash request, if any.
    pub fn last_hash_input(&self) -> Option<Vec<u8>> {
        self.lock().calls.iter().rev().find_map(|call| match call {
            EngineCall::Hash { data } => Some(data.clone()),
            _ => None,
        })
    }

    /// Queue a digest to return for the next unanswered hash request.
    ///
    /// The machine normalizes digests back from engine order; script the
    /// byte-reversed value of the digest the test wants applied.
    pub fn push_digest(&self, digest: [u8; 32]) {
        self.lock().scripted_digests.push_back(digest);
    }

    /// Queue a ciphertext for the next AES-CTR request, in engine order.
    pub fn push_ciphertext(&self, ciphertext: Vec<u8>) {
        self.lock().scripted_ciphertexts.push_back(ciphertext);
    }

    /// Make the next hash request fail with `reason`.
    pub fn fail_next_hash(&self, reason: &str) {
        self.lock().fail_hash = Some(reason.to_string());
    }

    /// Make the next AES-CTR request fail with `reason`.
    pub fn fail_next_encrypt(&self, reason: &str) {
        self.lock().fail_encrypt = Some(reason.to_string());
    }

    /// Make every `derive_key` call fail with `reason`.
    pub fn fail_derive(&self, reason: &str) {
        self.lock().fail_derive = Some(reason.to_string());
    }
}

/// Deterministic 32-byte fold of a request payload.
///
/// Not a real hash; just a stable, input-sensitive pattern for tests that
/// only need determinism.
fn fold_digest(data: &[u8]) -> [u8; 32] {
    let mut digest = [0u8; 32];
    for (i, byte) in digest.iter_mut().enumerate() {
        *byte = data
            .iter()
            .enumerate()
            .fold(i as u8, |acc, (j, b)| acc.wrapping_mul(31) ^ b.wrapping_add(j as u8));
    }
    digest
}

#[async_trait]
impl CryptoEngine for ScriptedEngine {
    fn derive_key(&self, ikm: &[u8; 16], info: &[u8]) -> Result<[u8; 16], EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::DeriveKey { info: info.to_vec() });
        if let Some(reason) = state.fail_derive.clone() {
            return Err(EngineError::KeyDerivation { reason });
        }

        // Deterministic stand-in derivation
        let mut key = *ikm;
        for (byte, label) in key.iter_mut().zip(info.iter().cycle()) {
            *byte ^= label;
        }
        Ok(key)
    }

    async fn hash(&self, data: Vec<u8>) -> Result<[u8; 32], EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Hash { data: data.clone() });
        if let Some(reason) = state.fail_hash.take() {
            return Err(EngineError::Hash { reason });
        }

        Ok(state.scripted_digests.pop_front().unwrap_or_else(|| fold_digest(&data)))
    }

    async fn aes_ctr_encrypt(
        &self,
        key: [u8; 16],
        iv: [u8; 16],
        data: Vec<u8>,
    ) -> Result<Vec<u8>, EngineError> {
        let mut state = self.lock();
        state.calls.push(EngineCall::Encrypt { key, iv, data: data.clone() });
        if let Some(reason) = state.fail_encrypt.take() {
            return Err(EngineError::Encrypt { reason });
        }

        Ok(state.scripted_ciphertexts.pop_front().unwrap_or_else(|| {
            // Deterministic stand-in keystream
            data.iter().zip(key.iter().cycle()).map(|(d, k)| d ^ k).collect()
        }))
    }
}

/// In-memory account key store.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    entries: Arc<Mutex<Vec<(DeviceAddress, AccountKey)>>>,
}

impl MemoryKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(DeviceAddress, AccountKey)>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Associate `key` with `device`, appending in store order.
    pub fn insert(&self, device: DeviceAddress, key: AccountKey) {
        self.lock().push((device, key));
    }

    /// Remove the key associated with `device`, if any.
    pub fn remove(&self, device: DeviceAddress) {
        self.lock().retain(|(entry, _)| *entry != device);
    }
}

impl KeyStore for MemoryKeyStore {
    fn all_account_keys(&self) -> Vec<AccountKey> {
        self.lock().iter().map(|(_, key)| key.clone()).collect()
    }

    fn key_for_device(&self, device: DeviceAddress) -> Option<AccountKey> {
        self.lock()
            .iter()
            .find(|(entry, _)| *entry == device)
            .map(|(_, key)| key.clone())
    }

    fn paired_devices(&self) -> Vec<DeviceAddress> {
        self.lock().iter().map(|(device, _)| *device).collect()
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    connected: Vec<DeviceAddress>,
    audio_target: Option<DeviceAddress>,
    state_byte: u8,
    bitmap: u8,
}

/// Settable connection tracker.
#[derive(Debug, Clone, Default)]
pub struct StaticConnections {
    state: Arc<Mutex<ConnectionState>>,
}

impl StaticConnections {
    /// Create a tracker with nothing connected.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Mark `device` as connected.
    pub fn connect(&self, device: DeviceAddress) {
        let mut state = self.lock();
        if !state.connected.contains(&device) {
            state.connected.push(device);
        }
    }

    /// Mark `device` as disconnected.
    pub fn disconnect(&self, device: DeviceAddress) {
        let mut state = self.lock();
        state.connected.retain(|entry| *entry != device);
        if state.audio_target == Some(device) {
            state.audio_target = None;
        }
    }

    /// Route the audio stream to `device`.
    pub fn route_audio_to(&self, device: DeviceAddress) {
        self.lock().audio_target = Some(device);
    }

    /// Set the connection state byte for the status block.
    pub fn set_state_byte(&self, byte: u8) {
        self.lock().state_byte = byte;
    }

    /// Set the connected-device bitmap for the status block.
    pub fn set_bitmap(&self, bitmap: u8) {
        self.lock().bitmap = bitmap;
    }
}

impl ConnectionTracker for StaticConnections {
    fn is_connected(&self, device: DeviceAddress) -> bool {
        self.lock().connected.contains(&device)
    }

    fn connected_handsets(&self) -> Vec<DeviceAddress> {
        self.lock().connected.clone()
    }

    fn audio_routed_to(&self) -> Option<DeviceAddress> {
        self.lock().audio_target
    }

    fn connection_state(&self) -> u8 {
        self.lock().state_byte
    }

    fn connected_bitmap(&self) -> u8 {
        self.lock().bitmap
    }
}

/// Battery source returning a fixed byte string.
#[derive(Debug, Clone, Default)]
pub struct FixedBattery {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl FixedBattery {
    /// Battery source with no battery bytes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Battery source with the given bytes.
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes: Arc::new(Mutex::new(bytes)) }
    }

    /// Replace the battery bytes.
    pub fn set_bytes(&self, bytes: Vec<u8>) {
        match self.bytes.lock() {
            Ok(mut guard) => *guard = bytes,
            Err(poisoned) => *poisoned.into_inner() = bytes,
        }
    }
}

impl BatteryStatus for FixedBattery {
    fn current_bytes(&self) -> Vec<u8> {
        match self.bytes.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
