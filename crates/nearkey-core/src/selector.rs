//! In-use key selection.
//!
//! Exactly one account key represents the "currently relevant" paired device
//! in each advertisement: its working copy gets the in-use tag byte and it
//! seeds the RRD key derivation. Selection follows most-recently-used
//! handsets, with one business rule on top: a device mid-stream is never
//! robbed of the slot by a later MRU change.

use tracing::debug;

use nearkey_crypto::AccountKey;

use crate::ports::{ConnectionTracker, DeviceAddress, KeyStore};

/// Tracks which account key is in use and whether its device is active.
///
/// Process-wide singleton by construction: created once at subsystem init and
/// passed by reference, never a static. Having no key selected is a valid
/// steady state; downstream stages then skip RRD generation and tagging.
#[derive(Debug, Default)]
pub struct InUseKeySelector {
    key: Option<AccountKey>,
    owner: Option<DeviceAddress>,
    active_and_connected: bool,
    custom_data: Option<u8>,
}

impl InUseKeySelector {
    /// Create a selector with no key selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a first-boot default: the lowest-indexed paired device with an
    /// account key.
    ///
    /// No-op when a key is already selected or when no paired device has a
    /// key.
    pub fn select_initial(&mut self, store: &impl KeyStore, tracker: &impl ConnectionTracker) {
        if self.key.is_some() {
            return;
        }

        for device in store.paired_devices() {
            if let Some(key) = store.key_for_device(device) {
                self.active_and_connected = tracker.is_connected(device);
                debug!(%device, active = self.active_and_connected, "initial in-use key selected");
                self.key = Some(key);
                self.owner = Some(device);
                return;
            }
        }
    }

    /// React to `device` becoming the most recently used handset.
    ///
    /// Idempotent when the device already holds the slot and is active. When
    /// another connected handset currently holds the audio stream, the slot
    /// is left alone entirely. Otherwise the device's key is adopted if the
    /// store has one; a device without a key (a non-participating peer) keeps
    /// the current key selected but demotes it to inactive. Both of those
    /// branches drop the cached custom data, which the protocol layer must
    /// resupply before the next cycle.
    pub fn update_for_mru(
        &mut self,
        device: DeviceAddress,
        store: &impl KeyStore,
        tracker: &impl ConnectionTracker,
    ) {
        if self.is_in_use(device) && self.active_and_connected {
            return;
        }

        if let Some(active) = tracker.audio_routed_to()
            && active != device
            && tracker.connected_handsets().contains(&active)
        {
            debug!(%device, %active, "mru change ignored, another handset is streaming");
            return;
        }

        match store.key_for_device(device) {
            Some(key) => {
                debug!(%device, "in-use key adopted for mru device");
                self.key = Some(key);
                self.owner = Some(device);
                self.active_and_connected = true;
            },
            None => {
                debug!(%device, "mru device has no account key, demoting in-use key");
                self.active_and_connected = false;
            },
        }

        self.custom_data = None;
    }

    /// Record that the in-use device disconnected.
    ///
    /// Clears activity, not identity: the key stays selected so the
    /// advertisement can still mark it as most recently used.
    pub fn clear_active_on_disconnect(&mut self) {
        self.active_and_connected = false;
    }

    /// Whether `device` owns the in-use slot.
    pub fn is_in_use(&self, device: DeviceAddress) -> bool {
        self.owner == Some(device)
    }

    /// The in-use account key, if one is selected.
    pub fn key(&self) -> Option<&AccountKey> {
        self.key.as_ref()
    }

    /// Whether the in-use device is connected and holds the active stream.
    pub fn active_and_connected(&self) -> bool {
        self.active_and_connected
    }

    /// Supply the transient custom data byte for the next cycles.
    pub fn set_custom_data(&mut self, byte: u8) {
        self.custom_data = Some(byte);
    }

    /// The cached custom data byte, if the protocol layer supplied one.
    pub fn custom_data(&self) -> Option<u8> {
        self.custom_data
    }
}
