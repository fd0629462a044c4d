//! Async driver tying the generation machine to the external world.
//!
//! The advertiser owns the ports, the in-use key selector, and the
//! generation machine. Event handlers update the selector and then request a
//! regeneration; the advertisement scheduler reads the ready buffers through
//! the getters at any time and simply transmits stale data while a cycle is
//! in flight.
//!
//! All failure handling is cycle-scoped: engine errors are logged and the
//! previous artifacts keep advertising. Nothing here returns an error to the
//! embedding system.

use rand::{RngCore, SeedableRng, rngs::StdRng};
use tracing::{debug, warn};

use nearkey_crypto::{RRD_KEY_INFO, encode_connection_status};

use crate::{
    engine::CryptoEngine,
    machine::{CycleInputs, GenerationMachine, Step},
    ports::{BatteryStatus, ConnectionTracker, DeviceAddress, KeyStore},
    selector::InUseKeySelector,
};

/// Advertisement data provider.
///
/// Single entry point for the embedding system: event notifications drive
/// regeneration, getters expose the current byte buffers. One instance per
/// subsystem; all methods take `&mut self`, so the strict single-cycle
/// ordering holds by construction.
pub struct Advertiser<E, S, C, B> {
    engine: E,
    store: S,
    connections: C,
    battery: B,
    selector: InUseKeySelector,
    machine: GenerationMachine,
    rng: StdRng,
}

impl<E, S, C, B> Advertiser<E, S, C, B>
where
    E: CryptoEngine,
    S: KeyStore,
    C: ConnectionTracker,
    B: BatteryStatus,
{
    /// Create an advertiser with entropy-seeded salt generation.
    pub fn new(engine: E, store: S, connections: C, battery: B) -> Self {
        Self::with_rng(engine, store, connections, battery, StdRng::from_entropy())
    }

    /// Create an advertiser with a caller-provided RNG.
    ///
    /// Tests pass a seeded RNG for reproducible salts.
    pub fn with_rng(engine: E, store: S, connections: C, battery: B, rng: StdRng) -> Self {
        Self {
            engine,
            store,
            connections,
            battery,
            selector: InUseKeySelector::new(),
            machine: GenerationMachine::new(),
            rng,
        }
    }

    /// Current ready filter buffer. May be stale, never partial.
    pub fn bloom_filter(&self) -> &[u8] {
        self.machine.bloom_filter()
    }

    /// Length of the ready filter buffer.
    pub fn bloom_filter_len(&self) -> u8 {
        self.machine.bloom_filter_len()
    }

    /// Current ready RRD buffer. May be stale, never partial.
    pub fn rrd(&self) -> &[u8] {
        self.machine.rrd()
    }

    /// Length of the ready RRD buffer.
    pub fn rrd_len(&self) -> u8 {
        self.machine.rrd_len()
    }

    /// Whether the in-use device is connected and active.
    pub fn in_use_active(&self) -> bool {
        self.selector.active_and_connected()
    }

    /// Supply the transient custom data byte for upcoming cycles.
    pub fn set_custom_data(&mut self, byte: u8) {
        self.selector.set_custom_data(byte);
    }

    /// Regenerate the filter and RRD from current inputs.
    ///
    /// Fire-and-forget semantics for the caller: requests arriving while a
    /// cycle is in flight coalesce into a single follow-up cycle.
    pub async fn request_regeneration(&mut self) {
        if !self.machine.note_trigger() {
            debug!("generation busy, request coalesced");
            return;
        }

        loop {
            let inputs = self.snapshot();
            let run_again = self.run_cycle(inputs).await;
            if !run_again {
                return;
            }
            debug!("running coalesced follow-up cycle");
        }
    }

    /// Handle a device becoming the most recently used handset.
    pub async fn on_mru_device_changed(&mut self, device: DeviceAddress) {
        self.selector.select_initial(&self.store, &self.connections);
        self.selector.update_for_mru(device, &self.store, &self.connections);
        self.request_regeneration().await;
    }

    /// Handle a device disconnect.
    pub async fn on_device_disconnected(&mut self, device: DeviceAddress) {
        if self.selector.is_in_use(device) {
            debug!(%device, "in-use device disconnected");
            self.selector.clear_active_on_disconnect();
        }
        self.request_regeneration().await;
    }

    /// Handle a battery status change.
    pub async fn on_battery_changed(&mut self) {
        self.request_regeneration().await;
    }

    /// Read-consistent snapshot of all external inputs for one cycle.
    fn snapshot(&mut self) -> CycleInputs {
        self.selector.select_initial(&self.store, &self.connections);

        let keys = self.store.all_account_keys();
        let in_use_index = self
            .selector
            .key()
            .and_then(|in_use| keys.iter().position(|key| key == in_use));

        let rrd_key = match (self.selector.key(), in_use_index) {
            (Some(in_use), Some(_)) => {
                match self.engine.derive_key(in_use.as_bytes(), RRD_KEY_INFO) {
                    Ok(key) => Some(key),
                    Err(error) => {
                        warn!(%error, "RRD key derivation failed, skipping RRD this cycle");
                        None
                    },
                }
            },
            _ => None,
        };

        let connection_status = encode_connection_status(
            self.connections.connection_state(),
            self.selector.custom_data().unwrap_or(0),
            self.connections.connected_bitmap(),
        );

        CycleInputs {
            keys,
            in_use_index,
            in_use_active: self.selector.active_and_connected(),
            rrd_key,
            connection_status,
            battery: self.battery.current_bytes(),
            salt: self.rng.next_u32() as u16,
        }
    }

    /// Drive one cycle to completion. Returns whether a coalesced follow-up
    /// was requested.
    async fn run_cycle(&mut self, inputs: CycleInputs) -> bool {
        let key_count = inputs.keys.len();
        debug!(key_count, "generation cycle started");

        let mut step = match self.machine.begin_cycle(inputs) {
            Ok(step) => step,
            Err(error) => {
                warn!(%error, "cycle could not start");
                return false;
            },
        };

        loop {
            let fed = match step {
                Step::Encrypt { key, iv, data } => {
                    let result = self.engine.aes_ctr_encrypt(key, iv, data).await;
                    self.machine.on_encrypt_result(result)
                },
                Step::Hash { data } => {
                    let result = self.engine.hash(data).await;
                    self.machine.on_hash_result(result)
                },
                Step::Done(outcome) => {
                    if let Some(error) = &outcome.rrd_error {
                        warn!(%error, "RRD step failed, previous RRD stays published");
                    }
                    match &outcome.result {
                        Ok(()) => debug!(
                            filter_len = self.machine.bloom_filter_len(),
                            rrd_len = self.machine.rrd_len(),
                            "generation cycle published"
                        ),
                        Err(error) => {
                            warn!(%error, "generation cycle aborted, previous data stays");
                        },
                    }
                    return outcome.run_again;
                },
            };

            step = match fed {
                Ok(next) => next,
                Err(error) => {
                    // Machine/driver disagreement; the machine is idle again
                    // and the next trigger starts fresh.
                    warn!(%error, "generation cycle desynchronized");
                    return false;
                },
            };
        }
    }
}
