//! Generation state machine.
//!
//! Drives one filter/RRD generation cycle through the asynchronous crypto
//! engine. Pure action pattern: methods return engine requests as values and
//! consume their completions; no I/O happens here. The driver
//! ([`crate::advertiser::Advertiser`] in production, a test feeding
//! completions by hand otherwise) executes the requests.
//!
//! # State machine
//!
//! ```text
//!            trigger                 encrypt done/failed
//! ┌──────┐ (key set > 0) ┌───────────────┐      ┌───────────────┐
//! │ Idle │──────────────▶│ EncryptingRrd │─────▶│ HashingKey(i) │──┐
//! └──────┘               └───────────────┘      └───────────────┘  │ i+1 < n
//!    ▲  │ (key set = 0)                                  ▲  │      │
//!    │  └────────────────▶ publish empty                 │  └──────┘
//!    │                                                   │ last key
//!    └──────────── publish / abort ◀─────────────────────┘
//! ```
//!
//! Triggers arriving while any cycle is in flight set a single pending flag;
//! the flag is consulted once, on return to idle, so N overlapping triggers
//! collapse into exactly one follow-up cycle. The machine itself is the
//! mutual exclusion: a state holding a request in flight *is* the "one
//! outstanding engine request" invariant.

use nearkey_crypto::{
    AccountKey, FilterBuffer, TAG_IN_USE_ACTIVE, TAG_MOST_RECENTLY_USED, build_iv, frame_rrd,
    from_engine_order, hash_input, to_engine_order,
};

use crate::error::{EngineError, GenerationError};

/// Consistent snapshot of the external inputs, taken at cycle start.
///
/// The caller supplies the salt; the machine contains no randomness, which
/// keeps cycles reproducible under test.
#[derive(Debug, Clone)]
pub struct CycleInputs {
    /// Full account key set, in store order.
    pub keys: Vec<AccountKey>,
    /// Position of the in-use key within `keys`, if one is selected.
    pub in_use_index: Option<usize>,
    /// Whether the in-use device is connected and holds the active stream.
    pub in_use_active: bool,
    /// RRD key derived from the in-use key. `None` skips the RRD step
    /// (no in-use key, or derivation failed and was reported by the driver).
    pub rrd_key: Option<[u8; 16]>,
    /// Encoded 4-byte connection status block.
    pub connection_status: [u8; 4],
    /// Battery status bytes, possibly empty.
    pub battery: Vec<u8>,
    /// Fresh random salt for this cycle.
    pub salt: u16,
}

/// Next thing the driver must do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Issue an AES-CTR encryption request. All buffers are engine order.
    Encrypt {
        /// Derived RRD key
        key: [u8; 16],
        /// Initialization vector
        iv: [u8; 16],
        /// Connection status plaintext
        data: Vec<u8>,
    },

    /// Issue a hash request. The buffer is engine order.
    Hash {
        /// Key-plus-auxiliary-fields hash input
        data: Vec<u8>,
    },

    /// The cycle finished; nothing is in flight.
    Done(CycleOutcome),
}

/// Result of a finished cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Filter pipeline result. `Err` means the cycle aborted and the
    /// previously published buffers were kept.
    pub result: Result<(), GenerationError>,
    /// RRD step failure, if any. RRD is best-effort privacy padding; its
    /// failure never blocks filter construction.
    pub rrd_error: Option<GenerationError>,
    /// A regeneration was requested while this cycle ran. The driver must
    /// begin another cycle now (with a fresh snapshot).
    pub run_again: bool,
}

/// Per-cycle working data, owned exclusively by the machine.
#[derive(Debug)]
struct CycleWork {
    /// Working copy of the key list, in-use key already tagged.
    keys: Vec<AccountKey>,
    salt: u16,
    battery: Vec<u8>,
    /// This cycle's framed RRD bytes; empty until the encrypt completes,
    /// and stays empty when the RRD step is skipped or fails.
    rrd: Vec<u8>,
    rrd_error: Option<GenerationError>,
    skeleton: Option<FilterBuffer>,
}

#[derive(Debug)]
enum State {
    Idle,
    /// AES-CTR request for the connection status block is in flight.
    EncryptingRrd(CycleWork),
    /// Hash request for key `index` is in flight.
    HashingKey {
        work: CycleWork,
        index: usize,
    },
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::EncryptingRrd(_) => "EncryptingRrd",
            Self::HashingKey { .. } => "HashingKey",
        }
    }
}

/// The generation coordinator.
///
/// Owns the in-flight cycle and the two published ("ready") buffers. The
/// ready buffers are replaced whole when a cycle publishes, never mutated in
/// place, so a concurrent reader can never observe a partial artifact.
#[derive(Debug)]
pub struct GenerationMachine {
    state: State,
    regeneration_pending: bool,
    bloom_ready: Vec<u8>,
    rrd_ready: Vec<u8>,
}

impl Default for GenerationMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationMachine {
    /// Create an idle machine with empty ready buffers.
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            regeneration_pending: false,
            bloom_ready: Vec::new(),
            rrd_ready: Vec::new(),
        }
    }

    /// Register a regeneration trigger.
    ///
    /// Returns `true` when the machine is idle and the caller should begin a
    /// cycle now. While a cycle is in flight the trigger is coalesced into
    /// the single pending flag and `false` is returned.
    pub fn note_trigger(&mut self) -> bool {
        if matches!(self.state, State::Idle) {
            true
        } else {
            self.regeneration_pending = true;
            false
        }
    }

    /// Whether a cycle is in flight.
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    /// Begin a cycle from a fresh snapshot.
    ///
    /// # Errors
    ///
    /// - `GenerationError::AlreadyRunning` if a cycle is in flight. Triggers
    ///   while busy belong in [`note_trigger`](Self::note_trigger).
    pub fn begin_cycle(&mut self, inputs: CycleInputs) -> Result<Step, GenerationError> {
        if self.is_busy() {
            return Err(GenerationError::AlreadyRunning);
        }

        let CycleInputs {
            mut keys,
            in_use_index,
            in_use_active,
            rrd_key,
            connection_status,
            battery,
            salt,
        } = inputs;

        if keys.is_empty() {
            // Nothing to protect and nothing to advertise: publish the empty
            // artifacts without touching the engine.
            self.bloom_ready = Vec::new();
            self.rrd_ready = Vec::new();
            return Ok(Step::Done(self.finish(Ok(()), None)));
        }

        // Tag the in-use key in the working copy only; the caller's stored
        // originals stay untouched. The tag lets a scanner distinguish
        // "actively streaming" from "recently used" without decrypting.
        // An out-of-range index means the snapshot raced a key-store change;
        // the cycle proceeds with no key tagged.
        if let Some(key) = in_use_index.and_then(|index| keys.get_mut(index)) {
            let tag = if in_use_active { TAG_IN_USE_ACTIVE } else { TAG_MOST_RECENTLY_USED };
            key.set_tag(tag);
        }

        let work = CycleWork {
            keys,
            salt,
            battery,
            rrd: Vec::new(),
            rrd_error: None,
            skeleton: None,
        };

        match rrd_key {
            Some(key) => {
                let mut engine_key = key;
                let mut engine_iv = build_iv(salt);
                engine_key.reverse();
                engine_iv.reverse();
                let data = to_engine_order(&connection_status);

                self.state = State::EncryptingRrd(work);
                Ok(Step::Encrypt { key: engine_key, iv: engine_iv, data })
            },
            // No in-use key selected (or derivation already failed): the
            // filter is still built, with an empty RRD contribution.
            None => Ok(self.start_hashing(work)),
        }
    }

    /// Feed the AES-CTR completion back into the machine.
    ///
    /// # Errors
    ///
    /// - `GenerationError::UnexpectedCompletion` when no encrypt request is
    ///   in flight.
    pub fn on_encrypt_result(
        &mut self,
        result: Result<Vec<u8>, EngineError>,
    ) -> Result<Step, GenerationError> {
        if !matches!(self.state, State::EncryptingRrd(_)) {
            return Err(GenerationError::UnexpectedCompletion {
                completion: "encrypt",
                state: self.state.name(),
            });
        }
        let State::EncryptingRrd(mut work) = std::mem::replace(&mut self.state, State::Idle)
        else {
            unreachable!("state checked above");
        };

        match result {
            Ok(ciphertext) => {
                let framed = frame_rrd(&from_engine_order(&ciphertext));
                // RRD publishes at its own completion; a later filter
                // failure does not retract it.
                self.rrd_ready = framed.clone();
                work.rrd = framed;
            },
            Err(source) => {
                // Best-effort: the ready RRD keeps its previous bytes and
                // this cycle hashes with an empty RRD contribution.
                work.rrd_error = Some(GenerationError::RrdEncrypt(source));
            },
        }

        Ok(self.start_hashing(work))
    }

    /// Feed a hash completion back into the machine.
    ///
    /// On success the digest's bits are applied and either the next key's
    /// hash request or the publish outcome is returned. An engine failure
    /// aborts the cycle: the half-built skeleton is discarded and the ready
    /// buffers keep their previous contents.
    ///
    /// # Errors
    ///
    /// - `GenerationError::UnexpectedCompletion` when no hash request is in
    ///   flight.
    pub fn on_hash_result(
        &mut self,
        result: Result<[u8; 32], EngineError>,
    ) -> Result<Step, GenerationError> {
        if !matches!(self.state, State::HashingKey { .. }) {
            return Err(GenerationError::UnexpectedCompletion {
                completion: "hash",
                state: self.state.name(),
            });
        }
        let State::HashingKey { mut work, index } =
            std::mem::replace(&mut self.state, State::Idle)
        else {
            unreachable!("state checked above");
        };

        let digest = match result {
            Ok(engine_digest) => {
                let mut digest = engine_digest;
                digest.reverse();
                digest
            },
            Err(source) => {
                let rrd_error = work.rrd_error.take();
                let outcome =
                    self.finish(Err(GenerationError::KeyHash { index, source }), rrd_error);
                return Ok(Step::Done(outcome));
            },
        };

        if let Some(skeleton) = work.skeleton.as_mut() {
            skeleton.apply_digest(&digest);
        }

        let next = index + 1;
        if next < work.keys.len() {
            let data = to_engine_order(&hash_input(
                &work.keys[next],
                work.salt,
                &work.battery,
                &work.rrd,
            ));
            self.state = State::HashingKey { work, index: next };
            return Ok(Step::Hash { data });
        }

        // Last key applied: publish by whole-buffer replacement.
        let rrd_error = work.rrd_error.take();
        if let Some(skeleton) = work.skeleton.take() {
            self.bloom_ready = skeleton.into_bytes();
        }
        Ok(Step::Done(self.finish(Ok(()), rrd_error)))
    }

    /// Current ready filter buffer. May be stale while a cycle is in flight.
    pub fn bloom_filter(&self) -> &[u8] {
        &self.bloom_ready
    }

    /// Length of the ready filter buffer.
    pub fn bloom_filter_len(&self) -> u8 {
        self.bloom_ready.len() as u8
    }

    /// Current ready RRD buffer. May be stale while a cycle is in flight.
    pub fn rrd(&self) -> &[u8] {
        &self.rrd_ready
    }

    /// Length of the ready RRD buffer.
    pub fn rrd_len(&self) -> u8 {
        self.rrd_ready.len() as u8
    }

    /// Allocate the filter skeleton and emit the first hash request.
    fn start_hashing(&mut self, mut work: CycleWork) -> Step {
        work.skeleton = Some(FilterBuffer::new(work.keys.len(), work.salt));

        let data =
            to_engine_order(&hash_input(&work.keys[0], work.salt, &work.battery, &work.rrd));
        self.state = State::HashingKey { work, index: 0 };
        Step::Hash { data }
    }

    /// Return to idle, consuming the pending flag into the outcome.
    fn finish(
        &mut self,
        result: Result<(), GenerationError>,
        rrd_error: Option<GenerationError>,
    ) -> CycleOutcome {
        self.state = State::Idle;
        let run_again = std::mem::take(&mut self.regeneration_pending);
        CycleOutcome { result, rrd_error, run_again }
    }
}
