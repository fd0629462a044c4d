//! Nearkey generation pipeline.
//!
//! Builds the two binary artifacts carried by the unidentifiable
//! proximity-pairing advertisement: the salted account key filter and the
//! random resolvable data (RRD) block. Both are regenerated whenever the key
//! set, the in-use key, battery state, or connection status changes, and the
//! current artifacts stay readable while a regeneration is in flight.
//!
//! # Architecture
//!
//! The crate follows the action pattern: [`machine::GenerationMachine`] is a
//! pure state machine that returns crypto engine requests as values and
//! consumes their completions, which makes every ordering and failure path
//! testable without an engine. [`advertiser::Advertiser`] is the thin async
//! driver that snapshots the external collaborators ([`ports`]), feeds the
//! machine, and awaits the [`engine::CryptoEngine`].
//!
//! ```text
//! KeyStore ─┐                     ┌──▶ CryptoEngine (async SHA-256 / AES-CTR)
//! Tracker ──┼─▶ Advertiser ─▶ GenerationMachine
//! Battery ──┘                     └──▶ ready filter + RRD buffers
//! ```
//!
//! At most one generation cycle runs at a time; triggers arriving while busy
//! collapse into a single follow-up cycle. Engine failures abort only the
//! current cycle and leave the previously published buffers untouched.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod advertiser;
pub mod engine;
pub mod error;
pub mod machine;
pub mod ports;
pub mod selector;

pub use advertiser::Advertiser;
pub use engine::{CryptoEngine, SoftwareEngine};
pub use error::{EngineError, GenerationError};
pub use machine::{CycleInputs, CycleOutcome, GenerationMachine, Step};
pub use ports::{BatteryStatus, ConnectionTracker, DeviceAddress, KeyStore};
pub use selector::InUseKeySelector;
