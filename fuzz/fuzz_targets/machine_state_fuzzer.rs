//! Fuzz target for the generation state machine
//!
//! Feeds arbitrary interleavings of triggers and engine completions to find:
//! - Panics on out-of-order completions
//! - States that wedge the machine (busy forever with nothing in flight)
//! - Partial buffers escaping to the ready getters
//!
//! The machine must reject stray completions with an error, never panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use nearkey_core::{CycleInputs, EngineError, GenerationMachine};
use nearkey_crypto::AccountKey;

#[derive(Arbitrary, Debug)]
enum Event {
    Trigger,
    Begin { key_count: u8, in_use: Option<u8>, active: bool, with_rrd: bool, salt: u16 },
    EncryptOk { ciphertext: Vec<u8> },
    EncryptErr,
    HashOk { digest: [u8; 32] },
    HashErr,
}

fuzz_target!(|events: Vec<Event>| {
    let mut machine = GenerationMachine::new();

    for event in events {
        match event {
            Event::Trigger => {
                let _ = machine.note_trigger();
            },
            Event::Begin { key_count, in_use, active, with_rrd, salt } => {
                let key_count = usize::from(key_count % 9);
                let keys =
                    (0..key_count).map(|i| AccountKey::new([i as u8; 16])).collect::<Vec<_>>();
                let in_use_index = in_use.map(usize::from);
                let inputs = CycleInputs {
                    keys,
                    in_use_index,
                    in_use_active: active,
                    rrd_key: with_rrd.then_some([0x99; 16]),
                    connection_status: [0x35, 0, 0, 0],
                    battery: Vec::new(),
                    salt,
                };
                let _ = machine.begin_cycle(inputs);
            },
            Event::EncryptOk { ciphertext } => {
                let _ = machine.on_encrypt_result(Ok(ciphertext));
            },
            Event::EncryptErr => {
                let _ = machine.on_encrypt_result(Err(EngineError::Encrypt {
                    reason: "fuzz".into(),
                }));
            },
            Event::HashOk { digest } => {
                let _ = machine.on_hash_result(Ok(digest));
            },
            Event::HashErr => {
                let _ = machine.on_hash_result(Err(EngineError::Hash { reason: "fuzz".into() }));
            },
        }

        // Ready buffers are always complete artifacts
        let filter = machine.bloom_filter();
        assert!(filter.is_empty() || filter.len() >= 6);
        assert_eq!(usize::from(machine.bloom_filter_len()), filter.len());
        assert_eq!(usize::from(machine.rrd_len()), machine.rrd().len());
    }
});
