//! End-to-end generation pipeline tests.
//!
//! Drives the generation machine through the harness engine with scripted
//! results for byte-exact assertions, and through the software engine for a
//! scanner's-eye verification of the published artifacts.

use nearkey_core::{
    Advertiser, CryptoEngine, CycleInputs, DeviceAddress, GenerationMachine, SoftwareEngine, Step,
};
use nearkey_crypto::AccountKey;
use nearkey_harness::{EngineCall, FixedBattery, MemoryKeyStore, ScriptedEngine, StaticConnections};
use rand::{SeedableRng, rngs::StdRng};
use sha2::{Digest, Sha256};

const A: DeviceAddress = DeviceAddress([0xAA; 6]);

fn key(fill: u8) -> AccountKey {
    AccountKey::new([fill; 16])
}

/// Drive one machine cycle to completion through an engine.
async fn run_cycle(
    machine: &mut GenerationMachine,
    engine: &impl CryptoEngine,
    inputs: CycleInputs,
) {
    let mut step = machine.begin_cycle(inputs).unwrap();
    loop {
        step = match step {
            Step::Encrypt { key, iv, data } => {
                let result = engine.aes_ctr_encrypt(key, iv, data).await;
                machine.on_encrypt_result(result).unwrap()
            },
            Step::Hash { data } => {
                let result = engine.hash(data).await;
                machine.on_hash_result(result).unwrap()
            },
            Step::Done(outcome) => {
                assert!(outcome.result.is_ok(), "cycle failed: {:?}", outcome.result);
                return;
            },
        };
    }
}

#[tokio::test]
async fn three_key_cycle_matches_protocol_layout() {
    let engine = ScriptedEngine::new();
    // Canonical ciphertext 6E BC CB 21, handed back in engine order
    engine.push_ciphertext(vec![0x21, 0xCB, 0xBC, 0x6E]);
    // All-zero digests set only bit 0 (every byte pair reduces to 0)
    for _ in 0..3 {
        engine.push_digest([0u8; 32]);
    }

    let mut machine = GenerationMachine::new();
    let inputs = CycleInputs {
        keys: vec![key(0x10), key(0x20), key(0x30)],
        in_use_index: Some(1),
        in_use_active: true,
        rrd_key: Some([0x99; 16]),
        connection_status: [0x35, 0xE1, 0x00, 0x03],
        battery: Vec::new(),
        salt: 0xC7C8,
    };
    run_cycle(&mut machine, &engine, inputs).await;

    // RRD: descriptor (4 << 4) | 0x6, then the ciphertext
    assert_eq!(machine.rrd(), &[0x46, 0x6E, 0xBC, 0xCB, 0x21]);
    assert_eq!(machine.rrd_len(), 5);

    // Filter: 1 + 1 + 6 + 1 + 2 bytes for three keys
    let filter = machine.bloom_filter();
    assert_eq!(machine.bloom_filter_len(), 11);
    assert_eq!(filter[0], 0x00, "flags");
    assert_eq!(filter[1], 0x60, "(6 << 4) | filter type");
    assert_eq!(&filter[2..8], &[0x01, 0, 0, 0, 0, 0], "bit 0 from all-zero digests");
    assert_eq!(&filter[8..], &[0x01, 0xC7, 0xC8], "salt field");
}

#[tokio::test]
async fn auxiliary_fields_are_identical_across_keys() {
    let engine = ScriptedEngine::new();
    engine.push_ciphertext(vec![0x21, 0xCB, 0xBC, 0x6E]);

    let mut machine = GenerationMachine::new();
    let inputs = CycleInputs {
        keys: vec![key(0x10), key(0x20), key(0x30)],
        in_use_index: Some(1),
        in_use_active: true,
        rrd_key: Some([0x99; 16]),
        connection_status: [0x35, 0xE1, 0x00, 0x03],
        battery: vec![0xB1, 0xB2],
        salt: 0xC7C8,
    };
    run_cycle(&mut machine, &engine, inputs).await;

    let hash_inputs: Vec<Vec<u8>> = engine
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            EngineCall::Hash { data } => Some(nearkey_crypto::from_engine_order(&data)),
            _ => None,
        })
        .collect();
    assert_eq!(hash_inputs.len(), 3, "one hash request per key");

    // key (16) + salt (2) + battery (2) + rrd (5)
    for input in &hash_inputs {
        assert_eq!(input.len(), 25);
        assert_eq!(&input[16..], &hash_inputs[0][16..], "salt/battery/rrd shared");
    }
    assert_eq!(&hash_inputs[0][16..18], &[0xC7, 0xC8]);
    assert_eq!(&hash_inputs[0][18..20], &[0xB1, 0xB2]);
    assert_eq!(&hash_inputs[0][20..], &[0x46, 0x6E, 0xBC, 0xCB, 0x21]);

    // Only the in-use key carries a tag
    assert_eq!(hash_inputs[0][0], 0x10);
    assert_eq!(hash_inputs[1][0], 0x06);
    assert_eq!(hash_inputs[2][0], 0x30);
}

#[tokio::test]
async fn scanner_can_verify_its_key_against_published_filter() {
    let store = MemoryKeyStore::new();
    store.insert(A, key(0x11));
    let connections = StaticConnections::new();
    connections.connect(A);

    let mut adv = Advertiser::with_rng(
        SoftwareEngine,
        store,
        connections,
        FixedBattery::empty(),
        StdRng::seed_from_u64(42),
    );
    adv.request_regeneration().await;

    let filter = adv.bloom_filter().to_vec();
    let rrd = adv.rrd().to_vec();
    let size = usize::from(filter[1] >> 4);
    assert_eq!(size, 4, "single-key filter size");

    // A scanner holding the key recomputes the bit positions: tagged key,
    // salt from the advertisement, battery (empty here), RRD bytes.
    let salt = &filter[2 + size + 1..];
    let mut scanner_input = Vec::new();
    scanner_input.push(0x06); // in-use, connected and active
    scanner_input.extend_from_slice(&[0x11; 15]);
    scanner_input.extend_from_slice(salt);
    scanner_input.extend_from_slice(&rrd);

    let digest: [u8; 32] = Sha256::digest(&scanner_input).into();
    for pair in digest[..16].chunks_exact(2) {
        let index = usize::from(u16::from_be_bytes([pair[0], pair[1]])) % (size * 8);
        assert_ne!(
            filter[2 + index / 8] & (1 << (index % 8)),
            0,
            "bit {index} must be set for the scanner's key"
        );
    }
}

#[tokio::test]
async fn regeneration_tracks_key_store_changes() {
    let engine = ScriptedEngine::new();
    let store = MemoryKeyStore::new();
    let connections = StaticConnections::new();
    let mut adv = Advertiser::with_rng(
        engine,
        store.clone(),
        connections,
        FixedBattery::empty(),
        StdRng::seed_from_u64(7),
    );

    adv.request_regeneration().await;
    assert_eq!(adv.bloom_filter_len(), 0);

    store.insert(A, key(0x11));
    adv.request_regeneration().await;
    assert_eq!(adv.bloom_filter_len(), 9);

    store.remove(A);
    adv.request_regeneration().await;
    assert_eq!(adv.bloom_filter_len(), 0, "empty set publishes empty filter");
}

#[tokio::test]
async fn encrypt_failure_leaves_stale_rrd_published() {
    let engine = ScriptedEngine::new();
    let store = MemoryKeyStore::new();
    store.insert(A, key(0x11));
    let connections = StaticConnections::new();
    connections.connect(A);

    let mut adv = Advertiser::with_rng(
        engine.clone(),
        store,
        connections,
        FixedBattery::empty(),
        StdRng::seed_from_u64(7),
    );
    adv.request_regeneration().await;
    let published_rrd = adv.rrd().to_vec();
    assert_eq!(published_rrd.len(), 5);

    engine.fail_next_encrypt("engine busy");
    adv.request_regeneration().await;

    assert_eq!(adv.rrd(), published_rrd.as_slice(), "previous RRD stays");
    assert_eq!(adv.bloom_filter_len(), 9, "filter still regenerated");
}

#[tokio::test]
async fn battery_bytes_enter_the_hash_input() {
    let engine = ScriptedEngine::new();
    let store = MemoryKeyStore::new();
    store.insert(A, key(0x11));
    let battery = FixedBattery::with_bytes(vec![0x33, 0x55, 0x64]);

    let mut adv = Advertiser::with_rng(
        engine.clone(),
        store,
        StaticConnections::new(),
        battery,
        StdRng::seed_from_u64(7),
    );
    adv.request_regeneration().await;

    let input = nearkey_crypto::from_engine_order(&engine.last_hash_input().unwrap());
    // key (16) + salt (2) + battery (3) + rrd (5)
    assert_eq!(input.len(), 26);
    assert_eq!(&input[18..21], &[0x33, 0x55, 0x64]);
}
