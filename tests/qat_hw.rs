// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Hardware tests. Need a configured QAT device with an `[SSL]` section.
//!
//! Run with: `QATLIB_BUILD=... cargo test --features qat-hw --test qat_hw`

#![cfg(all(target_os = "linux", feature = "qat-hw"))]

use qat_rust::{QatConfig, QatContext, QatEngine, QatHwDriver, SIGNATURE_LEN};
use serial_test::serial;

/// RFC 8032 test 1 secret key.
const RFC8032_SECRET: [u8; 32] = [
    0x9d, 0x61, 0xb1, 0x9d, 0xef, 0xfd, 0x5a, 0x60, 0xba, 0x84, 0x4a, 0xf4, 0x92, 0xec, 0x2c,
    0xc4, 0x44, 0x49, 0x69, 0x7b, 0x32, 0x69, 0x19, 0x70, 0x3b, 0x70, 0x03, 0x1c, 0xae, 0x7f,
    0x60, 0xba,
];

#[test]
#[serial]
fn test_start_then_stop_first_instance() {
    let ctx = QatContext::new(QatHwDriver::new());
    ctx.start_session("SSL").unwrap();
    ctx.init_memory().unwrap();

    let instance = ctx.get_instance().unwrap();
    instance.start().unwrap();
    instance.set_address_translation().unwrap();
    instance.stop().unwrap();

    ctx.stop_session().unwrap();
    ctx.destroy_memory();
}

#[test]
#[serial]
fn test_engine_sign() {
    let engine = QatEngine::open(&QatConfig::default()).unwrap();
    let signature = engine.eddsa_sign(&RFC8032_SECRET, &[0xAB; 64]).unwrap();
    assert_eq!(signature.len(), SIGNATURE_LEN);
    assert_ne!(signature, [0u8; SIGNATURE_LEN]);
    engine.close().unwrap();
}
