// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Basic example demonstrating the QAT lifecycle and blocking operations.
//!
//! Run with: `cargo run --example basic`
//! On a QAT host: `cargo run --example basic --features qat-hw`

use qat_rust::{
    Driver, InstanceResolver, QatConfig, QatContext, QatEngine, QatError, ServiceType, SimDriver,
};
use std::sync::Arc;
use std::time::Duration;

fn open_driver() -> Arc<dyn Driver> {
    #[cfg(all(target_os = "linux", feature = "qat-hw"))]
    {
        println!("  Using QAT hardware backend");
        Arc::new(qat_rust::QatHwDriver::new())
    }
    #[cfg(not(all(target_os = "linux", feature = "qat-hw")))]
    {
        println!("  Using simulated backend (enable `qat-hw` for hardware)");
        Arc::new(
            SimDriver::new()
                .with_instances(ServiceType::Crypto, 2)
                .with_completion_delay(Duration::from_micros(50), Duration::from_micros(500)),
        )
    }
}

fn main() {
    println!("Intel QAT Basic Example");
    println!("=======================\n");

    let driver = open_driver();
    let config = QatConfig::default();
    println!();

    // Discover instances
    println!("Discovering instances...");
    let ctx = QatContext::from_arc(Arc::clone(&driver));
    match ctx.start_session(&config.process_name) {
        Ok(()) => {
            match InstanceResolver::new(&ctx).discover_instances() {
                Ok(discovery) => {
                    println!("  Service type: {}", discovery.service);
                    for handle in &discovery.handles {
                        println!("    - instance {}", handle);
                    }
                }
                Err(QatError::NoInstance { .. }) => println!("  No crypto instances found."),
                Err(e) => println!("  Error discovering instances: {}", e),
            }
            if let Err(e) = ctx.stop_session() {
                println!("  Error stopping session: {}", e);
            }
        }
        Err(e) => {
            println!("  Failed to start session: {}", e);
            return;
        }
    }
    println!();

    // Open the engine
    println!("Opening QAT engine...");
    let engine = match QatEngine::open_with(driver, &config) {
        Ok(engine) => {
            println!("  Engine ready: {:?}", engine.context());
            engine
        }
        Err(e) => {
            println!("  Failed to open QAT engine: {}", e);
            return;
        }
    };
    println!();

    // SHA-512 example
    println!("Computing SHA-512...");
    let message = b"Hello, Intel QAT!";
    let digest = match engine.hash_sha512(message) {
        Ok(digest) => {
            println!(
                "  SHA-512 of {:?}: {:02x?}...",
                String::from_utf8_lossy(message),
                &digest[..8]
            );
            digest
        }
        Err(e) => {
            println!("  SHA-512 failed: {}", e);
            [0xAB; 64]
        }
    };
    println!();

    // EdDSA example
    println!("Signing digest...");
    let private_key = [0u8; 32];
    match engine.eddsa_sign(&private_key, &digest) {
        Ok(signature) => {
            println!("  Signature: {:02x?}...", &signature[..8]);
            match engine.eddsa_verify(&private_key, &digest, &signature) {
                Ok(valid) => println!("  Verified: {}", valid),
                Err(e) => println!("  Verify failed: {}", e),
            }
        }
        Err(e) => println!("  Sign failed: {}", e),
    }
    println!();

    // Concurrent callers share one instance
    println!("Signing from 4 threads...");
    std::thread::scope(|s| {
        for t in 0..4u8 {
            let engine = &engine;
            s.spawn(move || match engine.eddsa_sign(&[t; 32], &[t; 32]) {
                Ok(signature) => println!("  thread {}: {:02x?}...", t, &signature[..4]),
                Err(e) => println!("  thread {}: {}", t, e),
            });
        }
    });
    println!();

    println!("Closing engine...");
    match engine.close() {
        Ok(()) => println!("  Closed."),
        Err(e) => println!("  Close reported: {}", e),
    }
    println!();

    println!("Done!");
}
