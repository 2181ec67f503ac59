// Intel QuickAssist Technology (QAT) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=QATLIB_BUILD");
    println!("cargo:rerun-if-env-changed=QATLIB_SRC");

    // Only the hardware backend links against qatlib.
    if env::var_os("CARGO_FEATURE_QAT_HW").is_none() {
        return;
    }
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("linux") {
        println!("cargo:warning=feature `qat-hw` is only supported on Linux");
        return;
    }

    let build = match (env::var("QATLIB_BUILD"), env::var("QATLIB_SRC")) {
        (Ok(build), _) => build,
        (Err(_), Ok(src)) => format!("{src}/build"),
        (Err(_), Err(_)) => {
            println!("cargo:warning=set QATLIB_BUILD (or QATLIB_SRC) to link qatlib");
            return;
        }
    };

    println!("cargo:rustc-link-search=native={build}/lib");
    println!("cargo:rustc-link-lib=static=qat");
    println!("cargo:rustc-link-lib=static=usdm");
    println!("cargo:rustc-link-lib=static=eddsa_sample_s");

    for sys in ["pthread", "dl", "m", "rt", "numa", "crypto"] {
        println!("cargo:rustc-link-lib=dylib={sys}");
    }
}
