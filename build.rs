//! Build script for the tkv-client crate.
//!
//! With the default `stub-native` feature the native symbols come from the
//! in-process stub compiled into the crate and nothing is linked here.
//! Without it, links against the installed libtkv_c client.

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=TKV_LIB_DIR");

    // Cargo exposes enabled features to build scripts as env vars.
    if env::var_os("CARGO_FEATURE_STUB_NATIVE").is_some() {
        return;
    }

    if let Ok(dir) = env::var("TKV_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    }
    println!("cargo:rustc-link-lib=dylib=tkv_c");

    #[cfg(target_os = "linux")]
    println!("cargo:rustc-link-lib=pthread");
}
