//! Build script for guardheap.
//!
//! Emits a few build-time notes about the enabled feature set.

use std::env;

fn main() {
    // Re-run if features change
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_POISON");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DEBUG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_LOG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DIAGNOSTICS");

    let poison_enabled = env::var("CARGO_FEATURE_POISON").is_ok();
    let debug_enabled = env::var("CARGO_FEATURE_DEBUG").is_ok();
    let log_enabled = env::var("CARGO_FEATURE_LOG").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // --- Poisoning ---
    if !poison_enabled {
        emit_note("'poison' feature disabled: PoisonConfig::default() is a pass-through");
        emit_note("Guards can still be turned on with PoisonConfig::new(..) or with_enabled(true)");
    }

    // --- Debug Features ---
    if debug_enabled && is_release {
        emit_warning("'debug' feature enabled in release build!");
        emit_note("Every violation report captures a backtrace. Consider disabling for production.");
    }

    // --- Diagnostics routing ---
    if is_release && !log_enabled && env::var("CARGO_FEATURE_DIAGNOSTICS").is_err() {
        emit_note("Release build: violations reach sinks only (enable 'log' or 'diagnostics' for output)");
    }
}

fn emit_note(msg: &str) {
    println!("cargo:warning=[guardheap]    {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[guardheap] ⚠️  {}", msg);
}
