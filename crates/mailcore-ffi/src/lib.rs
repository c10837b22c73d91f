//! UniFFI bindings crate for the mailcore library
//!
//! This crate wraps the mailcore crate for UniFFI library mode binding
//! generation. It re-exports the FFI module and UniFFI scaffolding from the
//! mailcore crate.
//!
//! ## Building for Android
//!
//! 1. Build the library for Android targets:
//!    ```bash
//!    cargo build --release -p mailcore-ffi --target aarch64-linux-android
//!    cargo build --release -p mailcore-ffi --target x86_64-linux-android
//!    ```
//!
//! 2. Generate Kotlin bindings:
//!    ```bash
//!    cargo run -p mailcore-ffi --features bindgen --bin uniffi-bindgen generate \
//!        --library target/aarch64-linux-android/release/libmailcore_ffi.so \
//!        --language kotlin \
//!        --out-dir generated/kotlin
//!    ```

// Re-export everything from the mailcore crate's FFI module
pub use mailcore::ffi::*;

// Re-export the uniffi scaffolding from the mailcore crate
// This is needed for library mode to work correctly
mailcore::uniffi_reexport_scaffolding!();
