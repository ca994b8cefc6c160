#![no_main]

//! Fuzz target for AttestationObject::decode()
//!
//! This target exercises the CBOR attestation-object decoding path to find:
//! - Panics from malformed input
//! - Memory safety issues
//! - Logic errors in statement field extraction
//!
//! Run with: cargo +nightly fuzz run fuzz_decode_attestation_object

use fidelis_core::AttestationObject;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Attempt to decode arbitrary bytes as an attestation object.
    // This should never panic - all errors should be gracefully handled
    let _ = AttestationObject::decode(data);
});
