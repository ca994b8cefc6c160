#![no_main]

//! Fuzz target for AuthenticatorData::decode()
//!
//! Authenticator data mixes fixed-offset binary fields with embedded CBOR
//! items; this target hammers the cursor logic that splits them.
//!
//! Run with: cargo +nightly fuzz run fuzz_decode_authenticator_data

use fidelis_core::AuthenticatorData;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(decoded) = AuthenticatorData::decode(data) {
        // Decoded values must re-encode without panicking.
        let _ = decoded.encode();
    }
});
