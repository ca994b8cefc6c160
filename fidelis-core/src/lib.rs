//! Fidelis Core - WebAuthn/FIDO2 relying-party verification engine
//!
//! This crate implements the server side of the WebAuthn verification
//! protocols: it decodes the binary/CBOR structures produced by browsers
//! and authenticators, verifies the cryptographic trust chain, and
//! produces either a validated credential record or a typed failure.
//!
//! # Features
//!
//! - Strict hand-written decoders for authenticator data, COSE keys,
//!   attestation objects and TPM structures
//! - Attestation statement verification for the registered formats
//!   (none, fido-u2f, packed, android-key, android-safetynet, tpm, apple)
//! - Certificate-path trustworthiness against an AAGUID-keyed trust
//!   anchor repository
//! - Assertion signature, flag, counter and origin rule checks
//!
//! The engine owns no HTTP, storage or UI concerns: callers feed it raw
//! request bytes plus their server-side expectations and persist the
//! results themselves.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fidelis_core::attestation::StatementVerifierRegistry;
//! use fidelis_core::trust::{CertPathTrustworthinessVerifier, InMemoryTrustAnchorRepository};
//! use fidelis_core::{
//!     Challenge, Origin, RegistrationData, RegistrationParameters, RegistrationRequest,
//!     RegistrationVerifier, ServerProperty,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let attestation_object_bytes: Vec<u8> = Vec::new();
//! # let client_data_json_bytes: Vec<u8> = Vec::new();
//! let anchors = Arc::new(InMemoryTrustAnchorRepository::empty());
//! let verifier = RegistrationVerifier::new(
//!     StatementVerifierRegistry::all_formats(),
//!     CertPathTrustworthinessVerifier::new(anchors),
//! );
//!
//! let server_property =
//!     ServerProperty::builder("example.com", Challenge::new(b"issued challenge".to_vec()))
//!         .origin(Origin::parse("https://example.com")?)
//!         .build();
//!
//! let request = RegistrationRequest::new(attestation_object_bytes, client_data_json_bytes);
//! let data = RegistrationData::parse(&request)?;
//! let record = verifier.verify(&data, &RegistrationParameters::new(server_property))?;
//! # let _ = record;
//! # Ok(())
//! # }
//! ```

pub mod assertion;
pub mod attestation;
pub mod authentication;
pub mod authenticator_data;
pub mod client_data;
pub mod cose;
pub mod credential_record;
pub mod error;
pub mod manager;
pub mod registration;
pub mod server_property;
pub mod trust;

mod cbor;
mod checks;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types at root level for convenience
pub use assertion::AssertionSignatureVerifier;
pub use attestation::{
    AttestationObject, AttestationStatement, AttestationType, FormatVerifier,
    StatementVerifierRegistry,
};
pub use authentication::{
    AuthenticationData, AuthenticationParameters, AuthenticationRequest, AuthenticationResult,
    AuthenticationVerifier,
};
pub use authenticator_data::{Aaguid, AttestedCredentialData, AuthenticatorData};
pub use checks::UnknownFlagPolicy;
pub use client_data::{Challenge, CollectedClientData, Origin, TokenBinding};
pub use cose::{CoseAlgorithm, CoseEllipticCurve, CoseKey};
pub use credential_record::{CredentialRecord, StoredCredential, TriState};
pub use error::{DecodeError, DecodeResult, VerificationError, VerifyResult, WebauthnError};
pub use manager::WebauthnManager;
pub use registration::{
    RegistrationData, RegistrationObject, RegistrationParameters, RegistrationRequest,
    RegistrationVerifier,
};
pub use server_property::{OriginPredicate, ServerProperty, ServerPropertyBuilder};
pub use trust::{
    CertPathTrustworthinessVerifier, InMemoryTrustAnchorRepository,
    SelfAttestationTrustworthinessVerifier, TrustAnchorRepository, TrustAnchorSet,
};
