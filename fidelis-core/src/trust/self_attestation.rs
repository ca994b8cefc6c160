//! Self-attestation policy gate.
//!
//! Cryptographic validity of a self attestation (the statement signature
//! verifying under the credential's own key) is established by the packed
//! statement verifier; this check only decides whether self attestation is
//! acceptable at all under the relying party's policy.

use crate::attestation::AttestationStatement;
use crate::error::{VerificationError, VerifyResult};

pub struct SelfAttestationTrustworthinessVerifier {
    self_attestation_allowed: bool,
}

impl Default for SelfAttestationTrustworthinessVerifier {
    fn default() -> Self {
        SelfAttestationTrustworthinessVerifier {
            self_attestation_allowed: true,
        }
    }
}

impl SelfAttestationTrustworthinessVerifier {
    /// Reject all self attestations; used to force enterprise attestation
    /// policies.
    pub fn prohibited() -> Self {
        SelfAttestationTrustworthinessVerifier {
            self_attestation_allowed: false,
        }
    }

    pub fn verify(&self, _statement: &AttestationStatement) -> VerifyResult<()> {
        if self.self_attestation_allowed {
            Ok(())
        } else {
            Err(VerificationError::SelfAttestationProhibited)
        }
    }
}
