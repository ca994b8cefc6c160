//! The `none` attestation format: the authenticator discloses nothing.

use crate::attestation::AttestationType;
use crate::error::VerifyResult;
use crate::registration::RegistrationObject;

pub struct NoneAttestationStatementVerifier;

impl NoneAttestationStatementVerifier {
    pub fn verify(&self, _object: &RegistrationObject<'_>) -> VerifyResult<AttestationType> {
        Ok(AttestationType::None)
    }
}
